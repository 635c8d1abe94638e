//! Database repository for the points ledger.
//!
//! Every balance change goes through [`Points::apply`], which updates the
//! user's cached balance and writes a ledger row in one transaction. The
//! `points_balance >= 0` check constraint makes overdrafts impossible no
//! matter how many requests race.

use crate::types::{abbrev_uuid, UserId};
use crate::db::{
    errors::Result,
    models::points::{PointsTransactionCreateDBRequest, PointsTransactionDBResponse},
};
use sqlx::{Connection, PgConnection};
use tracing::instrument;
use uuid::Uuid;

pub struct Points<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Points<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Apply a ledger entry atomically. A negative amount that would push the
    /// balance below zero fails with a check violation and changes nothing.
    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id), amount = request.amount), err)]
    pub async fn apply(&mut self, request: &PointsTransactionCreateDBRequest) -> Result<PointsTransactionDBResponse> {
        let mut tx = self.db.begin().await?;

        let balance_after = sqlx::query_scalar::<_, i32>(
            "UPDATE users SET points_balance = points_balance + $2, updated_at = NOW() WHERE id = $1 RETURNING points_balance",
        )
        .bind(request.user_id)
        .bind(request.amount)
        .fetch_one(&mut *tx)
        .await?;

        let entry = sqlx::query_as::<_, PointsTransactionDBResponse>(
            r#"
            INSERT INTO points_transactions (id, user_id, amount, reason, balance_after, reference_id, note)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.user_id)
        .bind(request.amount)
        .bind(request.reason)
        .bind(balance_after)
        .bind(request.reference_id)
        .bind(&request.note)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(entry)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn balance(&mut self, user_id: UserId) -> Result<i32> {
        let balance = sqlx::query_scalar::<_, i32>("SELECT points_balance FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(balance)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list_for_user(&mut self, user_id: UserId, skip: i64, limit: i64) -> Result<Vec<PointsTransactionDBResponse>> {
        let entries = sqlx::query_as::<_, PointsTransactionDBResponse>(
            "SELECT * FROM points_transactions WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(limit)
        .bind(skip)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(entries)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn count_for_user(&mut self, user_id: UserId) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM points_transactions WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count)
    }
}
