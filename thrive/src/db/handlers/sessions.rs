//! Database repository for speaking sessions.

use crate::types::{abbrev_uuid, SpeakingSessionId};
use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::sessions::{SpeakingSessionCreateDBRequest, SpeakingSessionDBResponse, SpeakingSessionUpdateDBRequest},
};
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

/// Filter for the calendar listing
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub skip: i64,
    pub limit: i64,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub include_canceled: bool,
}

const SELECT_SESSION: &str = r#"
    SELECT s.id, s.title, s.description, s.host_id, u.username AS host_username,
           s.starts_at, s.duration_minutes, s.capacity,
           (SELECT COUNT(*) FROM bookings b WHERE b.session_id = s.id AND b.canceled_at IS NULL) AS booked_count,
           s.points_cost, s.min_jlpt_level, s.meeting_url, s.canceled_at, s.created_at, s.updated_at
    FROM speaking_sessions s
    LEFT JOIN users u ON u.id = s.host_id
"#;

pub struct SpeakingSessions<'c> {
    db: &'c mut PgConnection,
}

impl<'c> SpeakingSessions<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Mark a session canceled. Fails with NotFound if it is already canceled.
    #[instrument(skip(self), fields(session_id = %abbrev_uuid(&id)), err)]
    pub async fn cancel(&mut self, id: SpeakingSessionId) -> Result<SpeakingSessionDBResponse> {
        let updated = sqlx::query("UPDATE speaking_sessions SET canceled_at = NOW(), updated_at = NOW() WHERE id = $1 AND canceled_at IS NULL")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        if updated.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &SessionFilter) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM speaking_sessions s
            WHERE ($1::timestamptz IS NULL OR s.starts_at >= $1)
              AND ($2::timestamptz IS NULL OR s.starts_at < $2)
              AND (s.canceled_at IS NULL OR $3)
            "#,
        )
        .bind(filter.from)
        .bind(filter.to)
        .bind(filter.include_canceled)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(count)
    }
}

#[async_trait::async_trait]
impl<'c> Repository for SpeakingSessions<'c> {
    type CreateRequest = SpeakingSessionCreateDBRequest;
    type UpdateRequest = SpeakingSessionUpdateDBRequest;
    type Response = SpeakingSessionDBResponse;
    type Id = SpeakingSessionId;
    type Filter = SessionFilter;

    #[instrument(skip(self, request), fields(title = %request.title), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let session_id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO speaking_sessions (id, title, description, host_id, starts_at, duration_minutes, capacity, points_cost, min_jlpt_level, meeting_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(session_id)
        .bind(&request.title)
        .bind(&request.description)
        .bind(request.host_id)
        .bind(request.starts_at)
        .bind(request.duration_minutes)
        .bind(request.capacity)
        .bind(request.points_cost)
        .bind(request.min_jlpt_level)
        .bind(&request.meeting_url)
        .execute(&mut *self.db)
        .await?;

        self.get_by_id(session_id).await?.ok_or(DbError::NotFound)
    }

    #[instrument(skip(self), fields(session_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let session = sqlx::query_as::<_, SpeakingSessionDBResponse>(&format!("{SELECT_SESSION} WHERE s.id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(session)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<SpeakingSessionId>) -> Result<std::collections::HashMap<Self::Id, SpeakingSessionDBResponse>> {
        if ids.is_empty() {
            return Ok(std::collections::HashMap::new());
        }

        let sessions = sqlx::query_as::<_, SpeakingSessionDBResponse>(&format!("{SELECT_SESSION} WHERE s.id = ANY($1)"))
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(sessions.into_iter().map(|s| (s.id, s)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let sessions = sqlx::query_as::<_, SpeakingSessionDBResponse>(&format!(
            r#"
            {SELECT_SESSION}
            WHERE ($1::timestamptz IS NULL OR s.starts_at >= $1)
              AND ($2::timestamptz IS NULL OR s.starts_at < $2)
              AND (s.canceled_at IS NULL OR $3)
            ORDER BY s.starts_at ASC
            LIMIT $4 OFFSET $5
            "#
        ))
        .bind(filter.from)
        .bind(filter.to)
        .bind(filter.include_canceled)
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(sessions)
    }

    #[instrument(skip(self), fields(session_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM speaking_sessions WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(session_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        // Capacity may never drop below the number of active bookings
        let updated = sqlx::query(
            r#"
            UPDATE speaking_sessions SET
                title = COALESCE($2, title),
                description = COALESCE($3, description),
                starts_at = COALESCE($4, starts_at),
                duration_minutes = COALESCE($5, duration_minutes),
                capacity = COALESCE($6, capacity),
                points_cost = COALESCE($7, points_cost),
                min_jlpt_level = COALESCE($8, min_jlpt_level),
                meeting_url = COALESCE($9, meeting_url),
                updated_at = NOW()
            WHERE id = $1
              AND COALESCE($6, capacity) >= (SELECT COUNT(*) FROM bookings b WHERE b.session_id = $1 AND b.canceled_at IS NULL)
            "#,
        )
        .bind(id)
        .bind(&request.title)
        .bind(&request.description)
        .bind(request.starts_at)
        .bind(request.duration_minutes)
        .bind(request.capacity)
        .bind(request.points_cost)
        .bind(request.min_jlpt_level)
        .bind(&request.meeting_url)
        .execute(&mut *self.db)
        .await?;

        if updated.rows_affected() == 0 {
            // Either the session is missing or the capacity constraint failed
            return match self.get_by_id(id).await? {
                Some(_) => Err(DbError::CheckViolation {
                    constraint: Some("speaking_sessions_capacity_below_bookings".to_string()),
                    table: Some("speaking_sessions".to_string()),
                    message: "capacity cannot drop below the number of active bookings".to_string(),
                }),
                None => Err(DbError::NotFound),
            };
        }

        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }
}
