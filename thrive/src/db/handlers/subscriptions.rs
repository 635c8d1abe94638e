//! Database repository for subscriptions.

use crate::types::{abbrev_uuid, SubscriptionId, UserId};
use crate::{
    api::models::subscriptions::SubscriptionStatus,
    db::{
        errors::{DbError, Result},
        models::subscriptions::{SubscriptionCreateDBRequest, SubscriptionDBResponse, SubscriptionUpdateDBRequest},
    },
};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

pub struct Subscriptions<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Subscriptions<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id)), err)]
    pub async fn create(&mut self, request: &SubscriptionCreateDBRequest) -> Result<SubscriptionDBResponse> {
        let subscription = sqlx::query_as::<_, SubscriptionDBResponse>(
            r#"
            INSERT INTO subscriptions (id, user_id, status, checkout_session_id)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.user_id)
        .bind(request.status)
        .bind(&request.checkout_session_id)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(subscription)
    }

    /// The user's most recent subscription record, if any.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn get_current_for_user(&mut self, user_id: UserId) -> Result<Option<SubscriptionDBResponse>> {
        let subscription = sqlx::query_as::<_, SubscriptionDBResponse>(
            "SELECT * FROM subscriptions WHERE user_id = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(subscription)
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_checkout_session(&mut self, checkout_session_id: &str) -> Result<Option<SubscriptionDBResponse>> {
        let subscription = sqlx::query_as::<_, SubscriptionDBResponse>("SELECT * FROM subscriptions WHERE checkout_session_id = $1")
            .bind(checkout_session_id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(subscription)
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_stripe_subscription(&mut self, stripe_subscription_id: &str) -> Result<Option<SubscriptionDBResponse>> {
        let subscription = sqlx::query_as::<_, SubscriptionDBResponse>("SELECT * FROM subscriptions WHERE stripe_subscription_id = $1")
            .bind(stripe_subscription_id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(subscription)
    }

    #[instrument(skip(self, request), fields(subscription_id = %abbrev_uuid(&id)), err)]
    pub async fn update(&mut self, id: SubscriptionId, request: &SubscriptionUpdateDBRequest) -> Result<SubscriptionDBResponse> {
        let subscription = sqlx::query_as::<_, SubscriptionDBResponse>(
            r#"
            UPDATE subscriptions SET
                status = COALESCE($2, status),
                stripe_customer_id = COALESCE($3, stripe_customer_id),
                stripe_subscription_id = COALESCE($4, stripe_subscription_id),
                current_period_end = COALESCE($5, current_period_end),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(request.status)
        .bind(&request.stripe_customer_id)
        .bind(&request.stripe_subscription_id)
        .bind(request.current_period_end)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(subscription)
    }

    /// Whether content access is currently allowed for the user. Admins and
    /// instructors bypass this check at the handler level.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn has_active_subscription(&mut self, user_id: UserId) -> Result<bool> {
        let active = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM subscriptions WHERE user_id = $1 AND status = 'active')",
        )
        .bind(user_id)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(active)
    }

    /// Count subscriptions by status, for analytics.
    #[instrument(skip(self), err)]
    pub async fn count_by_status(&mut self, status: SubscriptionStatus) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM subscriptions WHERE status = $1")
            .bind(status)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count)
    }

    /// Mark active subscriptions whose period lapsed as past due. Run by the
    /// maintenance sweeper as a backstop for missed webhooks.
    #[instrument(skip(self), err)]
    pub async fn sweep_lapsed(&mut self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions SET status = 'past_due', updated_at = NOW()
            WHERE status = 'active' AND current_period_end IS NOT NULL AND current_period_end < NOW() - interval '1 day'
            "#,
        )
        .execute(&mut *self.db)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::models::users::Role,
        db::{
            handlers::{Repository, Users},
            models::users::UserCreateDBRequest,
        },
    };
    use sqlx::PgPool;

    async fn seed_user(conn: &mut PgConnection) -> UserId {
        let mut users = Users::new(conn);
        users
            .create(&UserCreateDBRequest {
                username: "subscriber".to_string(),
                email: "subscriber@example.com".to_string(),
                display_name: None,
                role: Role::Member,
                jlpt_goal: None,
                password_hash: None,
            })
            .await
            .unwrap()
            .id
    }

    #[sqlx::test]
    async fn test_subscription_lifecycle(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let user_id = seed_user(&mut conn).await;

        let mut repo = Subscriptions::new(&mut conn);

        let pending = repo
            .create(&SubscriptionCreateDBRequest {
                user_id,
                status: SubscriptionStatus::Pending,
                checkout_session_id: Some("cs_test_123".to_string()),
            })
            .await
            .unwrap();
        assert!(!repo.has_active_subscription(user_id).await.unwrap());

        let activated = repo
            .update(
                pending.id,
                &SubscriptionUpdateDBRequest {
                    status: Some(SubscriptionStatus::Active),
                    stripe_customer_id: Some("cus_123".to_string()),
                    stripe_subscription_id: Some("sub_123".to_string()),
                    current_period_end: Some(chrono::Utc::now() + chrono::Duration::days(30)),
                },
            )
            .await
            .unwrap();
        assert_eq!(activated.status, SubscriptionStatus::Active);
        assert!(repo.has_active_subscription(user_id).await.unwrap());

        let by_checkout = repo.get_by_checkout_session("cs_test_123").await.unwrap().unwrap();
        assert_eq!(by_checkout.id, pending.id);

        let by_stripe = repo.get_by_stripe_subscription("sub_123").await.unwrap().unwrap();
        assert_eq!(by_stripe.id, pending.id);
    }

    #[sqlx::test]
    async fn test_sweep_lapsed(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let user_id = seed_user(&mut conn).await;

        let mut repo = Subscriptions::new(&mut conn);
        let subscription = repo
            .create(&SubscriptionCreateDBRequest {
                user_id,
                status: SubscriptionStatus::Pending,
                checkout_session_id: None,
            })
            .await
            .unwrap();
        repo.update(
            subscription.id,
            &SubscriptionUpdateDBRequest {
                status: Some(SubscriptionStatus::Active),
                current_period_end: Some(chrono::Utc::now() - chrono::Duration::days(3)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(repo.sweep_lapsed().await.unwrap(), 1);

        let swept = repo.get_current_for_user(user_id).await.unwrap().unwrap();
        assert_eq!(swept.status, SubscriptionStatus::PastDue);
        assert!(!repo.has_active_subscription(user_id).await.unwrap());
    }
}
