//! Aggregate queries backing the admin analytics overview.

use crate::api::models::analytics::AnalyticsOverviewResponse;
use crate::db::errors::Result;
use sqlx::PgConnection;
use tracing::instrument;

pub struct Analytics<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Analytics<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), err)]
    pub async fn overview(&mut self) -> Result<AnalyticsOverviewResponse> {
        let (total_members, active_members_30d) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE last_login > NOW() - interval '30 days')
            FROM users
            WHERE role = 'member'
            "#,
        )
        .fetch_one(&mut *self.db)
        .await?;

        let active_subscriptions = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM subscriptions WHERE status = 'active'")
            .fetch_one(&mut *self.db)
            .await?;

        let lesson_completions_30d =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM lesson_completions WHERE completed_at > NOW() - interval '30 days'")
                .fetch_one(&mut *self.db)
                .await?;

        let bookings_30d = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM bookings WHERE created_at > NOW() - interval '30 days' AND canceled_at IS NULL",
        )
        .fetch_one(&mut *self.db)
        .await?;

        let posts_30d = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM community_posts WHERE created_at > NOW() - interval '30 days'")
            .fetch_one(&mut *self.db)
            .await?;

        // Seats booked over seats offered, upcoming non-canceled sessions only
        let (seats_booked, seats_offered) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT COALESCE(SUM((SELECT COUNT(*) FROM bookings b WHERE b.session_id = s.id AND b.canceled_at IS NULL)), 0)::bigint,
                   COALESCE(SUM(s.capacity), 0)::bigint
            FROM speaking_sessions s
            WHERE s.starts_at > NOW() AND s.canceled_at IS NULL
            "#,
        )
        .fetch_one(&mut *self.db)
        .await?;

        let upcoming_session_fill_rate = if seats_offered > 0 {
            seats_booked as f64 / seats_offered as f64
        } else {
            0.0
        };

        Ok(AnalyticsOverviewResponse {
            total_members,
            active_subscriptions,
            active_members_30d,
            lesson_completions_30d,
            bookings_30d,
            posts_30d,
            upcoming_session_fill_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::models::users::Role,
        db::{
            handlers::{Bookings, Repository, SpeakingSessions, Users},
            models::{sessions::SpeakingSessionCreateDBRequest, users::UserCreateDBRequest},
        },
    };
    use sqlx::PgPool;

    #[sqlx::test]
    async fn test_overview_on_empty_database(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let overview = Analytics::new(&mut conn).overview().await.unwrap();

        assert_eq!(overview.total_members, 0);
        assert_eq!(overview.active_subscriptions, 0);
        assert_eq!(overview.upcoming_session_fill_rate, 0.0);
    }

    #[sqlx::test]
    async fn test_fill_rate(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();

        let mut users = Users::new(&mut conn);
        let host = users
            .create(&UserCreateDBRequest {
                username: "host".to_string(),
                email: "host@example.com".to_string(),
                display_name: None,
                role: Role::Instructor,
                jlpt_goal: None,
                password_hash: None,
            })
            .await
            .unwrap()
            .id;
        let member = users
            .create(&UserCreateDBRequest {
                username: "member".to_string(),
                email: "member@example.com".to_string(),
                display_name: None,
                role: Role::Member,
                jlpt_goal: None,
                password_hash: None,
            })
            .await
            .unwrap()
            .id;

        let mut sessions = SpeakingSessions::new(&mut conn);
        let session = sessions
            .create(&SpeakingSessionCreateDBRequest {
                title: "Free Talk".to_string(),
                description: None,
                host_id: host,
                starts_at: chrono::Utc::now() + chrono::Duration::days(1),
                duration_minutes: 30,
                capacity: 4,
                points_cost: 10,
                min_jlpt_level: None,
                meeting_url: None,
            })
            .await
            .unwrap();

        Bookings::new(&mut conn).create(session.id, member, 10).await.unwrap();

        let overview = Analytics::new(&mut conn).overview().await.unwrap();
        assert_eq!(overview.total_members, 1);
        assert_eq!(overview.bookings_30d, 1);
        assert!((overview.upcoming_session_fill_rate - 0.25).abs() < f64::EPSILON);
    }
}
