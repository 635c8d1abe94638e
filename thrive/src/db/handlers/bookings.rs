//! Database repository for bookings.
//!
//! Seat reservation is race-free: [`Bookings::lock_session`] takes a row
//! lock on the session, so the capacity check, points debit, and booking
//! insert that follow all happen against a frozen seat count. Callers must
//! run the whole sequence inside one transaction.

use crate::types::{abbrev_uuid, BookingId, SpeakingSessionId, UserId};
use crate::db::{
    errors::{DbError, Result},
    models::bookings::{BookingDBResponse, LockedSession},
};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

/// Filter for listing a user's bookings
#[derive(Debug, Clone, Default)]
pub struct BookingFilter {
    pub skip: i64,
    pub limit: i64,
    pub user_id: Option<UserId>,
    pub include_canceled: bool,
}

const SELECT_BOOKING: &str = r#"
    SELECT b.id, b.session_id, b.user_id, s.title AS session_title, s.starts_at AS session_starts_at,
           b.points_spent, b.created_at, b.canceled_at
    FROM bookings b
    JOIN speaking_sessions s ON s.id = b.session_id
"#;

pub struct Bookings<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Bookings<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Lock the session row and return a snapshot with its current active
    /// booking count. Only meaningful inside a transaction.
    #[instrument(skip(self), fields(session_id = %abbrev_uuid(&session_id)), err)]
    pub async fn lock_session(&mut self, session_id: SpeakingSessionId) -> Result<Option<LockedSession>> {
        let locked = sqlx::query_as::<_, LockedSession>(
            r#"
            SELECT s.id, s.title, s.starts_at, s.capacity, s.points_cost, s.min_jlpt_level, s.canceled_at,
                   (SELECT COUNT(*) FROM bookings b WHERE b.session_id = s.id AND b.canceled_at IS NULL) AS booked_count
            FROM speaking_sessions s
            WHERE s.id = $1
            FOR UPDATE OF s
            "#,
        )
        .bind(session_id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(locked)
    }

    /// Insert a booking row. A partial unique index rejects a second active
    /// booking for the same user and session.
    #[instrument(skip(self), fields(session_id = %abbrev_uuid(&session_id), user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn create(&mut self, session_id: SpeakingSessionId, user_id: UserId, points_spent: i32) -> Result<BookingDBResponse> {
        let booking_id = Uuid::new_v4();

        sqlx::query("INSERT INTO bookings (id, session_id, user_id, points_spent) VALUES ($1, $2, $3, $4)")
            .bind(booking_id)
            .bind(session_id)
            .bind(user_id)
            .bind(points_spent)
            .execute(&mut *self.db)
            .await?;

        self.get_by_id(booking_id).await?.ok_or(DbError::NotFound)
    }

    #[instrument(skip(self), fields(booking_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: BookingId) -> Result<Option<BookingDBResponse>> {
        let booking = sqlx::query_as::<_, BookingDBResponse>(&format!("{SELECT_BOOKING} WHERE b.id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(booking)
    }

    /// Mark a booking canceled. Returns NotFound if it doesn't exist or is
    /// already canceled.
    #[instrument(skip(self), fields(booking_id = %abbrev_uuid(&id)), err)]
    pub async fn cancel(&mut self, id: BookingId) -> Result<BookingDBResponse> {
        let updated = sqlx::query("UPDATE bookings SET canceled_at = NOW() WHERE id = $1 AND canceled_at IS NULL")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        if updated.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }

    /// Active bookings for a session, used when a canceled session is refunded.
    #[instrument(skip(self), fields(session_id = %abbrev_uuid(&session_id)), err)]
    pub async fn list_active_for_session(&mut self, session_id: SpeakingSessionId) -> Result<Vec<BookingDBResponse>> {
        let bookings = sqlx::query_as::<_, BookingDBResponse>(&format!(
            "{SELECT_BOOKING} WHERE b.session_id = $1 AND b.canceled_at IS NULL ORDER BY b.created_at ASC"
        ))
        .bind(session_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(bookings)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    pub async fn list(&mut self, filter: &BookingFilter) -> Result<Vec<BookingDBResponse>> {
        let bookings = sqlx::query_as::<_, BookingDBResponse>(&format!(
            r#"
            {SELECT_BOOKING}
            WHERE ($1::uuid IS NULL OR b.user_id = $1)
              AND (b.canceled_at IS NULL OR $2)
            ORDER BY s.starts_at ASC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(filter.user_id)
        .bind(filter.include_canceled)
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(bookings)
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &BookingFilter) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM bookings b
            WHERE ($1::uuid IS NULL OR b.user_id = $1)
              AND (b.canceled_at IS NULL OR $2)
            "#,
        )
        .bind(filter.user_id)
        .bind(filter.include_canceled)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::models::users::Role,
        db::{
            handlers::{Repository, SpeakingSessions, Users},
            models::{sessions::SpeakingSessionCreateDBRequest, users::UserCreateDBRequest},
        },
    };
    use chrono::Utc;
    use sqlx::PgPool;

    async fn seed_user(conn: &mut PgConnection, username: &str, role: Role) -> UserId {
        let mut users = Users::new(conn);
        users
            .create(&UserCreateDBRequest {
                username: username.to_string(),
                email: format!("{username}@example.com"),
                display_name: None,
                role,
                jlpt_goal: None,
                password_hash: None,
            })
            .await
            .unwrap()
            .id
    }

    async fn seed_session(conn: &mut PgConnection, host_id: UserId, capacity: i32) -> SpeakingSessionId {
        let mut sessions = SpeakingSessions::new(conn);
        sessions
            .create(&SpeakingSessionCreateDBRequest {
                title: "Free Talk".to_string(),
                description: None,
                host_id,
                starts_at: Utc::now() + chrono::Duration::days(2),
                duration_minutes: 30,
                capacity,
                points_cost: 10,
                min_jlpt_level: None,
                meeting_url: None,
            })
            .await
            .unwrap()
            .id
    }

    #[sqlx::test]
    async fn test_lock_session_reports_seat_count(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let host = seed_user(&mut conn, "host", Role::Instructor).await;
        let member = seed_user(&mut conn, "member", Role::Member).await;
        let session_id = seed_session(&mut conn, host, 2).await;

        let mut tx = pool.begin().await.unwrap();
        let mut repo = Bookings::new(&mut tx);

        let locked = repo.lock_session(session_id).await.unwrap().unwrap();
        assert_eq!(locked.booked_count, 0);
        assert_eq!(locked.capacity, 2);

        repo.create(session_id, member, 10).await.unwrap();
        let locked = repo.lock_session(session_id).await.unwrap().unwrap();
        assert_eq!(locked.booked_count, 1);

        tx.commit().await.unwrap();
    }

    #[sqlx::test]
    async fn test_duplicate_active_booking_rejected(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let host = seed_user(&mut conn, "host", Role::Instructor).await;
        let member = seed_user(&mut conn, "member", Role::Member).await;
        let session_id = seed_session(&mut conn, host, 5).await;

        let mut repo = Bookings::new(&mut conn);
        let booking = repo.create(session_id, member, 10).await.unwrap();

        let err = repo.create(session_id, member, 10).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));

        // After canceling, booking again is allowed
        repo.cancel(booking.id).await.unwrap();
        repo.create(session_id, member, 10).await.unwrap();
    }

    #[sqlx::test]
    async fn test_cancel_twice_is_not_found(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let host = seed_user(&mut conn, "host", Role::Instructor).await;
        let member = seed_user(&mut conn, "member", Role::Member).await;
        let session_id = seed_session(&mut conn, host, 5).await;

        let mut repo = Bookings::new(&mut conn);
        let booking = repo.create(session_id, member, 10).await.unwrap();

        let canceled = repo.cancel(booking.id).await.unwrap();
        assert!(canceled.canceled_at.is_some());
        assert!(matches!(repo.cancel(booking.id).await.unwrap_err(), DbError::NotFound));
    }

    #[sqlx::test]
    async fn test_list_filters_canceled(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let host = seed_user(&mut conn, "host", Role::Instructor).await;
        let member = seed_user(&mut conn, "member", Role::Member).await;
        let session_id = seed_session(&mut conn, host, 5).await;

        let mut repo = Bookings::new(&mut conn);
        let booking = repo.create(session_id, member, 10).await.unwrap();
        repo.cancel(booking.id).await.unwrap();

        let filter = BookingFilter {
            skip: 0,
            limit: 10,
            user_id: Some(member),
            include_canceled: false,
        };
        assert!(repo.list(&filter).await.unwrap().is_empty());
        assert_eq!(repo.count(&filter).await.unwrap(), 0);

        let filter = BookingFilter {
            include_canceled: true,
            ..filter
        };
        assert_eq!(repo.list(&filter).await.unwrap().len(), 1);
    }
}
