//! Database models for bookings.

use crate::api::models::users::JlptLevel;
use crate::types::{BookingId, SpeakingSessionId, UserId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Session row snapshot taken under a `FOR UPDATE` lock during booking.
/// Capacity decisions made against it hold until the transaction commits.
#[derive(Debug, Clone, FromRow)]
pub struct LockedSession {
    pub id: SpeakingSessionId,
    pub title: String,
    pub starts_at: DateTime<Utc>,
    pub capacity: i32,
    pub points_cost: i32,
    pub min_jlpt_level: Option<JlptLevel>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub booked_count: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct BookingDBResponse {
    pub id: BookingId,
    pub session_id: SpeakingSessionId,
    pub user_id: UserId,
    pub session_title: Option<String>,
    pub session_starts_at: Option<DateTime<Utc>>,
    pub points_spent: i32,
    pub created_at: DateTime<Utc>,
    pub canceled_at: Option<DateTime<Utc>>,
}
