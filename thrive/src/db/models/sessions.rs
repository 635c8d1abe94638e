//! Database models for speaking sessions.

use crate::api::models::users::JlptLevel;
use crate::types::{SpeakingSessionId, UserId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone)]
pub struct SpeakingSessionCreateDBRequest {
    pub title: String,
    pub description: Option<String>,
    pub host_id: UserId,
    pub starts_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub capacity: i32,
    pub points_cost: i32,
    pub min_jlpt_level: Option<JlptLevel>,
    pub meeting_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SpeakingSessionUpdateDBRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
    pub capacity: Option<i32>,
    pub points_cost: Option<i32>,
    pub min_jlpt_level: Option<JlptLevel>,
    pub meeting_url: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct SpeakingSessionDBResponse {
    pub id: SpeakingSessionId,
    pub title: String,
    pub description: Option<String>,
    pub host_id: UserId,
    pub host_username: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub capacity: i32,
    /// Active (non-canceled) bookings, computed on read
    pub booked_count: i64,
    pub points_cost: i32,
    pub min_jlpt_level: Option<JlptLevel>,
    pub meeting_url: Option<String>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
