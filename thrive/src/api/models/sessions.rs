//! API request/response models for speaking sessions.

use super::pagination::Pagination;
use super::users::JlptLevel;
use crate::db::models::sessions::SpeakingSessionDBResponse;
use crate::types::{SpeakingSessionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SpeakingSessionCreate {
    pub title: String,
    pub description: Option<String>,
    /// Hosting instructor; defaults to the creating staff user
    #[schema(value_type = Option<String>, format = "uuid")]
    pub host_id: Option<UserId>,
    pub starts_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub capacity: i32,
    /// Points debited from a member on booking
    pub points_cost: i32,
    /// Lowest JLPT goal a member needs to book, if any
    pub min_jlpt_level: Option<JlptLevel>,
    pub meeting_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SpeakingSessionUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
    /// Capacity can only grow while bookings exist
    pub capacity: Option<i32>,
    pub points_cost: Option<i32>,
    pub min_jlpt_level: Option<JlptLevel>,
    pub meeting_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SpeakingSessionResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: SpeakingSessionId,
    pub title: String,
    pub description: Option<String>,
    #[schema(value_type = String, format = "uuid")]
    pub host_id: UserId,
    pub host_username: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub capacity: i32,
    /// Active (non-canceled) bookings
    pub booked_count: i64,
    pub points_cost: i32,
    pub min_jlpt_level: Option<JlptLevel>,
    /// Only revealed to booked members and staff
    pub meeting_url: Option<String>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Query parameters for the calendar listing
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListSessionsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Only sessions starting at or after this instant (default: now)
    pub from: Option<DateTime<Utc>>,

    /// Only sessions starting before this instant
    pub to: Option<DateTime<Utc>>,

    /// Include canceled sessions (default: false)
    pub include_canceled: Option<bool>,
}

impl From<SpeakingSessionDBResponse> for SpeakingSessionResponse {
    fn from(db: SpeakingSessionDBResponse) -> Self {
        Self {
            id: db.id,
            title: db.title,
            description: db.description,
            host_id: db.host_id,
            host_username: db.host_username,
            starts_at: db.starts_at,
            duration_minutes: db.duration_minutes,
            capacity: db.capacity,
            booked_count: db.booked_count,
            points_cost: db.points_cost,
            min_jlpt_level: db.min_jlpt_level,
            meeting_url: db.meeting_url,
            canceled_at: db.canceled_at,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

impl SpeakingSessionResponse {
    /// Strip fields that are only visible to booked members and staff.
    pub fn redacted(mut self) -> Self {
        self.meeting_url = None;
        self
    }
}
