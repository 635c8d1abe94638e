//! API request/response models for bookings.

use super::pagination::Pagination;
use crate::db::models::bookings::BookingDBResponse;
use crate::types::{BookingId, SpeakingSessionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookingResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: BookingId,
    #[schema(value_type = String, format = "uuid")]
    pub session_id: SpeakingSessionId,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub session_title: Option<String>,
    pub session_starts_at: Option<DateTime<Utc>>,
    pub points_spent: i32,
    pub created_at: DateTime<Utc>,
    pub canceled_at: Option<DateTime<Utc>>,
}

/// Query parameters for listing the caller's bookings
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListBookingsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Include canceled bookings (default: false)
    pub include_canceled: Option<bool>,
}

impl From<BookingDBResponse> for BookingResponse {
    fn from(db: BookingDBResponse) -> Self {
        Self {
            id: db.id,
            session_id: db.session_id,
            user_id: db.user_id,
            session_title: db.session_title,
            session_starts_at: db.session_starts_at,
            points_spent: db.points_spent,
            created_at: db.created_at,
            canceled_at: db.canceled_at,
        }
    }
}
