//! API response models for the admin analytics overview.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// High-level platform counters for the admin dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AnalyticsOverviewResponse {
    pub total_members: i64,
    pub active_subscriptions: i64,
    /// Members who logged in during the last 30 days
    pub active_members_30d: i64,
    pub lesson_completions_30d: i64,
    pub bookings_30d: i64,
    pub posts_30d: i64,
    /// Seats booked divided by seats offered across upcoming sessions
    pub upcoming_session_fill_rate: f64,
}
