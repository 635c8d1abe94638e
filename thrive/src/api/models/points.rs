//! API request/response models for the points ledger.

use super::pagination::Pagination;
use crate::db::models::points::PointsTransactionDBResponse;
use crate::types::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// Why a ledger entry exists. `amount` is positive for grants and negative
/// for spends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "points_reason", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PointsReason {
    SignupBonus,
    LessonCompletion,
    Booking,
    BookingRefund,
    AdminGrant,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PointsTransactionResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: Uuid,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub amount: i32,
    pub reason: PointsReason,
    /// Balance after this entry was applied
    pub balance_after: i32,
    /// The lesson, booking or session this entry refers to, when applicable
    #[schema(value_type = Option<String>, format = "uuid")]
    pub reference_id: Option<Uuid>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Admin grant (or deduction, with a negative amount) of points.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PointsGrant {
    pub amount: i32,
    pub note: Option<String>,
}

/// The caller's balance plus recent ledger entries.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PointsSummaryResponse {
    pub balance: i32,
    pub transactions: Vec<PointsTransactionResponse>,
}

/// Query parameters for listing ledger entries
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListPointsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,
}

impl From<PointsTransactionDBResponse> for PointsTransactionResponse {
    fn from(db: PointsTransactionDBResponse) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            amount: db.amount,
            reason: db.reason,
            balance_after: db.balance_after,
            reference_id: db.reference_id,
            note: db.note,
            created_at: db.created_at,
        }
    }
}
