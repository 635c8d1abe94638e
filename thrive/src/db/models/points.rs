//! Database models for the points ledger.

use crate::api::models::points::PointsReason;
use crate::types::UserId;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// A ledger entry to apply. Negative amounts debit the balance; the apply
/// fails atomically if the balance would go below zero.
#[derive(Debug, Clone)]
pub struct PointsTransactionCreateDBRequest {
    pub user_id: UserId,
    pub amount: i32,
    pub reason: PointsReason,
    pub reference_id: Option<Uuid>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PointsTransactionDBResponse {
    pub id: Uuid,
    pub user_id: UserId,
    pub amount: i32,
    pub reason: PointsReason,
    pub balance_after: i32,
    pub reference_id: Option<Uuid>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}
