//! Database models for community posts.

use crate::types::{PostId, UserId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone)]
pub struct PostCreateDBRequest {
    pub author_id: UserId,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct PostUpdateDBRequest {
    pub body: Option<String>,
    pub is_hidden: Option<bool>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PostDBResponse {
    pub id: PostId,
    pub author_id: UserId,
    pub author_username: String,
    pub author_display_name: Option<String>,
    pub body: String,
    pub is_hidden: bool,
    pub flag_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
