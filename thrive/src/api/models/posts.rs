//! API request/response models for community posts.

use super::pagination::Pagination;
use crate::db::models::posts::PostDBResponse;
use crate::types::{PostId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostCreate {
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostUpdate {
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: PostId,
    #[schema(value_type = String, format = "uuid")]
    pub author_id: UserId,
    pub author_username: String,
    pub author_display_name: Option<String>,
    pub body: String,
    /// Hidden posts are only returned to staff and their author
    pub is_hidden: bool,
    pub flag_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Query parameters for listing community posts
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListPostsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Restrict to posts by a single author
    #[param(value_type = Option<String>, format = "uuid")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub author_id: Option<UserId>,
}

impl From<PostDBResponse> for PostResponse {
    fn from(db: PostDBResponse) -> Self {
        Self {
            id: db.id,
            author_id: db.author_id,
            author_username: db.author_username,
            author_display_name: db.author_display_name,
            body: db.body,
            is_hidden: db.is_hidden,
            flag_count: db.flag_count,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}
