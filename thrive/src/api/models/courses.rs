//! API request/response models for courses.

use super::{pagination::Pagination, users::JlptLevel};
use crate::db::models::courses::CourseDBResponse;
use crate::types::CourseId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CourseCreate {
    pub title: String,
    pub description: String,
    pub jlpt_level: JlptLevel,
    pub cover_image_url: Option<String>,
    /// Unpublished courses are only visible to staff
    #[serde(default)]
    pub is_published: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CourseUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub jlpt_level: Option<JlptLevel>,
    pub cover_image_url: Option<String>,
    pub is_published: Option<bool>,
    /// Position within the catalogue ordering
    pub position: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CourseResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: CourseId,
    pub title: String,
    pub description: String,
    pub jlpt_level: JlptLevel,
    pub cover_image_url: Option<String>,
    pub is_published: bool,
    pub position: i32,
    pub lesson_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Query parameters for listing courses
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListCoursesQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Filter to a single JLPT level
    pub jlpt_level: Option<JlptLevel>,

    /// Case-insensitive substring match on title and description
    pub search: Option<String>,
}

impl From<CourseDBResponse> for CourseResponse {
    fn from(db: CourseDBResponse) -> Self {
        Self {
            id: db.id,
            title: db.title,
            description: db.description,
            jlpt_level: db.jlpt_level,
            cover_image_url: db.cover_image_url,
            is_published: db.is_published,
            position: db.position,
            lesson_count: db.lesson_count,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}
