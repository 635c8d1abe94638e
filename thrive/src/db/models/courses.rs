//! Database models for courses.

use crate::api::models::users::JlptLevel;
use crate::types::CourseId;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone)]
pub struct CourseCreateDBRequest {
    pub title: String,
    pub description: String,
    pub jlpt_level: JlptLevel,
    pub cover_image_url: Option<String>,
    pub is_published: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CourseUpdateDBRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub jlpt_level: Option<JlptLevel>,
    pub cover_image_url: Option<String>,
    pub is_published: Option<bool>,
    pub position: Option<i32>,
}

#[derive(Debug, Clone, FromRow)]
pub struct CourseDBResponse {
    pub id: CourseId,
    pub title: String,
    pub description: String,
    pub jlpt_level: JlptLevel,
    pub cover_image_url: Option<String>,
    pub is_published: bool,
    pub position: i32,
    /// Published lessons in this course, computed on read
    pub lesson_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
