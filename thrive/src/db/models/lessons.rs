//! Database models for lessons, keywords and completions.

use crate::api::models::lessons::KeywordInput;
use crate::types::{CourseId, LessonId, UserId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct LessonCreateDBRequest {
    pub course_id: CourseId,
    pub title: String,
    pub content: String,
    pub video_url: Option<String>,
    /// Appended to the end of the course when None
    pub position: Option<i32>,
    pub points_reward: i32,
    pub is_published: bool,
    pub keywords: Vec<KeywordInput>,
}

#[derive(Debug, Clone, Default)]
pub struct LessonUpdateDBRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub video_url: Option<String>,
    pub position: Option<i32>,
    pub points_reward: Option<i32>,
    pub is_published: Option<bool>,
    pub keywords: Option<Vec<KeywordInput>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct KeywordDBResponse {
    pub id: Uuid,
    pub term: String,
    pub reading: String,
    pub meaning: String,
    pub position: i32,
}

/// Lesson row without its keywords
#[derive(Debug, Clone, FromRow)]
pub struct LessonRow {
    pub id: LessonId,
    pub course_id: CourseId,
    pub title: String,
    pub content: String,
    pub video_url: Option<String>,
    pub position: i32,
    pub points_reward: i32,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct LessonDBResponse {
    pub id: LessonId,
    pub course_id: CourseId,
    pub title: String,
    pub content: String,
    pub video_url: Option<String>,
    pub position: i32,
    pub points_reward: i32,
    pub is_published: bool,
    pub keywords: Vec<KeywordDBResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LessonDBResponse {
    pub fn from_row(row: LessonRow, keywords: Vec<KeywordDBResponse>) -> Self {
        Self {
            id: row.id,
            course_id: row.course_id,
            title: row.title,
            content: row.content,
            video_url: row.video_url,
            position: row.position,
            points_reward: row.points_reward,
            is_published: row.is_published,
            keywords,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Lesson listing entry, joined with the requesting user's completion state
#[derive(Debug, Clone, FromRow)]
pub struct LessonSummaryDBResponse {
    pub id: LessonId,
    pub title: String,
    pub position: i32,
    pub points_reward: i32,
    pub is_published: bool,
    pub completed: bool,
}

#[derive(Debug, Clone, FromRow)]
pub struct LessonCompletionDBResponse {
    pub lesson_id: LessonId,
    pub user_id: UserId,
    pub points_awarded: i32,
    pub completed_at: DateTime<Utc>,
}
