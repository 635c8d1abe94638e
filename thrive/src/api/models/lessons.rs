//! API request/response models for lessons, keywords and completions.

use crate::db::models::lessons::{KeywordDBResponse, LessonCompletionDBResponse, LessonDBResponse, LessonSummaryDBResponse};
use crate::types::{CourseId, LessonId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// A vocabulary or grammar keyword attached to a lesson.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct KeywordResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: Uuid,
    /// The term itself, e.g. 頑張る
    pub term: String,
    /// Kana reading, e.g. がんばる
    pub reading: String,
    pub meaning: String,
    pub position: i32,
}

/// Keyword payload used when creating or replacing a lesson's keywords.
/// Order in the list determines display position.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct KeywordInput {
    pub term: String,
    pub reading: String,
    pub meaning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LessonCreate {
    #[schema(value_type = String, format = "uuid")]
    pub course_id: CourseId,
    pub title: String,
    /// Markdown body of the lesson
    pub content: String,
    pub video_url: Option<String>,
    /// Position within the course; appended at the end when omitted
    pub position: Option<i32>,
    /// Points awarded on first completion; configured default when omitted
    pub points_reward: Option<i32>,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default)]
    pub keywords: Vec<KeywordInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LessonUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub video_url: Option<String>,
    pub position: Option<i32>,
    pub points_reward: Option<i32>,
    pub is_published: Option<bool>,
    /// When present, replaces the full keyword list
    pub keywords: Option<Vec<KeywordInput>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LessonResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: LessonId,
    #[schema(value_type = String, format = "uuid")]
    pub course_id: CourseId,
    pub title: String,
    pub content: String,
    pub video_url: Option<String>,
    pub position: i32,
    pub points_reward: i32,
    pub is_published: bool,
    pub keywords: Vec<KeywordResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lesson listing entry as shown inside a course, without the full content body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LessonSummary {
    #[schema(value_type = String, format = "uuid")]
    pub id: LessonId,
    pub title: String,
    pub position: i32,
    pub points_reward: i32,
    pub is_published: bool,
    /// Whether the requesting user has completed this lesson
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LessonCompletionResponse {
    #[schema(value_type = String, format = "uuid")]
    pub lesson_id: LessonId,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub points_awarded: i32,
    pub completed_at: DateTime<Utc>,
}

impl From<KeywordDBResponse> for KeywordResponse {
    fn from(db: KeywordDBResponse) -> Self {
        Self {
            id: db.id,
            term: db.term,
            reading: db.reading,
            meaning: db.meaning,
            position: db.position,
        }
    }
}

impl From<LessonDBResponse> for LessonResponse {
    fn from(db: LessonDBResponse) -> Self {
        Self {
            id: db.id,
            course_id: db.course_id,
            title: db.title,
            content: db.content,
            video_url: db.video_url,
            position: db.position,
            points_reward: db.points_reward,
            is_published: db.is_published,
            keywords: db.keywords.into_iter().map(KeywordResponse::from).collect(),
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

impl From<LessonSummaryDBResponse> for LessonSummary {
    fn from(db: LessonSummaryDBResponse) -> Self {
        Self {
            id: db.id,
            title: db.title,
            position: db.position,
            points_reward: db.points_reward,
            is_published: db.is_published,
            completed: db.completed,
        }
    }
}

impl From<LessonCompletionDBResponse> for LessonCompletionResponse {
    fn from(db: LessonCompletionDBResponse) -> Self {
        Self {
            lesson_id: db.lesson_id,
            user_id: db.user_id,
            points_awarded: db.points_awarded,
            completed_at: db.completed_at,
        }
    }
}
