//! Database repository for lessons, their keywords, and completions.

use crate::types::{abbrev_uuid, CourseId, LessonId, UserId};
use crate::{
    api::models::lessons::KeywordInput,
    db::{
        errors::{DbError, Result},
        handlers::repository::Repository,
        models::lessons::{
            KeywordDBResponse, LessonCompletionDBResponse, LessonCreateDBRequest, LessonDBResponse, LessonRow,
            LessonSummaryDBResponse, LessonUpdateDBRequest,
        },
    },
};
use sqlx::{Connection, PgConnection};
use tracing::instrument;
use uuid::Uuid;

/// Filter for listing lessons (within a course)
#[derive(Debug, Clone)]
pub struct LessonFilter {
    pub course_id: CourseId,
    /// Completion state is joined for this user
    pub user_id: UserId,
    /// When false, unpublished lessons are excluded (member view)
    pub include_unpublished: bool,
}

pub struct Lessons<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Lessons<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    async fn keywords_for(db: &mut PgConnection, lesson_id: LessonId) -> Result<Vec<KeywordDBResponse>> {
        let keywords = sqlx::query_as::<_, KeywordDBResponse>(
            "SELECT id, term, reading, meaning, position FROM keywords WHERE lesson_id = $1 ORDER BY position ASC",
        )
        .bind(lesson_id)
        .fetch_all(db)
        .await?;

        Ok(keywords)
    }

    async fn replace_keywords(db: &mut PgConnection, lesson_id: LessonId, keywords: &[KeywordInput]) -> Result<Vec<KeywordDBResponse>> {
        sqlx::query("DELETE FROM keywords WHERE lesson_id = $1")
            .bind(lesson_id)
            .execute(&mut *db)
            .await?;

        let mut result = Vec::with_capacity(keywords.len());
        for (position, keyword) in keywords.iter().enumerate() {
            let row = sqlx::query_as::<_, KeywordDBResponse>(
                r#"
                INSERT INTO keywords (id, lesson_id, term, reading, meaning, position)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id, term, reading, meaning, position
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(lesson_id)
            .bind(&keyword.term)
            .bind(&keyword.reading)
            .bind(&keyword.meaning)
            .bind(position as i32)
            .fetch_one(&mut *db)
            .await?;
            result.push(row);
        }

        Ok(result)
    }

    /// Lesson summaries for a course, with the given user's completion state.
    #[instrument(skip(self, filter), fields(course_id = %abbrev_uuid(&filter.course_id)), err)]
    pub async fn list_summaries(&mut self, filter: &LessonFilter) -> Result<Vec<LessonSummaryDBResponse>> {
        let summaries = sqlx::query_as::<_, LessonSummaryDBResponse>(
            r#"
            SELECT l.id, l.title, l.position, l.points_reward, l.is_published,
                   (lc.user_id IS NOT NULL) AS completed
            FROM lessons l
            LEFT JOIN lesson_completions lc ON lc.lesson_id = l.id AND lc.user_id = $2
            WHERE l.course_id = $1 AND (l.is_published OR $3)
            ORDER BY l.position ASC
            "#,
        )
        .bind(filter.course_id)
        .bind(filter.user_id)
        .bind(filter.include_unpublished)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(summaries)
    }

    /// Record a completion. Fails with a unique violation if the user
    /// already completed this lesson.
    #[instrument(skip(self), fields(lesson_id = %abbrev_uuid(&lesson_id), user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn create_completion(&mut self, lesson_id: LessonId, user_id: UserId, points_awarded: i32) -> Result<LessonCompletionDBResponse> {
        let completion = sqlx::query_as::<_, LessonCompletionDBResponse>(
            r#"
            INSERT INTO lesson_completions (lesson_id, user_id, points_awarded)
            VALUES ($1, $2, $3)
            RETURNING lesson_id, user_id, points_awarded, completed_at
            "#,
        )
        .bind(lesson_id)
        .bind(user_id)
        .bind(points_awarded)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(completion)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list_completions_for_user(&mut self, user_id: UserId) -> Result<Vec<LessonCompletionDBResponse>> {
        let completions = sqlx::query_as::<_, LessonCompletionDBResponse>(
            "SELECT lesson_id, user_id, points_awarded, completed_at FROM lesson_completions WHERE user_id = $1 ORDER BY completed_at DESC",
        )
        .bind(user_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(completions)
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Lessons<'c> {
    type CreateRequest = LessonCreateDBRequest;
    type UpdateRequest = LessonUpdateDBRequest;
    type Response = LessonDBResponse;
    type Id = LessonId;
    type Filter = LessonFilter;

    #[instrument(skip(self, request), fields(title = %request.title), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let lesson_id = Uuid::new_v4();

        // Lesson row and its keywords land together or not at all
        let mut tx = self.db.begin().await?;

        let row = sqlx::query_as::<_, LessonRow>(
            r#"
            INSERT INTO lessons (id, course_id, title, content, video_url, position, points_reward, is_published)
            VALUES ($1, $2, $3, $4, $5,
                    COALESCE($6, (SELECT COALESCE(MAX(position), 0) + 1 FROM lessons WHERE course_id = $2)),
                    $7, $8)
            RETURNING *
            "#,
        )
        .bind(lesson_id)
        .bind(request.course_id)
        .bind(&request.title)
        .bind(&request.content)
        .bind(&request.video_url)
        .bind(request.position)
        .bind(request.points_reward)
        .bind(request.is_published)
        .fetch_one(&mut *tx)
        .await?;

        let keywords = Self::replace_keywords(&mut tx, lesson_id, &request.keywords).await?;

        tx.commit().await?;

        Ok(LessonDBResponse::from_row(row, keywords))
    }

    #[instrument(skip(self), fields(lesson_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let row = sqlx::query_as::<_, LessonRow>("SELECT * FROM lessons WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        if let Some(row) = row {
            let keywords = Self::keywords_for(self.db, id).await?;
            Ok(Some(LessonDBResponse::from_row(row, keywords)))
        } else {
            Ok(None)
        }
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<LessonId>) -> Result<std::collections::HashMap<Self::Id, LessonDBResponse>> {
        if ids.is_empty() {
            return Ok(std::collections::HashMap::new());
        }

        let rows = sqlx::query_as::<_, LessonRow>("SELECT * FROM lessons WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        let mut result = std::collections::HashMap::new();
        for row in rows {
            let keywords = Self::keywords_for(self.db, row.id).await?;
            result.insert(row.id, LessonDBResponse::from_row(row, keywords));
        }

        Ok(result)
    }

    #[instrument(skip(self, filter), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let rows = sqlx::query_as::<_, LessonRow>(
            "SELECT * FROM lessons WHERE course_id = $1 AND (is_published OR $2) ORDER BY position ASC",
        )
        .bind(filter.course_id)
        .bind(filter.include_unpublished)
        .fetch_all(&mut *self.db)
        .await?;

        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let keywords = Self::keywords_for(self.db, row.id).await?;
            result.push(LessonDBResponse::from_row(row, keywords));
        }

        Ok(result)
    }

    #[instrument(skip(self), fields(lesson_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM lessons WHERE id = $1").bind(id).execute(&mut *self.db).await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(lesson_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let mut tx = self.db.begin().await?;

        let row = sqlx::query_as::<_, LessonRow>(
            r#"
            UPDATE lessons SET
                title = COALESCE($2, title),
                content = COALESCE($3, content),
                video_url = COALESCE($4, video_url),
                position = COALESCE($5, position),
                points_reward = COALESCE($6, points_reward),
                is_published = COALESCE($7, is_published),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.title)
        .bind(&request.content)
        .bind(&request.video_url)
        .bind(request.position)
        .bind(request.points_reward)
        .bind(request.is_published)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(DbError::NotFound)?;

        let keywords = if let Some(keywords) = &request.keywords {
            Self::replace_keywords(&mut tx, id, keywords).await?
        } else {
            Self::keywords_for(&mut tx, id).await?
        };

        tx.commit().await?;

        Ok(LessonDBResponse::from_row(row, keywords))
    }
}
