//! Database repository for courses.

use crate::types::{abbrev_uuid, CourseId};
use crate::{
    api::models::users::JlptLevel,
    db::{
        errors::{DbError, Result},
        handlers::repository::Repository,
        models::courses::{CourseCreateDBRequest, CourseDBResponse, CourseUpdateDBRequest},
    },
};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

/// Filter for listing courses
#[derive(Debug, Clone, Default)]
pub struct CourseFilter {
    pub skip: i64,
    pub limit: i64,
    pub jlpt_level: Option<JlptLevel>,
    pub search: Option<String>,
    /// When false, unpublished courses are excluded (member view)
    pub include_unpublished: bool,
}

// lesson_count is computed against published lessons only, which is what
// members see in the catalogue.
const SELECT_COURSE: &str = r#"
    SELECT c.*,
           (SELECT COUNT(*) FROM lessons l WHERE l.course_id = c.id AND l.is_published) AS lesson_count
    FROM courses c
"#;

pub struct Courses<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Courses<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &CourseFilter) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM courses c
            WHERE ($1::jlpt_level IS NULL OR c.jlpt_level = $1)
              AND ($2::text IS NULL OR c.title ILIKE '%' || $2 || '%' OR c.description ILIKE '%' || $2 || '%')
              AND (c.is_published OR $3)
            "#,
        )
        .bind(filter.jlpt_level)
        .bind(&filter.search)
        .bind(filter.include_unpublished)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(count)
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Courses<'c> {
    type CreateRequest = CourseCreateDBRequest;
    type UpdateRequest = CourseUpdateDBRequest;
    type Response = CourseDBResponse;
    type Id = CourseId;
    type Filter = CourseFilter;

    #[instrument(skip(self, request), fields(title = %request.title), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let course_id = Uuid::new_v4();

        // New courses append at the end of the catalogue ordering
        let course = sqlx::query_as::<_, CourseDBResponse>(
            r#"
            INSERT INTO courses (id, title, description, jlpt_level, cover_image_url, is_published, position)
            VALUES ($1, $2, $3, $4, $5, $6,
                    (SELECT COALESCE(MAX(position), 0) + 1 FROM courses))
            RETURNING *, 0::bigint AS lesson_count
            "#,
        )
        .bind(course_id)
        .bind(&request.title)
        .bind(&request.description)
        .bind(request.jlpt_level)
        .bind(&request.cover_image_url)
        .bind(request.is_published)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(course)
    }

    #[instrument(skip(self), fields(course_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let course = sqlx::query_as::<_, CourseDBResponse>(&format!("{SELECT_COURSE} WHERE c.id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(course)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<CourseId>) -> Result<std::collections::HashMap<Self::Id, CourseDBResponse>> {
        if ids.is_empty() {
            return Ok(std::collections::HashMap::new());
        }

        let courses = sqlx::query_as::<_, CourseDBResponse>(&format!("{SELECT_COURSE} WHERE c.id = ANY($1)"))
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(courses.into_iter().map(|c| (c.id, c)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let courses = sqlx::query_as::<_, CourseDBResponse>(&format!(
            r#"
            {SELECT_COURSE}
            WHERE ($1::jlpt_level IS NULL OR c.jlpt_level = $1)
              AND ($2::text IS NULL OR c.title ILIKE '%' || $2 || '%' OR c.description ILIKE '%' || $2 || '%')
              AND (c.is_published OR $3)
            ORDER BY c.position ASC
            LIMIT $4 OFFSET $5
            "#
        ))
        .bind(filter.jlpt_level)
        .bind(&filter.search)
        .bind(filter.include_unpublished)
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(courses)
    }

    #[instrument(skip(self), fields(course_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM courses WHERE id = $1").bind(id).execute(&mut *self.db).await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(course_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let course = sqlx::query_as::<_, CourseDBResponse>(
            r#"
            UPDATE courses SET
                title = COALESCE($2, title),
                description = COALESCE($3, description),
                jlpt_level = COALESCE($4, jlpt_level),
                cover_image_url = COALESCE($5, cover_image_url),
                is_published = COALESCE($6, is_published),
                position = COALESCE($7, position),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *,
                (SELECT COUNT(*) FROM lessons l WHERE l.course_id = courses.id AND l.is_published) AS lesson_count
            "#,
        )
        .bind(id)
        .bind(&request.title)
        .bind(&request.description)
        .bind(request.jlpt_level)
        .bind(&request.cover_image_url)
        .bind(request.is_published)
        .bind(request.position)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(course)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::PgPool;

    fn create_request(title: &str, published: bool) -> CourseCreateDBRequest {
        CourseCreateDBRequest {
            title: title.to_string(),
            description: "Survival Japanese for daily life".to_string(),
            jlpt_level: JlptLevel::N5,
            cover_image_url: None,
            is_published: published,
        }
    }

    #[sqlx::test]
    async fn test_create_assigns_increasing_positions(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Courses::new(&mut conn);

        let first = repo.create(&create_request("Getting Started", true)).await.unwrap();
        let second = repo.create(&create_request("Daily Conversation", true)).await.unwrap();

        assert!(second.position > first.position);
    }

    #[sqlx::test]
    async fn test_member_listing_hides_unpublished(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Courses::new(&mut conn);

        repo.create(&create_request("Published", true)).await.unwrap();
        repo.create(&create_request("Draft", false)).await.unwrap();

        let member_view = repo
            .list(&CourseFilter {
                skip: 0,
                limit: 10,
                include_unpublished: false,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(member_view.len(), 1);
        assert_eq!(member_view[0].title, "Published");

        let staff_view = repo
            .list(&CourseFilter {
                skip: 0,
                limit: 10,
                include_unpublished: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(staff_view.len(), 2);
    }

    #[sqlx::test]
    async fn test_update_missing_course_is_not_found(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Courses::new(&mut conn);

        let err = repo
            .update(Uuid::new_v4(), &CourseUpdateDBRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound));
    }
}
