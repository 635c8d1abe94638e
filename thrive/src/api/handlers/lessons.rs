//! HTTP handlers for lessons and completions.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    api::{
        handlers::subscriptions::ensure_subscribed,
        models::{
            lessons::{LessonCompletionResponse, LessonCreate, LessonResponse, LessonUpdate},
            points::PointsReason,
            users::{CurrentUser, Role},
        },
    },
    auth::require_staff,
    db::{
        handlers::{Lessons, Points, Repository},
        models::{
            lessons::{LessonCreateDBRequest, LessonUpdateDBRequest},
            points::PointsTransactionCreateDBRequest,
        },
    },
    errors::{Error, Result},
    types::LessonId,
    AppState,
};

fn is_staff(user: &CurrentUser) -> bool {
    matches!(user.role, Role::Admin | Role::Instructor)
}

fn lesson_not_found(id: LessonId) -> Error {
    Error::NotFound {
        resource: "lesson".to_string(),
        id: id.to_string(),
    }
}

/// Get a lesson with its full content and keywords
#[utoipa::path(
    get,
    path = "/lessons/{lesson_id}",
    tag = "lessons",
    responses(
        (status = 200, description = "Lesson", body = LessonResponse),
        (status = 402, description = "Active subscription required"),
        (status = 404, description = "Lesson not found"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_lesson(
    State(state): State<AppState>,
    Path(lesson_id): Path<LessonId>,
    current_user: CurrentUser,
) -> Result<Json<LessonResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let staff = is_staff(&current_user);

    // Lesson content is the paid product: members need an active subscription
    if !staff {
        ensure_subscribed(&mut conn, current_user.id).await?;
    }

    let mut repo = Lessons::new(&mut conn);
    let lesson = repo.get_by_id(lesson_id).await?.ok_or_else(|| lesson_not_found(lesson_id))?;

    if !lesson.is_published && !staff {
        return Err(lesson_not_found(lesson_id));
    }

    Ok(Json(lesson.into()))
}

/// Mark a lesson as completed, awarding its points once
#[utoipa::path(
    post,
    path = "/lessons/{lesson_id}/completions",
    tag = "lessons",
    responses(
        (status = 201, description = "Completion recorded", body = LessonCompletionResponse),
        (status = 402, description = "Active subscription required"),
        (status = 404, description = "Lesson not found"),
        (status = 409, description = "Lesson already completed"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn complete_lesson(
    State(state): State<AppState>,
    Path(lesson_id): Path<LessonId>,
    current_user: CurrentUser,
) -> Result<(StatusCode, Json<LessonCompletionResponse>)> {
    let staff = is_staff(&current_user);

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    if !staff {
        ensure_subscribed(&mut tx, current_user.id).await?;
    }

    let lesson = {
        let mut repo = Lessons::new(&mut tx);
        let lesson = repo.get_by_id(lesson_id).await?.ok_or_else(|| lesson_not_found(lesson_id))?;
        if !lesson.is_published && !staff {
            return Err(lesson_not_found(lesson_id));
        }
        lesson
    };

    // Completion row and points award commit together; the unique constraint
    // on (lesson_id, user_id) turns repeats into a 409
    let completion = {
        let mut repo = Lessons::new(&mut tx);
        repo.create_completion(lesson_id, current_user.id, lesson.points_reward).await?
    };

    if lesson.points_reward > 0 {
        let mut points = Points::new(&mut tx);
        points
            .apply(&PointsTransactionCreateDBRequest {
                user_id: current_user.id,
                amount: lesson.points_reward,
                reason: PointsReason::LessonCompletion,
                reference_id: Some(lesson_id),
                note: Some(format!("Completed lesson: {}", lesson.title)),
            })
            .await?;
    }

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok((StatusCode::CREATED, Json(completion.into())))
}

/// List the caller's lesson completions
#[utoipa::path(
    get,
    path = "/users/me/completions",
    tag = "lessons",
    responses(
        (status = 200, description = "Completions, most recent first", body = Vec<LessonCompletionResponse>),
        (status = 401, description = "Unauthorized"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_my_completions(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> Result<Json<Vec<LessonCompletionResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Lessons::new(&mut conn);

    let completions = repo.list_completions_for_user(current_user.id).await?;
    Ok(Json(completions.into_iter().map(LessonCompletionResponse::from).collect()))
}

/// Create a lesson (staff)
#[utoipa::path(
    post,
    path = "/admin/lessons",
    request_body = LessonCreate,
    tag = "admin",
    responses(
        (status = 201, description = "Lesson created", body = LessonResponse),
        (status = 400, description = "Unknown course"),
        (status = 403, description = "Forbidden"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_lesson(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<LessonCreate>,
) -> Result<(StatusCode, Json<LessonResponse>)> {
    require_staff(current_user)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Lessons::new(&mut conn);

    let lesson = repo
        .create(&LessonCreateDBRequest {
            course_id: request.course_id,
            title: request.title,
            content: request.content,
            video_url: request.video_url,
            position: request.position,
            points_reward: request.points_reward.unwrap_or(state.config.points.default_lesson_reward),
            is_published: request.is_published,
            keywords: request.keywords,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(lesson.into())))
}

/// Update a lesson (staff)
#[utoipa::path(
    patch,
    path = "/admin/lessons/{lesson_id}",
    request_body = LessonUpdate,
    tag = "admin",
    responses(
        (status = 200, description = "Updated lesson", body = LessonResponse),
        (status = 404, description = "Lesson not found"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_lesson(
    State(state): State<AppState>,
    Path(lesson_id): Path<LessonId>,
    current_user: CurrentUser,
    Json(request): Json<LessonUpdate>,
) -> Result<Json<LessonResponse>> {
    require_staff(current_user)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Lessons::new(&mut conn);

    let lesson = repo
        .update(
            lesson_id,
            &LessonUpdateDBRequest {
                title: request.title,
                content: request.content,
                video_url: request.video_url,
                position: request.position,
                points_reward: request.points_reward,
                is_published: request.is_published,
                keywords: request.keywords,
            },
        )
        .await?;

    Ok(Json(lesson.into()))
}

/// Delete a lesson (staff)
#[utoipa::path(
    delete,
    path = "/admin/lessons/{lesson_id}",
    tag = "admin",
    responses(
        (status = 204, description = "Lesson deleted"),
        (status = 404, description = "Lesson not found"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn delete_lesson(
    State(state): State<AppState>,
    Path(lesson_id): Path<LessonId>,
    current_user: CurrentUser,
) -> Result<StatusCode> {
    require_staff(current_user)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Lessons::new(&mut conn);

    if repo.delete(lesson_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(lesson_not_found(lesson_id))
    }
}

#[cfg(test)]
mod tests {
    use crate::api::models::lessons::{LessonCompletionResponse, LessonResponse};
    use crate::api::models::users::Role;
    use crate::test_utils::{
        activate_subscription, create_test_app, create_test_course, create_test_lesson, create_test_user, session_cookie,
    };
    use axum::http::StatusCode;
    use sqlx::PgPool;

    async fn points_balance(pool: &PgPool, user_id: uuid::Uuid) -> i32 {
        sqlx::query_scalar::<_, i32>("SELECT points_balance FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[sqlx::test]
    async fn test_lesson_content_requires_subscription(pool: PgPool) {
        let (app, config) = create_test_app(pool.clone()).await;
        let member = create_test_user(&pool, Role::Member).await;
        let course = create_test_course(&pool, "Grammar", true).await;
        let lesson = create_test_lesson(&pool, course.id, "Particles", true).await;
        let cookie = session_cookie(&member, &config);

        let response = app
            .get(&format!("/api/v1/lessons/{}", lesson.id))
            .add_header("cookie", cookie.as_str())
            .await;
        response.assert_status(StatusCode::PAYMENT_REQUIRED);

        activate_subscription(&pool, member.id).await;

        let response = app
            .get(&format!("/api/v1/lessons/{}", lesson.id))
            .add_header("cookie", cookie.as_str())
            .await;
        response.assert_status(StatusCode::OK);
        let body: LessonResponse = response.json();
        assert_eq!(body.id, lesson.id);
    }

    #[sqlx::test]
    async fn test_completion_awards_points_once(pool: PgPool) {
        let (app, config) = create_test_app(pool.clone()).await;
        let member = create_test_user(&pool, Role::Member).await;
        activate_subscription(&pool, member.id).await;
        let course = create_test_course(&pool, "Grammar", true).await;
        let lesson = create_test_lesson(&pool, course.id, "Particles", true).await;
        let cookie = session_cookie(&member, &config);

        let before = points_balance(&pool, member.id).await;

        let response = app
            .post(&format!("/api/v1/lessons/{}/completions", lesson.id))
            .add_header("cookie", cookie.as_str())
            .await;
        response.assert_status(StatusCode::CREATED);
        let body: LessonCompletionResponse = response.json();
        assert_eq!(body.points_awarded, lesson.points_reward);

        assert_eq!(points_balance(&pool, member.id).await, before + lesson.points_reward);

        // Repeat completion conflicts and awards nothing
        let response = app
            .post(&format!("/api/v1/lessons/{}/completions", lesson.id))
            .add_header("cookie", cookie.as_str())
            .await;
        response.assert_status(StatusCode::CONFLICT);
        assert_eq!(points_balance(&pool, member.id).await, before + lesson.points_reward);
    }

    #[sqlx::test]
    async fn test_unpublished_lesson_hidden_from_members(pool: PgPool) {
        let (app, config) = create_test_app(pool.clone()).await;
        let member = create_test_user(&pool, Role::Member).await;
        activate_subscription(&pool, member.id).await;
        let instructor = create_test_user(&pool, Role::Instructor).await;
        let course = create_test_course(&pool, "Grammar", true).await;
        let lesson = create_test_lesson(&pool, course.id, "Draft Lesson", false).await;

        let response = app
            .get(&format!("/api/v1/lessons/{}", lesson.id))
            .add_header("cookie", session_cookie(&member, &config))
            .await;
        response.assert_status(StatusCode::NOT_FOUND);

        let response = app
            .get(&format!("/api/v1/lessons/{}", lesson.id))
            .add_header("cookie", session_cookie(&instructor, &config))
            .await;
        response.assert_status(StatusCode::OK);
    }

    #[sqlx::test]
    async fn test_lesson_crud_via_admin_routes(pool: PgPool) {
        let (app, config) = create_test_app(pool.clone()).await;
        let admin = create_test_user(&pool, Role::Admin).await;
        let course = create_test_course(&pool, "Kanji", true).await;
        let cookie = session_cookie(&admin, &config);

        let response = app
            .post("/api/v1/admin/lessons")
            .add_header("cookie", cookie.as_str())
            .json(&serde_json::json!({
                "course_id": course.id,
                "title": "Radicals",
                "content": "# Radicals",
                "is_published": true,
                "keywords": [{"term": "山", "reading": "やま", "meaning": "mountain"}]
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let created: LessonResponse = response.json();
        assert_eq!(created.keywords.len(), 1);

        let response = app
            .patch(&format!("/api/v1/admin/lessons/{}", created.id))
            .add_header("cookie", cookie.as_str())
            .json(&serde_json::json!({"points_reward": 25}))
            .await;
        response.assert_status(StatusCode::OK);
        let updated: LessonResponse = response.json();
        assert_eq!(updated.points_reward, 25);

        let response = app
            .delete(&format!("/api/v1/admin/lessons/{}", created.id))
            .add_header("cookie", cookie.as_str())
            .await;
        response.assert_status(StatusCode::NO_CONTENT);
    }
}
