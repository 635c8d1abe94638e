//! HTTP handlers for the course catalogue.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    api::models::{
        courses::{CourseCreate, CourseResponse, CourseUpdate, ListCoursesQuery},
        lessons::LessonSummary,
        pagination::PaginatedResponse,
        users::{CurrentUser, Role},
    },
    auth::require_staff,
    db::{
        handlers::{CourseFilter, Courses, LessonFilter, Lessons, Repository},
        models::courses::{CourseCreateDBRequest, CourseUpdateDBRequest},
    },
    errors::{Error, Result},
    types::CourseId,
    AppState,
};

fn is_staff(user: &CurrentUser) -> bool {
    matches!(user.role, Role::Admin | Role::Instructor)
}

/// List the course catalogue
#[utoipa::path(
    get,
    path = "/courses",
    tag = "courses",
    params(ListCoursesQuery),
    responses(
        (status = 200, description = "Paginated course catalogue", body = PaginatedResponse<CourseResponse>),
        (status = 401, description = "Unauthorized"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_courses(
    State(state): State<AppState>,
    Query(query): Query<ListCoursesQuery>,
    current_user: CurrentUser,
) -> Result<Json<PaginatedResponse<CourseResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Courses::new(&mut conn);

    let filter = CourseFilter {
        skip: query.pagination.skip(),
        limit: query.pagination.limit(),
        jlpt_level: query.jlpt_level,
        search: query.search,
        include_unpublished: is_staff(&current_user),
    };

    let courses = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse {
        data: courses.into_iter().map(CourseResponse::from).collect(),
        total_count,
        skip: query.pagination.skip(),
        limit: query.pagination.limit(),
    }))
}

/// Get a course by id
#[utoipa::path(
    get,
    path = "/courses/{course_id}",
    tag = "courses",
    responses(
        (status = 200, description = "Course", body = CourseResponse),
        (status = 404, description = "Course not found"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_course(
    State(state): State<AppState>,
    Path(course_id): Path<CourseId>,
    current_user: CurrentUser,
) -> Result<Json<CourseResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Courses::new(&mut conn);

    let course = repo.get_by_id(course_id).await?.ok_or_else(|| Error::NotFound {
        resource: "course".to_string(),
        id: course_id.to_string(),
    })?;

    // Drafts look like they don't exist to members
    if !course.is_published && !is_staff(&current_user) {
        return Err(Error::NotFound {
            resource: "course".to_string(),
            id: course_id.to_string(),
        });
    }

    Ok(Json(course.into()))
}

/// List a course's lessons with the caller's completion state
#[utoipa::path(
    get,
    path = "/courses/{course_id}/lessons",
    tag = "courses",
    responses(
        (status = 200, description = "Lesson summaries in course order", body = Vec<LessonSummary>),
        (status = 404, description = "Course not found"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_course_lessons(
    State(state): State<AppState>,
    Path(course_id): Path<CourseId>,
    current_user: CurrentUser,
) -> Result<Json<Vec<LessonSummary>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let staff = is_staff(&current_user);

    {
        let mut courses = Courses::new(&mut conn);
        let course = courses.get_by_id(course_id).await?.ok_or_else(|| Error::NotFound {
            resource: "course".to_string(),
            id: course_id.to_string(),
        })?;
        if !course.is_published && !staff {
            return Err(Error::NotFound {
                resource: "course".to_string(),
                id: course_id.to_string(),
            });
        }
    }

    let mut lessons = Lessons::new(&mut conn);
    let summaries = lessons
        .list_summaries(&LessonFilter {
            course_id,
            user_id: current_user.id,
            include_unpublished: staff,
        })
        .await?;

    Ok(Json(summaries.into_iter().map(LessonSummary::from).collect()))
}

/// Create a course (staff)
#[utoipa::path(
    post,
    path = "/admin/courses",
    request_body = CourseCreate,
    tag = "admin",
    responses(
        (status = 201, description = "Course created", body = CourseResponse),
        (status = 403, description = "Forbidden"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_course(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<CourseCreate>,
) -> Result<(StatusCode, Json<CourseResponse>)> {
    require_staff(current_user)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Courses::new(&mut conn);

    let course = repo
        .create(&CourseCreateDBRequest {
            title: request.title,
            description: request.description,
            jlpt_level: request.jlpt_level,
            cover_image_url: request.cover_image_url,
            is_published: request.is_published,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(course.into())))
}

/// Update a course (staff)
#[utoipa::path(
    patch,
    path = "/admin/courses/{course_id}",
    request_body = CourseUpdate,
    tag = "admin",
    responses(
        (status = 200, description = "Updated course", body = CourseResponse),
        (status = 404, description = "Course not found"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_course(
    State(state): State<AppState>,
    Path(course_id): Path<CourseId>,
    current_user: CurrentUser,
    Json(request): Json<CourseUpdate>,
) -> Result<Json<CourseResponse>> {
    require_staff(current_user)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Courses::new(&mut conn);

    let course = repo
        .update(
            course_id,
            &CourseUpdateDBRequest {
                title: request.title,
                description: request.description,
                jlpt_level: request.jlpt_level,
                cover_image_url: request.cover_image_url,
                is_published: request.is_published,
                position: request.position,
            },
        )
        .await?;

    Ok(Json(course.into()))
}

/// Delete a course and its lessons (staff)
#[utoipa::path(
    delete,
    path = "/admin/courses/{course_id}",
    tag = "admin",
    responses(
        (status = 204, description = "Course deleted"),
        (status = 404, description = "Course not found"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn delete_course(
    State(state): State<AppState>,
    Path(course_id): Path<CourseId>,
    current_user: CurrentUser,
) -> Result<StatusCode> {
    require_staff(current_user)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Courses::new(&mut conn);

    if repo.delete(course_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::NotFound {
            resource: "course".to_string(),
            id: course_id.to_string(),
        })
    }
}
