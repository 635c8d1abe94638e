//! HTTP handlers for the community feed and moderation.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    api::models::{
        pagination::PaginatedResponse,
        posts::{ListPostsQuery, PostCreate, PostResponse, PostUpdate},
        users::{CurrentUser, Role},
    },
    auth::require_staff,
    db::{
        handlers::{PostFilter, Posts, Repository},
        models::posts::{PostCreateDBRequest, PostUpdateDBRequest},
    },
    errors::{Error, Result},
    types::{Operation, PostId},
    AppState,
};

fn is_staff(user: &CurrentUser) -> bool {
    matches!(user.role, Role::Admin | Role::Instructor)
}

fn post_not_found(id: PostId) -> Error {
    Error::NotFound {
        resource: "post".to_string(),
        id: id.to_string(),
    }
}

/// List community posts
#[utoipa::path(
    get,
    path = "/posts",
    tag = "posts",
    params(ListPostsQuery),
    responses(
        (status = 200, description = "Paginated posts, newest first", body = PaginatedResponse<PostResponse>),
        (status = 401, description = "Unauthorized"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<ListPostsQuery>,
    current_user: CurrentUser,
) -> Result<Json<PaginatedResponse<PostResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Posts::new(&mut conn);

    let filter = PostFilter {
        skip: query.pagination.skip(),
        limit: query.pagination.limit(),
        author_id: query.author_id,
        include_hidden: is_staff(&current_user),
        flagged_only: false,
    };

    let posts = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse {
        data: posts.into_iter().map(PostResponse::from).collect(),
        total_count,
        skip: query.pagination.skip(),
        limit: query.pagination.limit(),
    }))
}

/// Create a post
#[utoipa::path(
    post,
    path = "/posts",
    request_body = PostCreate,
    tag = "posts",
    responses(
        (status = 201, description = "Post created", body = PostResponse),
        (status = 400, description = "Empty body"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_post(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<PostCreate>,
) -> Result<(StatusCode, Json<PostResponse>)> {
    if request.body.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "Post body cannot be empty".to_string(),
        });
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Posts::new(&mut conn);

    let post = repo
        .create(&PostCreateDBRequest {
            author_id: current_user.id,
            body: request.body,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(post.into())))
}

/// Edit a post (author only)
#[utoipa::path(
    patch,
    path = "/posts/{post_id}",
    request_body = PostUpdate,
    tag = "posts",
    responses(
        (status = 200, description = "Updated post", body = PostResponse),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Post not found"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_post(
    State(state): State<AppState>,
    Path(post_id): Path<PostId>,
    current_user: CurrentUser,
    Json(request): Json<PostUpdate>,
) -> Result<Json<PostResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Posts::new(&mut conn);

    let post = repo.get_by_id(post_id).await?.ok_or_else(|| post_not_found(post_id))?;
    if post.author_id != current_user.id {
        return Err(Error::InsufficientPermissions {
            action: Operation::Update,
            resource: "post".to_string(),
        });
    }

    let updated = repo
        .update(
            post_id,
            &PostUpdateDBRequest {
                body: Some(request.body),
                is_hidden: None,
            },
        )
        .await?;

    Ok(Json(updated.into()))
}

/// Delete a post (author or staff)
#[utoipa::path(
    delete,
    path = "/posts/{post_id}",
    tag = "posts",
    responses(
        (status = 204, description = "Post deleted"),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Post not found"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn delete_post(
    State(state): State<AppState>,
    Path(post_id): Path<PostId>,
    current_user: CurrentUser,
) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Posts::new(&mut conn);

    let post = repo.get_by_id(post_id).await?.ok_or_else(|| post_not_found(post_id))?;
    if post.author_id != current_user.id && !is_staff(&current_user) {
        return Err(Error::InsufficientPermissions {
            action: Operation::Delete,
            resource: "post".to_string(),
        });
    }

    repo.delete(post_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Flag a post for moderation
#[utoipa::path(
    post,
    path = "/posts/{post_id}/flags",
    tag = "posts",
    responses(
        (status = 200, description = "Post flagged", body = PostResponse),
        (status = 404, description = "Post not found"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn flag_post(
    State(state): State<AppState>,
    Path(post_id): Path<PostId>,
    current_user: CurrentUser,
) -> Result<Json<PostResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Posts::new(&mut conn);

    let post = repo.get_by_id(post_id).await?.ok_or_else(|| post_not_found(post_id))?;
    if post.is_hidden {
        return Err(post_not_found(post_id));
    }

    repo.flag(post_id, current_user.id).await?;
    let post = repo.get_by_id(post_id).await?.ok_or_else(|| post_not_found(post_id))?;

    Ok(Json(post.into()))
}

/// The moderation queue: posts with at least one flag (staff)
#[utoipa::path(
    get,
    path = "/admin/posts/flagged",
    tag = "admin",
    params(ListPostsQuery),
    responses(
        (status = 200, description = "Flagged posts", body = PaginatedResponse<PostResponse>),
        (status = 403, description = "Forbidden"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_flagged_posts(
    State(state): State<AppState>,
    Query(query): Query<ListPostsQuery>,
    current_user: CurrentUser,
) -> Result<Json<PaginatedResponse<PostResponse>>> {
    require_staff(current_user)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Posts::new(&mut conn);

    let filter = PostFilter {
        skip: query.pagination.skip(),
        limit: query.pagination.limit(),
        author_id: query.author_id,
        include_hidden: true,
        flagged_only: true,
    };

    let posts = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse {
        data: posts.into_iter().map(PostResponse::from).collect(),
        total_count,
        skip: query.pagination.skip(),
        limit: query.pagination.limit(),
    }))
}

/// Hide a post from the feed (staff)
#[utoipa::path(
    post,
    path = "/admin/posts/{post_id}/hide",
    tag = "admin",
    responses(
        (status = 200, description = "Post hidden", body = PostResponse),
        (status = 404, description = "Post not found"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn hide_post(
    State(state): State<AppState>,
    Path(post_id): Path<PostId>,
    current_user: CurrentUser,
) -> Result<Json<PostResponse>> {
    require_staff(current_user)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Posts::new(&mut conn);

    if repo.get_by_id(post_id).await?.is_none() {
        return Err(post_not_found(post_id));
    }

    let post = repo.set_hidden(post_id, true).await?;
    Ok(Json(post.into()))
}

/// Restore a hidden post, clearing its flags (staff)
#[utoipa::path(
    post,
    path = "/admin/posts/{post_id}/unhide",
    tag = "admin",
    responses(
        (status = 200, description = "Post restored", body = PostResponse),
        (status = 404, description = "Post not found"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn unhide_post(
    State(state): State<AppState>,
    Path(post_id): Path<PostId>,
    current_user: CurrentUser,
) -> Result<Json<PostResponse>> {
    require_staff(current_user)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Posts::new(&mut conn);

    if repo.get_by_id(post_id).await?.is_none() {
        return Err(post_not_found(post_id));
    }

    let post = repo.set_hidden(post_id, false).await?;
    Ok(Json(post.into()))
}

#[cfg(test)]
mod tests {
    use crate::api::models::pagination::PaginatedResponse;
    use crate::api::models::posts::PostResponse;
    use crate::api::models::users::Role;
    use crate::test_utils::{create_test_app, create_test_user, session_cookie};
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use sqlx::PgPool;

    async fn create_post(app: &TestServer, cookie: &str, body: &str) -> PostResponse {
        let response = app
            .post("/api/v1/posts")
            .add_header("cookie", cookie)
            .json(&serde_json::json!({"body": body}))
            .await;
        response.assert_status(StatusCode::CREATED);
        response.json()
    }

    #[sqlx::test]
    async fn test_post_create_and_list(pool: PgPool) {
        let (app, config) = create_test_app(pool.clone()).await;
        let member = create_test_user(&pool, Role::Member).await;
        let cookie = session_cookie(&member, &config);

        create_post(&app, &cookie, "初めまして！ Just joined.").await;

        let response = app.get("/api/v1/posts").add_header("cookie", cookie.as_str()).await;
        response.assert_status(StatusCode::OK);
        let body: PaginatedResponse<PostResponse> = response.json();
        assert_eq!(body.total_count, 1);
        assert_eq!(body.data[0].author_username, member.username);
    }

    #[sqlx::test]
    async fn test_only_author_can_edit(pool: PgPool) {
        let (app, config) = create_test_app(pool.clone()).await;
        let author = create_test_user(&pool, Role::Member).await;
        let other = create_test_user(&pool, Role::Member).await;

        let post = create_post(&app, &session_cookie(&author, &config), "My study log").await;

        let response = app
            .patch(&format!("/api/v1/posts/{}", post.id))
            .add_header("cookie", session_cookie(&other, &config))
            .json(&serde_json::json!({"body": "defaced"}))
            .await;
        response.assert_status(StatusCode::FORBIDDEN);

        let response = app
            .patch(&format!("/api/v1/posts/{}", post.id))
            .add_header("cookie", session_cookie(&author, &config))
            .json(&serde_json::json!({"body": "My study log, day 2"}))
            .await;
        response.assert_status(StatusCode::OK);
    }

    #[sqlx::test]
    async fn test_flag_and_moderation_flow(pool: PgPool) {
        let (app, config) = create_test_app(pool.clone()).await;
        let author = create_test_user(&pool, Role::Member).await;
        let flagger = create_test_user(&pool, Role::Member).await;
        let admin = create_test_user(&pool, Role::Admin).await;

        let post = create_post(&app, &session_cookie(&author, &config), "spam spam spam").await;

        // Flagging twice from the same user counts once
        let flagger_cookie = session_cookie(&flagger, &config);
        for _ in 0..2 {
            let response = app
                .post(&format!("/api/v1/posts/{}/flags", post.id))
                .add_header("cookie", flagger_cookie.as_str())
                .await;
            response.assert_status(StatusCode::OK);
        }

        let admin_cookie = session_cookie(&admin, &config);
        let response = app
            .get("/api/v1/admin/posts/flagged")
            .add_header("cookie", admin_cookie.as_str())
            .await;
        let queue: PaginatedResponse<PostResponse> = response.json();
        assert_eq!(queue.total_count, 1);
        assert_eq!(queue.data[0].flag_count, 1);

        // Hide: gone from the member feed
        let response = app
            .post(&format!("/api/v1/admin/posts/{}/hide", post.id))
            .add_header("cookie", admin_cookie.as_str())
            .await;
        response.assert_status(StatusCode::OK);

        let response = app
            .get("/api/v1/posts")
            .add_header("cookie", flagger_cookie.as_str())
            .await;
        let feed: PaginatedResponse<PostResponse> = response.json();
        assert_eq!(feed.total_count, 0);

        // Unhide clears flags and restores it
        let response = app
            .post(&format!("/api/v1/admin/posts/{}/unhide", post.id))
            .add_header("cookie", admin_cookie.as_str())
            .await;
        response.assert_status(StatusCode::OK);
        let restored: PostResponse = response.json();
        assert_eq!(restored.flag_count, 0);
        assert!(!restored.is_hidden);
    }

    #[sqlx::test]
    async fn test_staff_can_delete_any_post(pool: PgPool) {
        let (app, config) = create_test_app(pool.clone()).await;
        let author = create_test_user(&pool, Role::Member).await;
        let instructor = create_test_user(&pool, Role::Instructor).await;

        let post = create_post(&app, &session_cookie(&author, &config), "to be removed").await;

        let response = app
            .delete(&format!("/api/v1/posts/{}", post.id))
            .add_header("cookie", session_cookie(&instructor, &config))
            .await;
        response.assert_status(StatusCode::NO_CONTENT);
    }
}
