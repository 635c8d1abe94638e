//! HTTP handlers for profiles and admin user management.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::{
    api::models::{
        pagination::PaginatedResponse,
        points::{ListPointsQuery, PointsGrant, PointsReason, PointsSummaryResponse, PointsTransactionResponse},
        users::{CurrentUser, ListUsersQuery, ProfileUpdate, UserResponse, UserUpdate},
    },
    auth::require_admin,
    db::{
        handlers::{Points, Repository, UserFilter, Users},
        models::{points::PointsTransactionCreateDBRequest, users::UserUpdateDBRequest},
    },
    errors::{Error, Result},
    types::UserId,
    AppState,
};

/// Get the caller's profile
#[utoipa::path(
    get,
    path = "/users/me",
    tag = "users",
    responses(
        (status = 200, description = "Current user profile", body = UserResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_profile(State(state): State<AppState>, current_user: CurrentUser) -> Result<Json<UserResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Users::new(&mut conn);

    let user = repo.get_by_id(current_user.id).await?.ok_or_else(|| Error::NotFound {
        resource: "user".to_string(),
        id: current_user.id.to_string(),
    })?;

    Ok(Json(user.into()))
}

/// Update the caller's profile
#[utoipa::path(
    patch,
    path = "/users/me",
    request_body = ProfileUpdate,
    tag = "users",
    responses(
        (status = 200, description = "Updated profile", body = UserResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_profile(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<UserResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Users::new(&mut conn);

    // Members can only touch their own display name and JLPT goal
    let db_update = UserUpdateDBRequest {
        display_name: update.display_name,
        jlpt_goal: update.jlpt_goal,
        ..Default::default()
    };

    let user = repo.update(current_user.id, &db_update).await?;
    Ok(Json(user.into()))
}

/// Get the caller's points balance and recent ledger entries
#[utoipa::path(
    get,
    path = "/users/me/points",
    tag = "users",
    params(ListPointsQuery),
    responses(
        (status = 200, description = "Points summary", body = PointsSummaryResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_my_points(
    State(state): State<AppState>,
    Query(query): Query<ListPointsQuery>,
    current_user: CurrentUser,
) -> Result<Json<PointsSummaryResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Points::new(&mut conn);

    let balance = repo.balance(current_user.id).await?;
    let transactions = repo
        .list_for_user(current_user.id, query.pagination.skip(), query.pagination.limit())
        .await?
        .into_iter()
        .map(PointsTransactionResponse::from)
        .collect();

    Ok(Json(PointsSummaryResponse { balance, transactions }))
}

/// List users (admin)
#[utoipa::path(
    get,
    path = "/admin/users",
    tag = "admin",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "Paginated list of users", body = PaginatedResponse<UserResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
    current_user: CurrentUser,
) -> Result<Json<PaginatedResponse<UserResponse>>> {
    require_admin(current_user)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Users::new(&mut conn);

    let filter = UserFilter {
        skip: query.pagination.skip(),
        limit: query.pagination.limit(),
        search: query.search,
        role: query.role,
    };

    let users = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse {
        data: users.into_iter().map(UserResponse::from).collect(),
        total_count,
        skip: query.pagination.skip(),
        limit: query.pagination.limit(),
    }))
}

/// Get a user by id (admin)
#[utoipa::path(
    get,
    path = "/admin/users/{user_id}",
    tag = "admin",
    responses(
        (status = 200, description = "User", body = UserResponse),
        (status = 404, description = "User not found"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    current_user: CurrentUser,
) -> Result<Json<UserResponse>> {
    require_admin(current_user)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Users::new(&mut conn);

    let user = repo.get_by_id(user_id).await?.ok_or_else(|| Error::NotFound {
        resource: "user".to_string(),
        id: user_id.to_string(),
    })?;

    Ok(Json(user.into()))
}

/// Update a user (admin): role changes, deactivation
#[utoipa::path(
    patch,
    path = "/admin/users/{user_id}",
    request_body = UserUpdate,
    tag = "admin",
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 400, description = "Invalid update"),
        (status = 404, description = "User not found"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    current_user: CurrentUser,
    Json(update): Json<UserUpdate>,
) -> Result<Json<UserResponse>> {
    let admin = require_admin(current_user)?;

    // Admins cannot demote or deactivate themselves, so there is always at
    // least one active admin left
    if admin.id == user_id && (update.role.is_some() || update.is_active == Some(false)) {
        return Err(Error::BadRequest {
            message: "Admins cannot change their own role or deactivate themselves".to_string(),
        });
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Users::new(&mut conn);

    let user = repo.update(user_id, &update.into()).await?;
    Ok(Json(user.into()))
}

/// Grant or deduct points for a user (admin)
#[utoipa::path(
    post,
    path = "/admin/users/{user_id}/points",
    request_body = PointsGrant,
    tag = "admin",
    responses(
        (status = 201, description = "Ledger entry created", body = PointsTransactionResponse),
        (status = 400, description = "Deduction would overdraw the balance"),
        (status = 404, description = "User not found"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn grant_points(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    current_user: CurrentUser,
    Json(grant): Json<PointsGrant>,
) -> Result<(axum::http::StatusCode, Json<PointsTransactionResponse>)> {
    require_admin(current_user)?;

    if grant.amount == 0 {
        return Err(Error::BadRequest {
            message: "Amount must be non-zero".to_string(),
        });
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    // NotFound instead of a bare foreign key error for unknown users
    let mut users = Users::new(&mut conn);
    if users.get_by_id(user_id).await?.is_none() {
        return Err(Error::NotFound {
            resource: "user".to_string(),
            id: user_id.to_string(),
        });
    }

    let mut repo = Points::new(&mut conn);
    let entry = repo
        .apply(&PointsTransactionCreateDBRequest {
            user_id,
            amount: grant.amount,
            reason: PointsReason::AdminGrant,
            reference_id: None,
            note: grant.note,
        })
        .await?;

    Ok((axum::http::StatusCode::CREATED, Json(entry.into())))
}
