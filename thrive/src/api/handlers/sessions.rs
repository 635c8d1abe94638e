//! HTTP handlers for the speaking session calendar.

use std::collections::HashSet;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;

use crate::{
    api::models::{
        pagination::PaginatedResponse,
        points::PointsReason,
        sessions::{ListSessionsQuery, SpeakingSessionCreate, SpeakingSessionResponse, SpeakingSessionUpdate},
        users::{CurrentUser, Role},
    },
    auth::require_staff,
    db::{
        handlers::{BookingFilter, Bookings, Points, Repository, SessionFilter, SpeakingSessions},
        models::{
            points::PointsTransactionCreateDBRequest,
            sessions::{SpeakingSessionCreateDBRequest, SpeakingSessionUpdateDBRequest},
        },
    },
    errors::{Error, Result},
    types::SpeakingSessionId,
    AppState,
};

fn is_staff(user: &CurrentUser) -> bool {
    matches!(user.role, Role::Admin | Role::Instructor)
}

fn session_not_found(id: SpeakingSessionId) -> Error {
    Error::NotFound {
        resource: "speaking session".to_string(),
        id: id.to_string(),
    }
}

fn validate_session_fields(capacity: Option<i32>, duration_minutes: Option<i32>, points_cost: Option<i32>) -> Result<()> {
    if let Some(capacity) = capacity {
        if capacity < 1 {
            return Err(Error::BadRequest {
                message: "Capacity must be at least 1".to_string(),
            });
        }
    }
    if let Some(duration) = duration_minutes {
        if duration < 1 {
            return Err(Error::BadRequest {
                message: "Duration must be at least one minute".to_string(),
            });
        }
    }
    if let Some(cost) = points_cost {
        if cost < 0 {
            return Err(Error::BadRequest {
                message: "Points cost cannot be negative".to_string(),
            });
        }
    }
    Ok(())
}

/// List speaking sessions on the calendar
#[utoipa::path(
    get,
    path = "/calendar/sessions",
    tag = "calendar",
    params(ListSessionsQuery),
    responses(
        (status = 200, description = "Sessions in start order", body = PaginatedResponse<SpeakingSessionResponse>),
        (status = 401, description = "Unauthorized"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<ListSessionsQuery>,
    current_user: CurrentUser,
) -> Result<Json<PaginatedResponse<SpeakingSessionResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let staff = is_staff(&current_user);

    let filter = SessionFilter {
        skip: query.pagination.skip(),
        limit: query.pagination.limit(),
        // The calendar defaults to upcoming sessions
        from: Some(query.from.unwrap_or_else(Utc::now)),
        to: query.to,
        include_canceled: query.include_canceled.unwrap_or(false),
    };

    let (sessions, total_count) = {
        let mut repo = SpeakingSessions::new(&mut conn);
        let sessions = repo.list(&filter).await?;
        let total_count = repo.count(&filter).await?;
        (sessions, total_count)
    };

    // The meeting link is only revealed to staff and booked members
    let booked_sessions: HashSet<SpeakingSessionId> = if staff {
        HashSet::new()
    } else {
        let mut bookings = Bookings::new(&mut conn);
        bookings
            .list(&BookingFilter {
                skip: 0,
                limit: i64::MAX,
                user_id: Some(current_user.id),
                include_canceled: false,
            })
            .await?
            .into_iter()
            .map(|b| b.session_id)
            .collect()
    };

    let data = sessions
        .into_iter()
        .map(SpeakingSessionResponse::from)
        .map(|s| {
            if staff || booked_sessions.contains(&s.id) {
                s
            } else {
                s.redacted()
            }
        })
        .collect();

    Ok(Json(PaginatedResponse {
        data,
        total_count,
        skip: query.pagination.skip(),
        limit: query.pagination.limit(),
    }))
}

/// Get a speaking session
#[utoipa::path(
    get,
    path = "/calendar/sessions/{session_id}",
    tag = "calendar",
    responses(
        (status = 200, description = "Session", body = SpeakingSessionResponse),
        (status = 404, description = "Session not found"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<SpeakingSessionId>,
    current_user: CurrentUser,
) -> Result<Json<SpeakingSessionResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let staff = is_staff(&current_user);

    let session = {
        let mut repo = SpeakingSessions::new(&mut conn);
        repo.get_by_id(session_id).await?.ok_or_else(|| session_not_found(session_id))?
    };

    let booked = if staff {
        true
    } else {
        let mut bookings = Bookings::new(&mut conn);
        bookings
            .list(&BookingFilter {
                skip: 0,
                limit: 1,
                user_id: Some(current_user.id),
                include_canceled: false,
            })
            .await?
            .iter()
            .any(|b| b.session_id == session_id)
    };

    let response = SpeakingSessionResponse::from(session);
    Ok(Json(if booked { response } else { response.redacted() }))
}

/// Create a speaking session (staff)
#[utoipa::path(
    post,
    path = "/admin/sessions",
    request_body = SpeakingSessionCreate,
    tag = "admin",
    responses(
        (status = 201, description = "Session created", body = SpeakingSessionResponse),
        (status = 400, description = "Invalid session"),
        (status = 403, description = "Forbidden"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_session(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<SpeakingSessionCreate>,
) -> Result<(StatusCode, Json<SpeakingSessionResponse>)> {
    let staff = require_staff(current_user)?;

    validate_session_fields(Some(request.capacity), Some(request.duration_minutes), Some(request.points_cost))?;
    if request.starts_at <= Utc::now() {
        return Err(Error::BadRequest {
            message: "Sessions must start in the future".to_string(),
        });
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = SpeakingSessions::new(&mut conn);

    let session = repo
        .create(&SpeakingSessionCreateDBRequest {
            title: request.title,
            description: request.description,
            host_id: request.host_id.unwrap_or(staff.id),
            starts_at: request.starts_at,
            duration_minutes: request.duration_minutes,
            capacity: request.capacity,
            points_cost: request.points_cost,
            min_jlpt_level: request.min_jlpt_level,
            meeting_url: request.meeting_url,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(session.into())))
}

/// Update a speaking session (staff)
#[utoipa::path(
    patch,
    path = "/admin/sessions/{session_id}",
    request_body = SpeakingSessionUpdate,
    tag = "admin",
    responses(
        (status = 200, description = "Updated session", body = SpeakingSessionResponse),
        (status = 400, description = "Capacity below active bookings"),
        (status = 404, description = "Session not found"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_session(
    State(state): State<AppState>,
    Path(session_id): Path<SpeakingSessionId>,
    current_user: CurrentUser,
    Json(request): Json<SpeakingSessionUpdate>,
) -> Result<Json<SpeakingSessionResponse>> {
    require_staff(current_user)?;

    validate_session_fields(request.capacity, request.duration_minutes, request.points_cost)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = SpeakingSessions::new(&mut conn);

    let session = repo
        .update(
            session_id,
            &SpeakingSessionUpdateDBRequest {
                title: request.title,
                description: request.description,
                starts_at: request.starts_at,
                duration_minutes: request.duration_minutes,
                capacity: request.capacity,
                points_cost: request.points_cost,
                min_jlpt_level: request.min_jlpt_level,
                meeting_url: request.meeting_url,
            },
        )
        .await?;

    Ok(Json(session.into()))
}

/// Cancel a speaking session, refunding all active bookings (staff)
#[utoipa::path(
    post,
    path = "/admin/sessions/{session_id}/cancel",
    tag = "admin",
    responses(
        (status = 200, description = "Session canceled and bookings refunded", body = SpeakingSessionResponse),
        (status = 404, description = "Session not found or already canceled"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn cancel_session(
    State(state): State<AppState>,
    Path(session_id): Path<SpeakingSessionId>,
    current_user: CurrentUser,
) -> Result<Json<SpeakingSessionResponse>> {
    require_staff(current_user)?;

    // Cancellation and every refund land in one transaction
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let active_bookings = {
        let mut bookings = Bookings::new(&mut tx);
        bookings.list_active_for_session(session_id).await?
    };

    let session = {
        let mut repo = SpeakingSessions::new(&mut tx);
        repo.cancel(session_id).await?
    };

    for booking in &active_bookings {
        {
            let mut bookings = Bookings::new(&mut tx);
            bookings.cancel(booking.id).await?;
        }
        if booking.points_spent > 0 {
            let mut points = Points::new(&mut tx);
            points
                .apply(&PointsTransactionCreateDBRequest {
                    user_id: booking.user_id,
                    amount: booking.points_spent,
                    reason: PointsReason::BookingRefund,
                    reference_id: Some(booking.id),
                    note: Some(format!("Session canceled: {}", session.title)),
                })
                .await?;
        }
    }

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    tracing::info!(
        session_id = %session_id,
        refunded = active_bookings.len(),
        "speaking session canceled"
    );

    // Refetch for the post-cancel booked_count
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = SpeakingSessions::new(&mut conn);
    let session = repo.get_by_id(session_id).await?.ok_or_else(|| session_not_found(session_id))?;

    Ok(Json(session.into()))
}

#[cfg(test)]
mod tests {
    use crate::api::models::pagination::PaginatedResponse;
    use crate::api::models::sessions::SpeakingSessionResponse;
    use crate::api::models::users::Role;
    use crate::test_utils::{
        activate_subscription, book_session, create_test_app, create_test_session, create_test_user, grant_points, session_cookie,
    };
    use axum::http::StatusCode;
    use sqlx::PgPool;

    #[sqlx::test]
    async fn test_calendar_redacts_meeting_url(pool: PgPool) {
        let (app, config) = create_test_app(pool.clone()).await;
        let member = create_test_user(&pool, Role::Member).await;
        let instructor = create_test_user(&pool, Role::Instructor).await;
        let session = create_test_session(&pool, instructor.id, 4, 10).await;

        let response = app
            .get("/api/v1/calendar/sessions")
            .add_header("cookie", session_cookie(&member, &config))
            .await;
        response.assert_status(StatusCode::OK);
        let body: PaginatedResponse<SpeakingSessionResponse> = response.json();
        assert_eq!(body.total_count, 1);
        assert!(body.data[0].meeting_url.is_none());

        let response = app
            .get("/api/v1/calendar/sessions")
            .add_header("cookie", session_cookie(&instructor, &config))
            .await;
        let body: PaginatedResponse<SpeakingSessionResponse> = response.json();
        assert!(body.data[0].meeting_url.is_some());

        // Booked members see the link
        activate_subscription(&pool, member.id).await;
        grant_points(&pool, member.id, 100).await;
        book_session(&pool, session.id, member.id, 10).await;

        let response = app
            .get(&format!("/api/v1/calendar/sessions/{}", session.id))
            .add_header("cookie", session_cookie(&member, &config))
            .await;
        let body: SpeakingSessionResponse = response.json();
        assert!(body.meeting_url.is_some());
    }

    #[sqlx::test]
    async fn test_session_create_validation(pool: PgPool) {
        let (app, config) = create_test_app(pool.clone()).await;
        let instructor = create_test_user(&pool, Role::Instructor).await;
        let cookie = session_cookie(&instructor, &config);

        let response = app
            .post("/api/v1/admin/sessions")
            .add_header("cookie", cookie.as_str())
            .json(&serde_json::json!({
                "title": "Free Talk",
                "starts_at": chrono::Utc::now() + chrono::Duration::days(1),
                "duration_minutes": 45,
                "capacity": 0,
                "points_cost": 10
            }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);

        let response = app
            .post("/api/v1/admin/sessions")
            .add_header("cookie", cookie.as_str())
            .json(&serde_json::json!({
                "title": "Free Talk",
                "starts_at": chrono::Utc::now() - chrono::Duration::hours(1),
                "duration_minutes": 45,
                "capacity": 4,
                "points_cost": 10
            }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);

        let response = app
            .post("/api/v1/admin/sessions")
            .add_header("cookie", cookie.as_str())
            .json(&serde_json::json!({
                "title": "Free Talk",
                "starts_at": chrono::Utc::now() + chrono::Duration::days(1),
                "duration_minutes": 45,
                "capacity": 4,
                "points_cost": 10
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let body: SpeakingSessionResponse = response.json();
        assert_eq!(body.host_id, instructor.id);
    }

    #[sqlx::test]
    async fn test_capacity_cannot_drop_below_bookings(pool: PgPool) {
        let (app, config) = create_test_app(pool.clone()).await;
        let instructor = create_test_user(&pool, Role::Instructor).await;
        let session = create_test_session(&pool, instructor.id, 4, 0).await;

        for _ in 0..2 {
            let member = create_test_user(&pool, Role::Member).await;
            book_session(&pool, session.id, member.id, 0).await;
        }

        let response = app
            .patch(&format!("/api/v1/admin/sessions/{}", session.id))
            .add_header("cookie", session_cookie(&instructor, &config))
            .json(&serde_json::json!({"capacity": 1}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);

        let response = app
            .patch(&format!("/api/v1/admin/sessions/{}", session.id))
            .add_header("cookie", session_cookie(&instructor, &config))
            .json(&serde_json::json!({"capacity": 6}))
            .await;
        response.assert_status(StatusCode::OK);
    }

    #[sqlx::test]
    async fn test_cancel_refunds_bookings(pool: PgPool) {
        let (app, config) = create_test_app(pool.clone()).await;
        let instructor = create_test_user(&pool, Role::Instructor).await;
        let member = create_test_user(&pool, Role::Member).await;
        let session = create_test_session(&pool, instructor.id, 4, 30).await;

        grant_points(&pool, member.id, 100).await;
        book_session(&pool, session.id, member.id, 30).await;

        let balance_before = sqlx::query_scalar::<_, i32>("SELECT points_balance FROM users WHERE id = $1")
            .bind(member.id)
            .fetch_one(&pool)
            .await
            .unwrap();

        let response = app
            .post(&format!("/api/v1/admin/sessions/{}/cancel", session.id))
            .add_header("cookie", session_cookie(&instructor, &config))
            .await;
        response.assert_status(StatusCode::OK);
        let body: SpeakingSessionResponse = response.json();
        assert!(body.canceled_at.is_some());
        assert_eq!(body.booked_count, 0);

        let balance_after = sqlx::query_scalar::<_, i32>("SELECT points_balance FROM users WHERE id = $1")
            .bind(member.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(balance_after, balance_before + 30);
    }
}
