//! HTTP handlers for booking speaking sessions.
//!
//! Booking is the one flow where everything has to hold at once: a seat, an
//! active subscription, and enough points. The handler locks the session row
//! first so two members racing for the last seat cannot both win.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;

use crate::{
    api::{
        handlers::subscriptions::ensure_subscribed,
        models::{
            bookings::{BookingResponse, ListBookingsQuery},
            pagination::PaginatedResponse,
            points::PointsReason,
            users::{CurrentUser, Role},
        },
    },
    db::{
        errors::DbError,
        handlers::{BookingFilter, Bookings, Points, Repository, Users},
        models::points::PointsTransactionCreateDBRequest,
    },
    email::EmailService,
    errors::{Error, Result},
    types::{BookingId, Operation, SpeakingSessionId},
    AppState,
};

fn is_staff(user: &CurrentUser) -> bool {
    matches!(user.role, Role::Admin | Role::Instructor)
}

/// Book a seat in a speaking session
#[utoipa::path(
    post,
    path = "/calendar/sessions/{session_id}/bookings",
    tag = "calendar",
    responses(
        (status = 201, description = "Booking confirmed", body = BookingResponse),
        (status = 400, description = "Session already started, JLPT goal too low, or not enough points"),
        (status = 402, description = "Active subscription required"),
        (status = 404, description = "Session not found"),
        (status = 409, description = "Session full, canceled, or already booked"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all, fields(session_id = %session_id))]
pub async fn create_booking(
    State(state): State<AppState>,
    Path(session_id): Path<SpeakingSessionId>,
    current_user: CurrentUser,
) -> Result<(StatusCode, Json<BookingResponse>)> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    if !is_staff(&current_user) {
        ensure_subscribed(&mut tx, current_user.id).await?;
    }

    // Row lock freezes the seat count until we commit
    let session = {
        let mut bookings = Bookings::new(&mut tx);
        bookings.lock_session(session_id).await?.ok_or_else(|| Error::NotFound {
            resource: "speaking session".to_string(),
            id: session_id.to_string(),
        })?
    };

    if session.canceled_at.is_some() {
        return Err(Error::Conflict {
            message: "This session has been canceled".to_string(),
        });
    }
    if session.starts_at <= Utc::now() {
        return Err(Error::BadRequest {
            message: "This session has already started".to_string(),
        });
    }
    if session.booked_count >= session.capacity as i64 {
        return Err(Error::Conflict {
            message: "This session is fully booked".to_string(),
        });
    }

    // Level-gated sessions require a JLPT goal at or above the minimum
    if let Some(min_level) = session.min_jlpt_level {
        if !is_staff(&current_user) {
            let goal = {
                let mut users = Users::new(&mut tx);
                users.get_by_id(current_user.id).await?.and_then(|u| u.jlpt_goal)
            };
            if !goal.is_some_and(|g| g >= min_level) {
                return Err(Error::BadRequest {
                    message: format!("This session requires a JLPT goal of {min_level} or above"),
                });
            }
        }
    }

    let booking = {
        let mut bookings = Bookings::new(&mut tx);
        bookings.create(session_id, current_user.id, session.points_cost).await.map_err(|e| match e {
            DbError::UniqueViolation { .. } => Error::Conflict {
                message: "You already have a booking for this session".to_string(),
            },
            other => other.into(),
        })?
    };

    if session.points_cost > 0 {
        let mut points = Points::new(&mut tx);
        points
            .apply(&PointsTransactionCreateDBRequest {
                user_id: current_user.id,
                amount: -session.points_cost,
                reason: PointsReason::Booking,
                reference_id: Some(booking.id),
                note: Some(format!("Booked session: {}", session.title)),
            })
            .await
            .map_err(|e| match e {
                DbError::CheckViolation { .. } => Error::BadRequest {
                    message: format!("Not enough points: this session costs {}", session.points_cost),
                },
                other => other.into(),
            })?;
    }

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    // Confirmation email after commit; a delivery hiccup must not void the seat
    match EmailService::new(&state.config) {
        Ok(email_service) => {
            if let Err(e) = email_service
                .send_booking_confirmation_email(
                    &current_user.email,
                    current_user.display_name.as_deref(),
                    &session.title,
                    &session.starts_at,
                )
                .await
            {
                tracing::warn!("failed to send booking confirmation email: {e}");
            }
        }
        Err(e) => tracing::warn!("email service unavailable: {e}"),
    }

    Ok((StatusCode::CREATED, Json(booking.into())))
}

/// List the caller's bookings
#[utoipa::path(
    get,
    path = "/bookings",
    tag = "calendar",
    params(ListBookingsQuery),
    responses(
        (status = 200, description = "Bookings in session start order", body = PaginatedResponse<BookingResponse>),
        (status = 401, description = "Unauthorized"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_bookings(
    State(state): State<AppState>,
    Query(query): Query<ListBookingsQuery>,
    current_user: CurrentUser,
) -> Result<Json<PaginatedResponse<BookingResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Bookings::new(&mut conn);

    let filter = BookingFilter {
        skip: query.pagination.skip(),
        limit: query.pagination.limit(),
        user_id: Some(current_user.id),
        include_canceled: query.include_canceled.unwrap_or(false),
    };

    let bookings = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse {
        data: bookings.into_iter().map(BookingResponse::from).collect(),
        total_count,
        skip: query.pagination.skip(),
        limit: query.pagination.limit(),
    }))
}

/// Cancel a booking, refunding points when canceled before the cutoff
#[utoipa::path(
    delete,
    path = "/bookings/{booking_id}",
    tag = "calendar",
    responses(
        (status = 200, description = "Booking canceled", body = BookingResponse),
        (status = 403, description = "Not your booking"),
        (status = 404, description = "Booking not found or already canceled"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all, fields(booking_id = %booking_id))]
pub async fn cancel_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<BookingId>,
    current_user: CurrentUser,
) -> Result<Json<BookingResponse>> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let booking = {
        let mut bookings = Bookings::new(&mut tx);
        bookings.get_by_id(booking_id).await?.ok_or_else(|| Error::NotFound {
            resource: "booking".to_string(),
            id: booking_id.to_string(),
        })?
    };

    if booking.user_id != current_user.id && !is_staff(&current_user) {
        return Err(Error::InsufficientPermissions {
            action: Operation::Delete,
            resource: "booking".to_string(),
        });
    }

    let canceled = {
        let mut bookings = Bookings::new(&mut tx);
        bookings.cancel(booking_id).await?
    };

    // Refund only when canceled before the cutoff ahead of the session start
    let cutoff = chrono::Duration::from_std(state.config.calendar.cancellation_cutoff).unwrap_or(chrono::Duration::hours(24));
    let refundable = canceled
        .session_starts_at
        .map(|starts_at| Utc::now() + cutoff <= starts_at)
        .unwrap_or(false);

    if refundable && canceled.points_spent > 0 {
        let mut points = Points::new(&mut tx);
        points
            .apply(&PointsTransactionCreateDBRequest {
                user_id: canceled.user_id,
                amount: canceled.points_spent,
                reason: PointsReason::BookingRefund,
                reference_id: Some(canceled.id),
                note: canceled.session_title.as_ref().map(|t| format!("Canceled booking: {t}")),
            })
            .await?;
    }

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    tracing::info!(refunded = refundable, "booking canceled");

    Ok(Json(canceled.into()))
}

#[cfg(test)]
mod tests {
    use crate::api::models::bookings::BookingResponse;
    use crate::api::models::pagination::PaginatedResponse;
    use crate::api::models::users::Role;
    use crate::test_utils::{
        activate_subscription, create_test_app, create_test_session, create_test_session_at, create_test_user, grant_points,
        session_cookie,
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
    async fn test_booking_debits_points(pool: PgPool) {
        let (app, config) = create_test_app(pool.clone()).await;
        let instructor = create_test_user(&pool, Role::Instructor).await;
        let member = create_test_user(&pool, Role::Member).await;
        activate_subscription(&pool, member.id).await;
        grant_points(&pool, member.id, 50).await;
        let session = create_test_session(&pool, instructor.id, 4, 30).await;

        let response = app
            .post(&format!("/api/v1/calendar/sessions/{}/bookings", session.id))
            .add_header("cookie", session_cookie(&member, &config))
            .await;
        response.assert_status(StatusCode::CREATED);
        let body: BookingResponse = response.json();
        assert_eq!(body.points_spent, 30);
        assert_eq!(points_balance(&pool, member.id).await, 20);
    }

    #[sqlx::test]
    async fn test_booking_requires_subscription_and_points(pool: PgPool) {
        let (app, config) = create_test_app(pool.clone()).await;
        let instructor = create_test_user(&pool, Role::Instructor).await;
        let member = create_test_user(&pool, Role::Member).await;
        let session = create_test_session(&pool, instructor.id, 4, 30).await;
        let cookie = session_cookie(&member, &config);

        let response = app
            .post(&format!("/api/v1/calendar/sessions/{}/bookings", session.id))
            .add_header("cookie", cookie.as_str())
            .await;
        response.assert_status(StatusCode::PAYMENT_REQUIRED);

        // Subscribed but broke
        activate_subscription(&pool, member.id).await;
        let response = app
            .post(&format!("/api/v1/calendar/sessions/{}/bookings", session.id))
            .add_header("cookie", cookie.as_str())
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(points_balance(&pool, member.id).await, 0);
    }

    #[sqlx::test]
    async fn test_booking_enforces_min_jlpt_level(pool: PgPool) {
        let (app, config) = create_test_app(pool.clone()).await;
        let instructor = create_test_user(&pool, Role::Instructor).await;
        let member = create_test_user(&pool, Role::Member).await;
        activate_subscription(&pool, member.id).await;
        grant_points(&pool, member.id, 50).await;
        let session = create_test_session(&pool, instructor.id, 4, 10).await;

        sqlx::query("UPDATE speaking_sessions SET min_jlpt_level = 'N3' WHERE id = $1")
            .bind(session.id)
            .execute(&pool)
            .await
            .unwrap();
        let cookie = session_cookie(&member, &config);

        // No JLPT goal on the profile yet
        let response = app
            .post(&format!("/api/v1/calendar/sessions/{}/bookings", session.id))
            .add_header("cookie", cookie.as_str())
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);

        // Goal below the minimum
        sqlx::query("UPDATE users SET jlpt_goal = 'N4' WHERE id = $1")
            .bind(member.id)
            .execute(&pool)
            .await
            .unwrap();
        let response = app
            .post(&format!("/api/v1/calendar/sessions/{}/bookings", session.id))
            .add_header("cookie", cookie.as_str())
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);

        // Goal at the minimum
        sqlx::query("UPDATE users SET jlpt_goal = 'N3' WHERE id = $1")
            .bind(member.id)
            .execute(&pool)
            .await
            .unwrap();
        let response = app
            .post(&format!("/api/v1/calendar/sessions/{}/bookings", session.id))
            .add_header("cookie", cookie.as_str())
            .await;
        response.assert_status(StatusCode::CREATED);
        assert_eq!(points_balance(&pool, member.id).await, 40);
    }

    #[sqlx::test]
    async fn test_double_booking_conflicts(pool: PgPool) {
        let (app, config) = create_test_app(pool.clone()).await;
        let instructor = create_test_user(&pool, Role::Instructor).await;
        let member = create_test_user(&pool, Role::Member).await;
        activate_subscription(&pool, member.id).await;
        grant_points(&pool, member.id, 100).await;
        let session = create_test_session(&pool, instructor.id, 4, 10).await;
        let cookie = session_cookie(&member, &config);

        let response = app
            .post(&format!("/api/v1/calendar/sessions/{}/bookings", session.id))
            .add_header("cookie", cookie.as_str())
            .await;
        response.assert_status(StatusCode::CREATED);

        let response = app
            .post(&format!("/api/v1/calendar/sessions/{}/bookings", session.id))
            .add_header("cookie", cookie.as_str())
            .await;
        response.assert_status(StatusCode::CONFLICT);
        assert_eq!(points_balance(&pool, member.id).await, 90);
    }

    #[sqlx::test]
    async fn test_full_session_conflicts(pool: PgPool) {
        let (app, config) = create_test_app(pool.clone()).await;
        let instructor = create_test_user(&pool, Role::Instructor).await;
        let session = create_test_session(&pool, instructor.id, 1, 0).await;

        let first = create_test_user(&pool, Role::Member).await;
        activate_subscription(&pool, first.id).await;
        let response = app
            .post(&format!("/api/v1/calendar/sessions/{}/bookings", session.id))
            .add_header("cookie", session_cookie(&first, &config))
            .await;
        response.assert_status(StatusCode::CREATED);

        let second = create_test_user(&pool, Role::Member).await;
        activate_subscription(&pool, second.id).await;
        let response = app
            .post(&format!("/api/v1/calendar/sessions/{}/bookings", session.id))
            .add_header("cookie", session_cookie(&second, &config))
            .await;
        response.assert_status(StatusCode::CONFLICT);
    }

    #[sqlx::test]
    async fn test_cancel_refund_respects_cutoff(pool: PgPool) {
        let (app, config) = create_test_app(pool.clone()).await;
        let instructor = create_test_user(&pool, Role::Instructor).await;
        let member = create_test_user(&pool, Role::Member).await;
        activate_subscription(&pool, member.id).await;
        grant_points(&pool, member.id, 100).await;
        let cookie = session_cookie(&member, &config);

        // Far-out session: cancellation refunds
        let far = create_test_session_at(&pool, instructor.id, chrono::Utc::now() + chrono::Duration::days(7), 4, 40).await;
        let response = app
            .post(&format!("/api/v1/calendar/sessions/{}/bookings", far.id))
            .add_header("cookie", cookie.as_str())
            .await;
        let booking: BookingResponse = response.json();

        let response = app
            .delete(&format!("/api/v1/bookings/{}", booking.id))
            .add_header("cookie", cookie.as_str())
            .await;
        response.assert_status(StatusCode::OK);
        assert_eq!(points_balance(&pool, member.id).await, 100);

        // Session within the cutoff: no refund
        let soon = create_test_session_at(&pool, instructor.id, chrono::Utc::now() + chrono::Duration::hours(2), 4, 40).await;
        let response = app
            .post(&format!("/api/v1/calendar/sessions/{}/bookings", soon.id))
            .add_header("cookie", cookie.as_str())
            .await;
        let booking: BookingResponse = response.json();
        assert_eq!(points_balance(&pool, member.id).await, 60);

        let response = app
            .delete(&format!("/api/v1/bookings/{}", booking.id))
            .add_header("cookie", cookie.as_str())
            .await;
        response.assert_status(StatusCode::OK);
        assert_eq!(points_balance(&pool, member.id).await, 60);
    }

    #[sqlx::test]
    async fn test_cannot_cancel_someone_elses_booking(pool: PgPool) {
        let (app, config) = create_test_app(pool.clone()).await;
        let instructor = create_test_user(&pool, Role::Instructor).await;
        let owner = create_test_user(&pool, Role::Member).await;
        activate_subscription(&pool, owner.id).await;
        let session = create_test_session(&pool, instructor.id, 4, 0).await;

        let response = app
            .post(&format!("/api/v1/calendar/sessions/{}/bookings", session.id))
            .add_header("cookie", session_cookie(&owner, &config))
            .await;
        let booking: BookingResponse = response.json();

        let other = create_test_user(&pool, Role::Member).await;
        let response = app
            .delete(&format!("/api/v1/bookings/{}", booking.id))
            .add_header("cookie", session_cookie(&other, &config))
            .await;
        response.assert_status(StatusCode::FORBIDDEN);

        let response = app
            .get("/api/v1/bookings")
            .add_header("cookie", session_cookie(&owner, &config))
            .await;
        let body: PaginatedResponse<BookingResponse> = response.json();
        assert_eq!(body.total_count, 1);
    }
}
