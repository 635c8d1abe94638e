//! HTTP handlers for viewing subscription state.
//!
//! The [`ensure_subscribed`] helper is the single gate the content and
//! calendar handlers consult before serving paid features to members.

use axum::{extract::State, Json};
use sqlx::PgConnection;

use crate::{
    api::models::{subscriptions::SubscriptionResponse, users::CurrentUser},
    db::handlers::Subscriptions,
    errors::{Error, Result},
    types::UserId,
    AppState,
};

/// Fails with 402 unless the user holds an active subscription.
pub(crate) async fn ensure_subscribed(conn: &mut PgConnection, user_id: UserId) -> Result<()> {
    let mut subscriptions = Subscriptions::new(conn);
    if subscriptions.has_active_subscription(user_id).await? {
        Ok(())
    } else {
        Err(Error::PaymentRequired {
            message: "An active subscription is required to access this content".to_string(),
        })
    }
}

/// Get the caller's current subscription
#[utoipa::path(
    get,
    path = "/subscriptions/me",
    tag = "subscriptions",
    responses(
        (status = 200, description = "Most recent subscription, or null if none exists", body = Option<SubscriptionResponse>),
        (status = 401, description = "Unauthorized"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_my_subscription(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> Result<Json<Option<SubscriptionResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut subscriptions = Subscriptions::new(&mut conn);

    let subscription = subscriptions.get_current_for_user(current_user.id).await?;

    Ok(Json(subscription.map(SubscriptionResponse::from)))
}
