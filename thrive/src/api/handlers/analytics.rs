//! HTTP handler for the admin analytics overview.

use axum::{extract::State, Json};

use crate::{
    api::models::{analytics::AnalyticsOverviewResponse, users::CurrentUser},
    auth::require_admin,
    db::handlers::Analytics,
    errors::{Error, Result},
    AppState,
};

/// Platform-wide counters for the admin dashboard
#[utoipa::path(
    get,
    path = "/admin/analytics/overview",
    tag = "admin",
    responses(
        (status = 200, description = "Aggregate platform metrics", body = AnalyticsOverviewResponse),
        (status = 403, description = "Admin access required"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_overview(State(state): State<AppState>, current_user: CurrentUser) -> Result<Json<AnalyticsOverviewResponse>> {
    require_admin(current_user)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let overview = Analytics::new(&mut conn).overview().await?;

    Ok(Json(overview))
}
