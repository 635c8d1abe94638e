//! HTTP handler for the public app configuration endpoint.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::AppState;

/// Frontend bootstrap configuration. No secrets here: this endpoint is
/// public so the SPA can render before anyone logs in.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AppConfigResponse {
    pub site_name: String,
    pub support_email: String,
    pub tagline: String,
    pub registration_enabled: bool,
    /// Stripe publishable key, absent when payments are not configured
    pub stripe_publishable_key: Option<String>,
}

#[utoipa::path(
    get,
    path = "/config",
    tag = "config",
    summary = "Get config",
    description = "Get public app configuration",
    responses(
        (status = 200, description = "Public configuration", body = AppConfigResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_config(State(state): State<AppState>) -> Json<AppConfigResponse> {
    let metadata = &state.config.metadata;

    let stripe_publishable_key = match state.config.payment.as_ref() {
        Some(crate::config::PaymentConfig::Stripe(stripe_config)) => Some(stripe_config.publishable_key.clone()),
        None => None,
    };

    Json(AppConfigResponse {
        site_name: metadata.site_name.clone(),
        support_email: metadata.support_email.clone(),
        tagline: metadata.tagline.clone(),
        registration_enabled: state.config.auth.native.enabled && state.config.auth.native.allow_registration,
        stripe_publishable_key,
    })
}

#[cfg(test)]
mod tests {
    use crate::test_utils::create_test_app;
    use axum::http::StatusCode;
    use serde_json::Value;
    use sqlx::PgPool;

    #[sqlx::test]
    async fn test_get_config_is_public(pool: PgPool) {
        let (app, _config) = create_test_app(pool).await;

        let response = app.get("/api/v1/config").await;

        response.assert_status(StatusCode::OK);
        let json: Value = response.json();
        assert!(json.get("site_name").is_some());
        assert_eq!(json["registration_enabled"], Value::Bool(true));
        assert_eq!(json["stripe_publishable_key"], Value::Null);
    }
}
