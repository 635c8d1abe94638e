//! HTTP handlers for payment processing endpoints.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::{api::models::users::CurrentUser, db::handlers::Subscriptions, AppState};

/// Stripe-specific payment processing implementation
pub mod stripe {
    use axum::{
        body::Body,
        extract::{FromRequest, State},
        http::{Request, StatusCode},
        response::{IntoResponse, Response},
    };
    use sqlx::PgPool;
    use stripe::EventType::{
        CheckoutSessionAsyncPaymentSucceeded, CheckoutSessionCompleted, CustomerSubscriptionDeleted, CustomerSubscriptionUpdated,
    };
    use stripe::{
        CheckoutSession, CheckoutSessionMode, CheckoutSessionPaymentStatus, CheckoutSessionUiMode, Client, CreateCheckoutSession,
        CreateCheckoutSessionLineItems, Event, EventObject, Expandable, Webhook,
    };

    use crate::{
        api::models::{subscriptions::SubscriptionStatus, users::CurrentUser},
        db::{
            handlers::Subscriptions,
            models::subscriptions::{SubscriptionCreateDBRequest, SubscriptionUpdateDBRequest},
        },
        types::UserId,
        AppState,
    };

    // Re-export Stripe types that the parent module needs
    pub(super) use stripe::CheckoutSessionId;

    fn map_status(status: stripe::SubscriptionStatus) -> SubscriptionStatus {
        match status {
            stripe::SubscriptionStatus::Active | stripe::SubscriptionStatus::Trialing => SubscriptionStatus::Active,
            stripe::SubscriptionStatus::PastDue | stripe::SubscriptionStatus::Unpaid => SubscriptionStatus::PastDue,
            stripe::SubscriptionStatus::Incomplete | stripe::SubscriptionStatus::Paused => SubscriptionStatus::Pending,
            stripe::SubscriptionStatus::Canceled | stripe::SubscriptionStatus::IncompleteExpired => SubscriptionStatus::Canceled,
        }
    }

    /// Create a Stripe checkout session in subscription mode and record a
    /// pending subscription row keyed by the checkout session ID. Webhooks
    /// handle activation once payment is confirmed.
    pub(super) async fn create_checkout_session(
        db_pool: &PgPool,
        user: &CurrentUser,
        api_key: &str,
        price_id: &str,
        cancel_url: &str,
        success_url: &str,
    ) -> Result<String, StatusCode> {
        let client = Client::new(api_key);

        let user_id = user.id.to_string();
        let checkout_params = CreateCheckoutSession {
            cancel_url: Some(cancel_url),
            success_url: Some(success_url),
            client_reference_id: Some(&user_id),
            customer_email: Some(&user.email),
            line_items: Some(vec![CreateCheckoutSessionLineItems {
                price: Some(price_id.to_string()),
                quantity: Some(1),
                ..Default::default()
            }]),
            mode: Some(CheckoutSessionMode::Subscription),
            ui_mode: Some(CheckoutSessionUiMode::Hosted),
            ..Default::default()
        };

        let checkout_session = CheckoutSession::create(&client, checkout_params).await.map_err(|e| {
            tracing::error!("Failed to create Stripe checkout session: {:?}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

        tracing::info!("Created checkout session {} for user {}", checkout_session.id, user.id);

        let mut conn = db_pool.acquire().await.map_err(|e| {
            tracing::error!("Failed to acquire database connection: {:?}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
        let mut subscriptions = Subscriptions::new(&mut conn);
        subscriptions
            .create(&SubscriptionCreateDBRequest {
                user_id: user.id,
                status: SubscriptionStatus::Pending,
                checkout_session_id: Some(checkout_session.id.to_string()),
            })
            .await
            .map_err(|e| {
                tracing::error!("Failed to record pending subscription: {:?}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?;

        checkout_session.url.ok_or_else(|| {
            tracing::error!("Checkout session missing URL");
            StatusCode::INTERNAL_SERVER_ERROR
        })
    }

    /// Activate the subscription recorded for a completed checkout session.
    /// Idempotent: a session whose subscription is already active is skipped.
    pub(super) async fn process_checkout_session(
        db_pool: &PgPool,
        api_key: &str,
        session_id: &CheckoutSessionId,
    ) -> Result<(), StatusCode> {
        let mut conn = db_pool.acquire().await.map_err(|e| {
            tracing::error!("Failed to acquire database connection: {:?}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
        let mut subscriptions = Subscriptions::new(&mut conn);

        let existing = subscriptions.get_by_checkout_session(session_id.as_str()).await.map_err(|e| {
            tracing::error!("Failed to look up subscription for checkout session: {:?}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

        if let Some(subscription) = &existing {
            if subscription.status == SubscriptionStatus::Active {
                tracing::info!("Subscription for session_id {} already active, skipping (idempotent)", session_id);
                return Ok(());
            }
        }

        let client = Client::new(api_key);

        let checkout_session = CheckoutSession::retrieve(&client, session_id, &["subscription"]).await.map_err(|e| {
            tracing::error!("Failed to retrieve Stripe checkout session: {:?}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

        if checkout_session.payment_status != CheckoutSessionPaymentStatus::Paid {
            tracing::info!(
                "Checkout session {} has not been paid (status: {:?}), skipping.",
                session_id,
                checkout_session.payment_status
            );
            return Err(StatusCode::PAYMENT_REQUIRED);
        }

        let stripe_customer_id = checkout_session.customer.as_ref().map(|c| c.id().to_string());
        let (stripe_subscription_id, current_period_end) = match &checkout_session.subscription {
            Some(Expandable::Object(subscription)) => (
                Some(subscription.id.to_string()),
                chrono::DateTime::from_timestamp(subscription.current_period_end, 0),
            ),
            Some(Expandable::Id(id)) => (Some(id.to_string()), None),
            None => (None, None),
        };

        let update = SubscriptionUpdateDBRequest {
            status: Some(SubscriptionStatus::Active),
            stripe_customer_id,
            stripe_subscription_id,
            current_period_end,
        };

        let subscription_id = match existing {
            Some(subscription) => subscription.id,
            None => {
                // Webhook arrived for a session we never recorded, fall back
                // to the user reference Stripe carried through checkout
                let local_user_id = checkout_session.client_reference_id.ok_or_else(|| {
                    tracing::error!("Checkout session missing client_reference_id");
                    StatusCode::BAD_REQUEST
                })?;
                let user_id: UserId = local_user_id.parse().map_err(|e| {
                    tracing::error!("Failed to parse user ID: {:?}", e);
                    StatusCode::BAD_REQUEST
                })?;
                subscriptions
                    .create(&SubscriptionCreateDBRequest {
                        user_id,
                        status: SubscriptionStatus::Pending,
                        checkout_session_id: Some(session_id.to_string()),
                    })
                    .await
                    .map_err(|e| {
                        tracing::error!("Failed to record subscription: {:?}", e);
                        StatusCode::INTERNAL_SERVER_ERROR
                    })?
                    .id
            }
        };

        let activated = subscriptions.update(subscription_id, &update).await.map_err(|e| {
            tracing::error!("Failed to activate subscription: {:?}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

        tracing::info!(
            "Successfully fulfilled checkout session {} for user {}",
            session_id,
            activated.user_id
        );
        Ok(())
    }

    /// Keep our subscription row in step with Stripe's view of the
    /// subscription lifecycle (renewals, dunning, cancellation).
    async fn sync_subscription(db_pool: &PgPool, subscription: &stripe::Subscription) -> Result<(), StatusCode> {
        let mut conn = db_pool.acquire().await.map_err(|e| {
            tracing::error!("Failed to acquire database connection: {:?}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
        let mut subscriptions = Subscriptions::new(&mut conn);

        let Some(existing) = subscriptions
            .get_by_stripe_subscription(subscription.id.as_str())
            .await
            .map_err(|e| {
                tracing::error!("Failed to look up subscription: {:?}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?
        else {
            tracing::warn!("Received event for unknown Stripe subscription {}", subscription.id);
            return Ok(());
        };

        subscriptions
            .update(
                existing.id,
                &SubscriptionUpdateDBRequest {
                    status: Some(map_status(subscription.status)),
                    current_period_end: chrono::DateTime::from_timestamp(subscription.current_period_end, 0),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| {
                tracing::error!("Failed to sync subscription status: {:?}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?;

        Ok(())
    }

    /// StripeEvent extractor that validates webhook signatures
    pub struct StripeEvent(pub Event);

    impl FromRequest<AppState> for StripeEvent
    where
        String: FromRequest<AppState>,
    {
        type Rejection = Response;

        async fn from_request(req: Request<Body>, state: &AppState) -> Result<Self, Self::Rejection> {
            let signature = if let Some(sig) = req.headers().get("stripe-signature") {
                sig.to_owned()
            } else {
                tracing::error!("Missing stripe-signature header");
                return Err(StatusCode::BAD_REQUEST.into_response());
            };

            let payload = String::from_request(req, state).await.map_err(IntoResponse::into_response)?;

            let webhook_secret = match state.config.payment.as_ref() {
                Some(crate::config::PaymentConfig::Stripe(stripe_config)) => &stripe_config.webhook_secret,
                None => {
                    tracing::error!("Payment provider not configured");
                    return Err(StatusCode::INTERNAL_SERVER_ERROR.into_response());
                }
            };

            let signature = signature.to_str().map_err(|_| {
                tracing::error!("Invalid stripe-signature header");
                StatusCode::BAD_REQUEST.into_response()
            })?;

            Ok(Self(Webhook::construct_event(&payload, signature, webhook_secret).map_err(|e| {
                tracing::error!("Failed to construct webhook event: {:?}", e);
                StatusCode::BAD_REQUEST.into_response()
            })?))
        }
    }

    /// Stripe webhook handler, used directly as an Axum route handler.
    /// Checkout completion activates the pending subscription; subscription
    /// lifecycle events keep the local status in step. Always answers 200 so
    /// Stripe does not retry events we have already handled or chosen to skip.
    #[tracing::instrument(skip_all)]
    pub async fn webhook(State(state): State<AppState>, StripeEvent(event): StripeEvent) -> StatusCode {
        let api_key = match state.config.payment.as_ref() {
            Some(crate::config::PaymentConfig::Stripe(stripe_config)) => &stripe_config.api_key,
            None => {
                tracing::warn!("Stripe webhook called but Stripe is not configured");
                return StatusCode::NOT_IMPLEMENTED;
            }
        };

        tracing::info!("Received webhook event: {:?}", event.type_);

        match event.type_ {
            CheckoutSessionCompleted | CheckoutSessionAsyncPaymentSucceeded => {
                let session = match event.data.object {
                    EventObject::CheckoutSession(session) => session,
                    _ => {
                        tracing::error!("Expected CheckoutSession object, got something else");
                        return StatusCode::OK;
                    }
                };

                tracing::info!("Processing checkout session event for session: {:?}", session.id);

                match process_checkout_session(&state.db, api_key, &session.id).await {
                    Ok(()) => StatusCode::OK,
                    Err(_) => StatusCode::OK,
                }
            }
            CustomerSubscriptionUpdated | CustomerSubscriptionDeleted => {
                let subscription = match event.data.object {
                    EventObject::Subscription(subscription) => subscription,
                    _ => {
                        tracing::error!("Expected Subscription object, got something else");
                        return StatusCode::OK;
                    }
                };

                match sync_subscription(&state.db, &subscription).await {
                    Ok(()) => StatusCode::OK,
                    Err(_) => StatusCode::OK,
                }
            }
            _ => {
                tracing::debug!("Ignoring webhook event type: {:?}", event.type_);
                StatusCode::OK
            }
        }
    }
}

#[utoipa::path(
    post,
    path = "/create_checkout",
    tag = "payments",
    summary = "Create checkout session",
    description = "Creates a subscription checkout session and returns the payment provider's hosted checkout URL",
    responses(
        (status = 200, description = "Checkout URL for the frontend to navigate to"),
        (status = 409, description = "Caller already has an active subscription"),
        (status = 501, description = "No payment provider configured"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_checkout(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    user: CurrentUser,
) -> Result<Response, StatusCode> {
    let stripe_config = match state.config.payment.as_ref() {
        Some(crate::config::PaymentConfig::Stripe(stripe_config)) => stripe_config,
        None => {
            tracing::warn!("Checkout requested but no payment provider is configured");
            let error_response = Json(json!({
                "error": "No payment provider configured",
                "message": "Sorry, there's no payment provider setup. Please contact support."
            }));
            return Ok((StatusCode::NOT_IMPLEMENTED, error_response).into_response());
        }
    };

    // Don't sell someone a second subscription
    {
        let mut conn = state.db.acquire().await.map_err(|e| {
            tracing::error!("Failed to acquire database connection: {:?}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
        let mut subscriptions = Subscriptions::new(&mut conn);
        let active = subscriptions.has_active_subscription(user.id).await.map_err(|e| {
            tracing::error!("Failed to check subscription state: {:?}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
        if active {
            return Ok((
                StatusCode::CONFLICT,
                Json(json!({
                    "error": "Already subscribed",
                    "message": "You already have an active subscription"
                })),
            )
                .into_response());
        }
    }

    // Build redirect URLs from request origin
    let origin = headers
        .get(header::ORIGIN)
        .or_else(|| headers.get(header::REFERER))
        .and_then(|h| h.to_str().ok())
        .and_then(|s| {
            // If it's a referer, extract just the origin part
            if let Ok(url) = url::Url::parse(s) {
                url.origin().ascii_serialization().into()
            } else {
                Some(s.to_string())
            }
        })
        .unwrap_or_else(|| {
            let host = headers.get(header::HOST).and_then(|h| h.to_str().ok()).unwrap_or("localhost:3001");

            let proto = headers.get("x-forwarded-proto").and_then(|h| h.to_str().ok()).unwrap_or("http");

            format!("{proto}://{host}")
        });

    let success_url = format!("{origin}/subscribe?payment=success&session_id={{CHECKOUT_SESSION_ID}}");
    let cancel_url = format!("{origin}/subscribe?payment=cancelled&session_id={{CHECKOUT_SESSION_ID}}");

    tracing::info!("Building checkout URLs with origin: {}", origin);

    let checkout_url = stripe::create_checkout_session(
        &state.db,
        &user,
        &stripe_config.api_key,
        &stripe_config.price_id,
        &cancel_url,
        &success_url,
    )
    .await?;

    Ok(Json(json!({
        "url": checkout_url
    }))
    .into_response())
}

/// Manually process a checkout session
/// This endpoint allows the frontend to trigger payment processing for a specific session ID.
/// Useful as a fallback when webhooks fail or for immediate payment confirmation.
#[utoipa::path(
    post,
    path = "/process_payment/{session_id}",
    tag = "payments",
    summary = "Process payment for checkout session",
    description = "Activates the subscription for a completed checkout session. This is idempotent.",
    responses(
        (status = 200, description = "Payment processed successfully"),
        (status = 402, description = "Payment not completed yet"),
        (status = 400, description = "Invalid session ID or missing data"),
        (status = 501, description = "Payment provider not configured"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn process_payment(
    State(state): State<AppState>,
    axum::extract::Path(session_id): axum::extract::Path<String>,
    _user: CurrentUser,
) -> Result<Response, StatusCode> {
    match state.config.payment.as_ref() {
        Some(crate::config::PaymentConfig::Stripe(stripe_config)) => {
            let api_key = &stripe_config.api_key;
            let checkout_session_id: stripe::CheckoutSessionId = session_id.parse().map_err(|_| StatusCode::BAD_REQUEST)?;

            match stripe::process_checkout_session(&state.db, api_key, &checkout_session_id).await {
                Ok(()) => Ok(Json(json!({
                    "success": true,
                    "message": "Payment processed successfully"
                }))
                .into_response()),
                Err(StatusCode::PAYMENT_REQUIRED) => Ok((
                    StatusCode::PAYMENT_REQUIRED,
                    Json(json!({
                        "error": "Payment not completed",
                        "message": "The payment has not been completed yet"
                    })),
                )
                    .into_response()),
                Err(status) => Err(status),
            }
        }
        None => {
            tracing::warn!("Payment processing requested but no payment provider is configured");
            Ok((
                StatusCode::NOT_IMPLEMENTED,
                Json(json!({
                    "error": "No payment provider configured",
                    "message": "Payment provider is not configured"
                })),
            )
                .into_response())
        }
    }
}
