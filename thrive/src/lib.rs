//! # thrive: Backend for the Thrive in Japan learning platform
//!
//! `thrive` is the API server behind a subscription-based Japanese learning
//! community. It manages member accounts, structured course content, a
//! community feed, a calendar of live speaking sessions, and the points
//! economy that ties them together.
//!
//! ## Overview
//!
//! Members register with an email-verified account, subscribe through Stripe,
//! and work through courses of lessons organized by JLPT level. Completing a
//! lesson awards points; points buy seats in capacity-limited speaking
//! sessions hosted by instructors. A community feed with lightweight
//! moderation (member flagging, staff hiding) rounds out the platform.
//! Admins manage users, content, and the calendar, and get an analytics
//! overview of platform activity.
//!
//! ## Architecture
//!
//! The application is built on [Axum](https://github.com/tokio-rs/axum) for
//! the HTTP layer and uses PostgreSQL for all persistence.
//!
//! The **API layer** ([`api`]) is a versioned JSON API at `/api/v1/*`, with
//! authentication endpoints at `/auth/*` and the Stripe webhook at
//! `/webhooks/stripe`. Admin surfaces live under `/api/v1/admin/*`.
//!
//! The **authentication layer** ([`auth`]) is native email/password with
//! Argon2id hashing. A successful login issues a JWT carried in an HTTP-only
//! session cookie; handlers authorize against three roles (member,
//! instructor, admin).
//!
//! The **database layer** ([`db`]) uses the repository pattern. Each entity
//! has a repository wrapping a `&mut PgConnection`, so multi-step flows such
//! as booking a seat (lock the session row, insert the booking, debit points)
//! compose inside a single transaction at the call site.
//!
//! **Background services** run alongside the HTTP server: a maintenance
//! sweeper that expires stale verification codes and reset tokens and marks
//! lapsed subscriptions as past due.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use thrive::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = thrive::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     thrive::telemetry::init_tracing();
//!
//!     let app = Application::new(config).await?;
//!
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     }).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Database Setup
//!
//! The application requires a PostgreSQL database and automatically runs
//! migrations on startup:
//!
//! ```no_run
//! # use sqlx::PgPool;
//! # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
//! thrive::migrator().run(&pool).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
mod email;
pub mod errors;
mod openapi;
pub mod telemetry;
mod types;

#[cfg(test)]
pub mod test_utils;

use crate::{
    api::models::users::Role,
    auth::password,
    config::CorsOrigin,
    db::handlers::{PasswordResetTokens, Repository, Subscriptions, Users, VerificationCodes},
    db::models::users::UserCreateDBRequest,
    openapi::ApiDoc,
};
use axum::http::HeaderValue;
use axum::{
    http,
    routing::{delete, get, patch, post},
    Router,
};
use bon::Builder;
pub use config::Config;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{debug, info, instrument, Level};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use types::{BookingId, CourseId, LessonId, Operation, PostId, SpeakingSessionId, SubscriptionId, UserId};

/// Application state shared across all request handlers.
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
}

/// Get the thrive database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Create the initial admin user if it doesn't exist.
///
/// Idempotent: creates a new admin if none exists for the email, or updates
/// the password if one was provided. Called during application startup so
/// there is always an admin account available.
#[instrument(skip_all)]
pub async fn create_initial_admin_user(email: &str, password: Option<&str>, db: &PgPool) -> Result<UserId, sqlx::Error> {
    let password_hash = if let Some(pwd) = password {
        Some(password::hash_string(pwd).map_err(|e| sqlx::Error::Encode(format!("Failed to hash admin password: {e}").into()))?)
    } else {
        None
    };

    let mut tx = db.begin().await?;
    let mut user_repo = Users::new(&mut tx);

    if let Some(existing_user) = user_repo
        .get_user_by_email(email)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("Failed to check existing user: {e}")))?
    {
        if let Some(password_hash) = password_hash {
            sqlx::query("UPDATE users SET password_hash = $1 WHERE email = $2")
                .bind(password_hash)
                .bind(email)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        return Ok(existing_user.id);
    }

    let user_create = UserCreateDBRequest {
        username: email.to_string(),
        email: email.to_string(),
        display_name: None,
        role: Role::Admin,
        jlpt_goal: None,
        password_hash,
    };

    let created_user = user_repo
        .create(&user_create)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("Failed to create admin user: {e}")))?;

    tx.commit().await?;
    Ok(created_user.id)
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let mut origins = Vec::new();
    for origin in &config.auth.security.cors.allowed_origins {
        let header_value = match origin {
            CorsOrigin::Wildcard => "*".parse::<HeaderValue>()?,
            CorsOrigin::Url(url) => url.as_str().parse::<HeaderValue>()?,
        };
        origins.push(header_value);
    }

    let mut cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(config.auth.security.cors.allow_credentials)
        .allow_headers(vec![http::header::CONTENT_TYPE, http::header::AUTHORIZATION])
        .allow_methods(vec![
            http::Method::GET,
            http::Method::POST,
            http::Method::PATCH,
            http::Method::DELETE,
        ])
        .expose_headers(vec![http::header::LOCATION]);

    if let Some(max_age) = config.auth.security.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the main application router with all endpoints and middleware.
///
/// This function constructs the complete Axum router with:
/// - Authentication routes (verification codes, registration, login, password resets)
/// - The versioned JSON API (content, community, calendar, subscriptions)
/// - Admin routes (user management, moderation queue, analytics)
/// - The Stripe webhook endpoint
/// - CORS configuration and tracing middleware
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    // Authentication routes live at the root so they sit outside API versioning
    let auth_routes = Router::new()
        .route(
            "/auth/register",
            get(api::handlers::auth::get_registration_info).post(api::handlers::auth::register),
        )
        .route("/auth/login", get(api::handlers::auth::get_login_info).post(api::handlers::auth::login))
        .route("/auth/logout", post(api::handlers::auth::logout))
        .route("/auth/verification-codes", post(api::handlers::auth::request_verification_code))
        .route(
            "/auth/verification-codes/confirm",
            post(api::handlers::auth::confirm_verification_code),
        )
        .route("/auth/password-resets", post(api::handlers::auth::request_password_reset))
        .route(
            "/auth/password-resets/{token_id}/confirm",
            post(api::handlers::auth::confirm_password_reset),
        )
        .route("/auth/password-change", post(api::handlers::auth::change_password))
        .with_state(state.clone());

    // API routes
    let api_routes = Router::new()
        .route("/config", get(api::handlers::config::get_config))
        // Profile and personal history
        .route(
            "/users/me",
            get(api::handlers::users::get_profile).patch(api::handlers::users::update_profile),
        )
        .route("/users/me/points", get(api::handlers::users::get_my_points))
        .route("/users/me/completions", get(api::handlers::lessons::list_my_completions))
        // Course catalogue and lesson content
        .route("/courses", get(api::handlers::courses::list_courses))
        .route("/courses/{course_id}", get(api::handlers::courses::get_course))
        .route("/courses/{course_id}/lessons", get(api::handlers::courses::list_course_lessons))
        .route("/lessons/{lesson_id}", get(api::handlers::lessons::get_lesson))
        .route("/lessons/{lesson_id}/completions", post(api::handlers::lessons::complete_lesson))
        // Community feed
        .route("/posts", get(api::handlers::posts::list_posts).post(api::handlers::posts::create_post))
        .route(
            "/posts/{post_id}",
            patch(api::handlers::posts::update_post).delete(api::handlers::posts::delete_post),
        )
        .route("/posts/{post_id}/flags", post(api::handlers::posts::flag_post))
        // Speaking-session calendar and bookings
        .route("/calendar/sessions", get(api::handlers::sessions::list_sessions))
        .route("/calendar/sessions/{session_id}", get(api::handlers::sessions::get_session))
        .route(
            "/calendar/sessions/{session_id}/bookings",
            post(api::handlers::bookings::create_booking),
        )
        .route("/bookings", get(api::handlers::bookings::list_bookings))
        .route("/bookings/{booking_id}", delete(api::handlers::bookings::cancel_booking))
        // Subscriptions and payments
        .route("/subscriptions/me", get(api::handlers::subscriptions::get_my_subscription))
        .route("/create_checkout", post(api::handlers::payments::create_checkout))
        .route("/process_payment/{session_id}", post(api::handlers::payments::process_payment))
        // Admin: user management
        .route("/admin/users", get(api::handlers::users::list_users))
        .route(
            "/admin/users/{user_id}",
            get(api::handlers::users::get_user).patch(api::handlers::users::update_user),
        )
        .route("/admin/users/{user_id}/points", post(api::handlers::users::grant_points))
        // Admin: content management
        .route("/admin/courses", post(api::handlers::courses::create_course))
        .route(
            "/admin/courses/{course_id}",
            patch(api::handlers::courses::update_course).delete(api::handlers::courses::delete_course),
        )
        .route("/admin/lessons", post(api::handlers::lessons::create_lesson))
        .route(
            "/admin/lessons/{lesson_id}",
            patch(api::handlers::lessons::update_lesson).delete(api::handlers::lessons::delete_lesson),
        )
        // Admin: calendar management
        .route("/admin/sessions", post(api::handlers::sessions::create_session))
        .route("/admin/sessions/{session_id}", patch(api::handlers::sessions::update_session))
        .route("/admin/sessions/{session_id}/cancel", post(api::handlers::sessions::cancel_session))
        // Admin: moderation queue
        .route("/admin/posts/flagged", get(api::handlers::posts::list_flagged_posts))
        .route("/admin/posts/{post_id}/hide", post(api::handlers::posts::hide_post))
        .route("/admin/posts/{post_id}/unhide", post(api::handlers::posts::unhide_post))
        // Admin: analytics
        .route("/admin/analytics/overview", get(api::handlers::analytics::get_overview))
        .with_state(state.clone());

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        // Webhook routes (external services, not part of client API docs)
        .route("/webhooks/stripe", post(api::handlers::payments::stripe::webhook))
        .with_state(state.clone())
        .merge(auth_routes)
        .nest("/api/v1", api_routes)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    let cors_layer = create_cors_layer(&state.config)?;
    let router = router.layer(cors_layer);

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Container for background services and their lifecycle management.
///
/// Currently one task: the maintenance sweeper, which expires stale
/// verification codes and password reset tokens and marks active
/// subscriptions whose billing period lapsed as past due.
///
/// # Graceful Shutdown
///
/// The struct provides a [`shutdown`](BackgroundServices::shutdown) method to
/// gracefully stop all background tasks. When dropped, the `drop_guard` will
/// automatically cancel the shutdown token, signaling all tasks to stop.
pub struct BackgroundServices {
    background_tasks: Vec<tokio::task::JoinHandle<()>>,
    shutdown_token: tokio_util::sync::CancellationToken,
    // Pub so that we can disarm it if we want to
    pub drop_guard: Option<tokio_util::sync::DropGuard>,
}

impl BackgroundServices {
    /// Gracefully shutdown all background tasks
    pub async fn shutdown(self) {
        self.shutdown_token.cancel();

        for handle in self.background_tasks {
            let _ = handle.await;
        }
    }
}

/// One sweep of the maintenance task. Failures are logged and retried on the
/// next tick rather than bubbling up.
async fn run_maintenance_sweep(pool: &PgPool) {
    let mut conn = match pool.acquire().await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::warn!("maintenance sweep skipped, could not acquire connection: {e}");
            return;
        }
    };

    match VerificationCodes::new(&mut conn).sweep_expired().await {
        Ok(swept) if swept > 0 => debug!("swept {swept} expired verification codes"),
        Ok(_) => {}
        Err(e) => tracing::warn!("failed to sweep verification codes: {e}"),
    }

    match PasswordResetTokens::new(&mut conn).sweep_expired().await {
        Ok(swept) if swept > 0 => debug!("swept {swept} expired password reset tokens"),
        Ok(_) => {}
        Err(e) => tracing::warn!("failed to sweep password reset tokens: {e}"),
    }

    match Subscriptions::new(&mut conn).sweep_lapsed().await {
        Ok(swept) if swept > 0 => info!("marked {swept} lapsed subscriptions as past due"),
        Ok(_) => {}
        Err(e) => tracing::warn!("failed to sweep lapsed subscriptions: {e}"),
    }
}

/// Setup background services (maintenance sweeper)
fn setup_background_services(pool: PgPool, config: Config, shutdown_token: tokio_util::sync::CancellationToken) -> BackgroundServices {
    let drop_guard = shutdown_token.clone().drop_guard();
    let mut background_tasks = Vec::new();

    if config.maintenance.enabled {
        let sweeper_shutdown = shutdown_token.clone();
        let interval = config.maintenance.interval;
        let handle = tokio::spawn(async move {
            info!("Starting maintenance sweeper (interval: {:?})", interval);
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => run_maintenance_sweep(&pool).await,
                    _ = sweeper_shutdown.cancelled() => {
                        info!("Maintenance sweeper shutting down");
                        break;
                    }
                }
            }
        });
        background_tasks.push(handle);
    } else {
        info!("Maintenance sweeper disabled by configuration");
    }

    BackgroundServices {
        background_tasks,
        shutdown_token,
        drop_guard: Some(drop_guard),
    }
}

/// Main application struct that owns all resources and lifecycle.
///
/// # Lifecycle
///
/// 1. **Create**: [`Application::new`] connects to the database, runs
///    migrations, ensures the initial admin user exists, and starts
///    background services
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and starts
///    handling requests
/// 3. **Shutdown**: When the shutdown signal is received, gracefully stops
///    all services
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
    bg_services: BackgroundServices,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting with configuration: {:#?}", config);

        let database_url = config
            .database_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("database_url is not configured"))?;
        let pool = PgPool::connect(database_url).await?;
        migrator().run(&pool).await?;

        create_initial_admin_user(&config.admin_email, config.admin_password.as_deref(), &pool)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create initial admin user: {}", e))?;

        Self::with_pool(pool, config)
    }

    /// Create an application on an existing pool (migrations must already be applied)
    pub fn with_pool(pool: PgPool, config: Config) -> anyhow::Result<Self> {
        let shutdown_token = tokio_util::sync::CancellationToken::new();
        let bg_services = setup_background_services(pool.clone(), config.clone(), shutdown_token);

        let app_state = AppState::builder().db(pool.clone()).config(config.clone()).build();
        let router = build_router(app_state)?;

        Ok(Self {
            router,
            config,
            pool,
            bg_services,
        })
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Thrive in Japan API listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        // Shutdown background services and wait for tasks to complete
        self.bg_services.shutdown().await;

        info!("Closing database connections...");
        self.pool.close().await;

        Ok(())
    }
}
