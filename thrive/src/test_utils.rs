//! Test utilities shared by the handler integration tests.

use crate::api::models::points::PointsReason;
use crate::api::models::subscriptions::SubscriptionStatus;
use crate::api::models::users::{CurrentUser, JlptLevel, Role, UserResponse};
use crate::auth::session::create_session_token;
use crate::config::{Config, EmailConfig, EmailTransportConfig};
use crate::db::handlers::{Bookings, Courses, Lessons, Points, Repository, SpeakingSessions, Subscriptions, Users};
use crate::db::models::{
    courses::{CourseCreateDBRequest, CourseDBResponse},
    lessons::{LessonCreateDBRequest, LessonDBResponse},
    points::PointsTransactionCreateDBRequest,
    sessions::{SpeakingSessionCreateDBRequest, SpeakingSessionDBResponse},
    subscriptions::SubscriptionCreateDBRequest,
    users::UserCreateDBRequest,
};
use crate::types::{BookingId, CourseId, SpeakingSessionId, UserId};
use crate::AppState;
use axum_test::TestServer;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Build a test server over the full router, plus the config it was built with
/// so tests can mint session cookies.
pub async fn create_test_app(pool: PgPool) -> (TestServer, Config) {
    let config = create_test_config();

    let state = AppState::builder().db(pool).config(config.clone()).build();
    let router = crate::build_router(state).expect("Failed to build router");

    (TestServer::new(router).expect("Failed to create test server"), config)
}

pub fn create_test_config() -> Config {
    // Write test emails to a temp directory instead of SMTP
    let email_dir = std::env::temp_dir().join(format!("thrive-test-emails-{}", std::process::id()));

    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        secret_key: Some("test-secret-key-for-testing-only".to_string()),
        payment: None,
        email: EmailConfig {
            transport: EmailTransportConfig::File {
                path: email_dir.to_string_lossy().into_owned(),
            },
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Create a user directly in the database with a unique username and email.
pub async fn create_test_user(pool: &PgPool, role: Role) -> UserResponse {
    let mut conn = pool.acquire().await.unwrap();
    let username = format!("testuser_{}", Uuid::new_v4().simple());

    let user = Users::new(&mut conn)
        .create(&UserCreateDBRequest {
            username: username.clone(),
            email: format!("{username}@example.com"),
            display_name: Some("Test User".to_string()),
            role,
            jlpt_goal: None,
            password_hash: None,
        })
        .await
        .unwrap();

    user.into()
}

/// Session cookie for a user, in the form handlers read from request headers.
pub fn session_cookie(user: &UserResponse, config: &Config) -> String {
    let token = create_session_token(&CurrentUser::from(user.clone()), config).unwrap();
    format!("{}={}", config.auth.native.session.cookie_name, token)
}

/// Record a consumed verification code so registration accepts the email.
pub async fn mark_email_verified(pool: &PgPool, email: &str) {
    sqlx::query(
        r#"
        INSERT INTO verification_codes (email, code_hash, expires_at, consumed_at)
        VALUES (lower($1), 'test-hash', NOW() + interval '15 minutes', NOW())
        "#,
    )
    .bind(email)
    .execute(pool)
    .await
    .unwrap();
}

pub async fn create_test_course(pool: &PgPool, title: &str, published: bool) -> CourseDBResponse {
    let mut conn = pool.acquire().await.unwrap();

    Courses::new(&mut conn)
        .create(&CourseCreateDBRequest {
            title: title.to_string(),
            description: "A test course".to_string(),
            jlpt_level: JlptLevel::N5,
            cover_image_url: None,
            is_published: published,
        })
        .await
        .unwrap()
}

pub async fn create_test_lesson(pool: &PgPool, course_id: CourseId, title: &str, published: bool) -> LessonDBResponse {
    let mut conn = pool.acquire().await.unwrap();

    Lessons::new(&mut conn)
        .create(&LessonCreateDBRequest {
            course_id,
            title: title.to_string(),
            content: "Lesson content".to_string(),
            video_url: None,
            position: None,
            points_reward: 25,
            is_published: published,
            keywords: vec![],
        })
        .await
        .unwrap()
}

/// A session starting tomorrow, so it is always bookable in tests.
pub async fn create_test_session(pool: &PgPool, host_id: UserId, capacity: i32, points_cost: i32) -> SpeakingSessionDBResponse {
    create_test_session_at(pool, host_id, Utc::now() + chrono::Duration::days(1), capacity, points_cost).await
}

pub async fn create_test_session_at(
    pool: &PgPool,
    host_id: UserId,
    starts_at: DateTime<Utc>,
    capacity: i32,
    points_cost: i32,
) -> SpeakingSessionDBResponse {
    let mut conn = pool.acquire().await.unwrap();

    SpeakingSessions::new(&mut conn)
        .create(&SpeakingSessionCreateDBRequest {
            title: "Conversation Practice".to_string(),
            description: Some("Casual speaking practice".to_string()),
            host_id,
            starts_at,
            duration_minutes: 30,
            capacity,
            points_cost,
            min_jlpt_level: None,
            meeting_url: Some("https://meet.example.com/room".to_string()),
        })
        .await
        .unwrap()
}

/// Give a user an active subscription without going through Stripe.
pub async fn activate_subscription(pool: &PgPool, user_id: UserId) {
    let mut conn = pool.acquire().await.unwrap();

    Subscriptions::new(&mut conn)
        .create(&SubscriptionCreateDBRequest {
            user_id,
            status: SubscriptionStatus::Active,
            checkout_session_id: None,
        })
        .await
        .unwrap();
}

pub async fn grant_points(pool: &PgPool, user_id: UserId, amount: i32) {
    let mut conn = pool.acquire().await.unwrap();

    Points::new(&mut conn)
        .apply(&PointsTransactionCreateDBRequest {
            user_id,
            amount,
            reason: PointsReason::AdminGrant,
            reference_id: None,
            note: None,
        })
        .await
        .unwrap();
}

pub async fn book_session(pool: &PgPool, session_id: SpeakingSessionId, user_id: UserId, points_spent: i32) -> BookingId {
    let mut conn = pool.acquire().await.unwrap();

    let booking = Bookings::new(&mut conn).create(session_id, user_id, points_spent).await.unwrap();
    booking.id
}
