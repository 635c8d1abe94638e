//! OpenAPI documentation configuration.
//!
//! One API surface: the versioned JSON API at `/api/v1/*` plus the public
//! `/auth/*` endpoints. The interactive reference is served at `/docs`.

use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};

use crate::api;

/// Registers the session cookie as the API's security scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "session_token".to_string(),
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                    "tij_session",
                    "JWT session cookie issued by /auth/login or /auth/register",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Thrive in Japan API",
        description = "Backend API for the Thrive in Japan learning platform: courses and lessons, \
                       community feed, speaking-session calendar, points economy and subscriptions."
    ),
    paths(
        api::handlers::auth::get_registration_info,
        api::handlers::auth::request_verification_code,
        api::handlers::auth::confirm_verification_code,
        api::handlers::auth::register,
        api::handlers::auth::get_login_info,
        api::handlers::auth::login,
        api::handlers::auth::logout,
        api::handlers::auth::request_password_reset,
        api::handlers::auth::confirm_password_reset,
        api::handlers::auth::change_password,
        api::handlers::config::get_config,
        api::handlers::users::get_profile,
        api::handlers::users::update_profile,
        api::handlers::users::get_my_points,
        api::handlers::users::list_users,
        api::handlers::users::get_user,
        api::handlers::users::update_user,
        api::handlers::users::grant_points,
        api::handlers::courses::list_courses,
        api::handlers::courses::get_course,
        api::handlers::courses::list_course_lessons,
        api::handlers::courses::create_course,
        api::handlers::courses::update_course,
        api::handlers::courses::delete_course,
        api::handlers::lessons::get_lesson,
        api::handlers::lessons::complete_lesson,
        api::handlers::lessons::list_my_completions,
        api::handlers::lessons::create_lesson,
        api::handlers::lessons::update_lesson,
        api::handlers::lessons::delete_lesson,
        api::handlers::posts::list_posts,
        api::handlers::posts::create_post,
        api::handlers::posts::update_post,
        api::handlers::posts::delete_post,
        api::handlers::posts::flag_post,
        api::handlers::posts::list_flagged_posts,
        api::handlers::posts::hide_post,
        api::handlers::posts::unhide_post,
        api::handlers::sessions::list_sessions,
        api::handlers::sessions::get_session,
        api::handlers::sessions::create_session,
        api::handlers::sessions::update_session,
        api::handlers::sessions::cancel_session,
        api::handlers::bookings::create_booking,
        api::handlers::bookings::list_bookings,
        api::handlers::bookings::cancel_booking,
        api::handlers::subscriptions::get_my_subscription,
        api::handlers::payments::create_checkout,
        api::handlers::payments::process_payment,
        api::handlers::analytics::get_overview,
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Registration, login and password management"),
        (name = "config", description = "Public app configuration"),
        (name = "users", description = "Profiles and points"),
        (name = "courses", description = "Course catalogue"),
        (name = "lessons", description = "Lesson content and completions"),
        (name = "posts", description = "Member feed and moderation"),
        (name = "calendar", description = "Speaking sessions and bookings"),
        (name = "subscriptions", description = "Subscription state"),
        (name = "payments", description = "Stripe checkout and payment processing"),
        (name = "admin", description = "Administration and analytics"),
    )
)]
pub struct ApiDoc;
