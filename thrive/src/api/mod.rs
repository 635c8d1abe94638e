//! API layer for HTTP request handling and data models.
//!
//! This module contains the REST API implementation, organized into:
//!
//! - **[`handlers`]**: Axum route handlers for all API endpoints
//! - **[`models`]**: Request/response data structures for API communication
//!
//! # API Structure
//!
//! The API is divided into several functional areas:
//!
//! - **Authentication** (`/auth/*`): Verification codes, registration, login, password resets
//! - **Courses & Lessons** (`/api/v1/courses/*`, `/api/v1/lessons/*`): Learning content
//! - **Community** (`/api/v1/posts/*`): Member feed and moderation
//! - **Calendar** (`/api/v1/calendar/*`, `/api/v1/bookings/*`): Speaking sessions and bookings
//! - **Subscriptions & Payments** (`/api/v1/subscriptions/*`, `/api/v1/create_checkout`): Stripe billing
//! - **Admin** (`/api/v1/admin/*`): User administration, moderation queue, analytics
//!
//! # OpenAPI Documentation
//!
//! All endpoints are documented with OpenAPI annotations using `utoipa`.
//! API documentation is available at `/docs` when the server is running.

pub mod handlers;
pub mod models;
