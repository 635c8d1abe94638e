//! HTTP request handlers for all API endpoints.
//!
//! This module contains Axum route handlers organized by resource type.
//! Each handler is responsible for:
//! - Request validation and deserialization
//! - Authentication and authorization checks
//! - Business logic execution via database repositories
//! - Response serialization
//!
//! # Handler Modules
//!
//! - [`analytics`]: Admin dashboard metrics
//! - [`auth`]: Email verification, registration, login, and password management
//! - [`bookings`]: Speaking-session seat booking and cancellation
//! - [`config`]: Public app configuration retrieval
//! - [`courses`]: Course catalogue CRUD
//! - [`lessons`]: Lesson content, completions, and points awards
//! - [`payments`]: Stripe subscription checkout and webhooks
//! - [`posts`]: Community feed posting and moderation
//! - [`sessions`]: Speaking-session calendar management
//! - [`subscriptions`]: Subscription state and the content access gate
//! - [`users`]: Profile management and admin user administration
//!
//! # Authentication
//!
//! Most handlers require authentication via the session cookie. The
//! [`crate::auth::current_user`] module provides the extractor that handlers
//! use to access the current user.
//!
//! # Error Handling
//!
//! Handlers return [`crate::errors::Error`] which automatically converts to
//! appropriate HTTP status codes and JSON error responses.

pub mod analytics;
pub mod auth;
pub mod bookings;
pub mod config;
pub mod courses;
pub mod lessons;
pub mod payments;
pub mod posts;
pub mod sessions;
pub mod subscriptions;
pub mod users;
