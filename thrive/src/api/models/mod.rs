//! API request and response data models.
//!
//! These structures define the public API contract. They are distinct from
//! the database models in [`crate::db::models`], allowing the storage and API
//! representations to evolve independently. All models are annotated with
//! `utoipa` for the generated OpenAPI document.

pub mod analytics;
pub mod auth;
pub mod bookings;
pub mod courses;
pub mod lessons;
pub mod pagination;
pub mod points;
pub mod posts;
pub mod sessions;
pub mod subscriptions;
pub mod users;
