//! Database record models matching table schemas.
//!
//! Each struct here corresponds to a table row (deriving `sqlx::FromRow` for
//! query results) or to the data needed to insert/update one. They are kept
//! separate from the API models so storage and API representations can evolve
//! independently.

pub mod bookings;
pub mod courses;
pub mod lessons;
pub mod password_reset_tokens;
pub mod points;
pub mod posts;
pub mod sessions;
pub mod subscriptions;
pub mod users;
pub mod verification_codes;
