//! Database repositories.
//!
//! Each repository wraps a `&mut PgConnection`, so callers choose whether to
//! run it against a pooled connection or inside a transaction. Multi-step
//! flows (booking a seat, refunding a canceled session) compose repositories
//! inside one transaction at the call site.

pub mod analytics;
pub mod bookings;
pub mod courses;
pub mod lessons;
pub mod password_reset_tokens;
pub mod points;
pub mod posts;
pub mod repository;
pub mod sessions;
pub mod subscriptions;
pub mod users;
pub mod verification_codes;

pub use analytics::Analytics;
pub use bookings::{BookingFilter, Bookings};
pub use courses::{CourseFilter, Courses};
pub use lessons::{LessonFilter, Lessons};
pub use password_reset_tokens::PasswordResetTokens;
pub use points::Points;
pub use posts::{PostFilter, Posts};
pub use repository::Repository;
pub use sessions::{SessionFilter, SpeakingSessions};
pub use subscriptions::Subscriptions;
pub use users::{UserFilter, Users};
pub use verification_codes::VerificationCodes;
