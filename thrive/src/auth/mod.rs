//! Authentication and authorization.
//!
//! Authentication is native email/password only. A successful login issues a
//! signed JWT carried in an HTTP-only session cookie (or, for programmatic
//! clients, as a bearer token). Passwords, reset tokens and email verification
//! codes are all stored as Argon2id hashes.
//!
//! Authorization is role-based with three platform roles: `member`,
//! `instructor`, and `admin`. Handlers extract the authenticated user with the
//! [`CurrentUser`](crate::api::models::users::CurrentUser) extractor and gate
//! admin surfaces with [`require_admin`] / [`require_staff`].

use crate::{
    api::models::users::{CurrentUser, Role},
    errors::{Error, Result},
    types::Operation,
};

pub mod current_user;
pub mod password;
pub mod session;

/// Require the user to be an admin, returning 403 otherwise.
pub fn require_admin(user: CurrentUser) -> Result<CurrentUser> {
    if user.role == Role::Admin {
        Ok(user)
    } else {
        Err(Error::InsufficientPermissions {
            action: Operation::Read,
            resource: "admin resources".to_string(),
        })
    }
}

/// Require the user to be an admin or instructor, returning 403 otherwise.
pub fn require_staff(user: CurrentUser) -> Result<CurrentUser> {
    match user.role {
        Role::Admin | Role::Instructor => Ok(user),
        Role::Member => Err(Error::InsufficientPermissions {
            action: Operation::Read,
            resource: "staff resources".to_string(),
        }),
    }
}
