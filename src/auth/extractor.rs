// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractor for the authenticated user.
//!
//! ```rust,ignore
//! async fn show_user(CurrentUser(user): CurrentUser) -> impl IntoResponse {
//!     // user is crate::storage::User
//! }
//! ```

use axum::{extract::FromRequestParts, http::request::Parts};

use super::{AuthError, Identity};
use crate::storage::User;

/// The user resolved by the `authenticate` middleware.
///
/// Rejects anonymous requests with `AuthenticationRequired`. A request with no
/// identity at all means `authenticate` was not mounted in front of the
/// handler, which is reported as an internal error.
pub struct CurrentUser(pub User);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<Identity>() {
            Some(Identity::Authenticated(user)) => Ok(CurrentUser(user.clone())),
            Some(Identity::Anonymous) => Err(AuthError::AuthenticationRequired),
            None => Err(AuthError::MissingIdentity),
        }
    }
}
