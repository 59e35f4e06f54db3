// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication and authorization errors.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Failure raised by the authentication middleware or one of the guards.
///
/// Token failures are deliberately collapsed into `InvalidAuthToken`: the
/// client never learns whether a token was unknown, expired or of the wrong
/// scope.
#[derive(Debug)]
pub enum AuthError {
    /// Malformed `Authorization` header, malformed token, or no matching token
    InvalidAuthToken,
    /// Route requires an identity but the request is anonymous
    AuthenticationRequired,
    /// Authenticated user has not activated the account yet
    AccountNotActivated,
    /// Authenticated user lacks the role or permission for the route
    InsufficientPermissions,
    /// A guard ran without the authenticate middleware in front of it
    MissingIdentity,
    /// Storage failure or timeout while resolving the identity
    Internal(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::InvalidAuthToken => "invalid_auth_token",
            AuthError::AuthenticationRequired => "authentication_required",
            AuthError::AccountNotActivated => "account_not_activated",
            AuthError::InsufficientPermissions => "insufficient_permissions",
            AuthError::MissingIdentity | AuthError::Internal(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidAuthToken | AuthError::AuthenticationRequired => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::AccountNotActivated | AuthError::InsufficientPermissions => {
                StatusCode::FORBIDDEN
            }
            AuthError::MissingIdentity | AuthError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::InvalidAuthToken => write!(f, "invalid or missing authentication token"),
            AuthError::AuthenticationRequired => {
                write!(f, "you must be authenticated to access this resource")
            }
            AuthError::AccountNotActivated => {
                write!(f, "your user account must be activated to access this resource")
            }
            AuthError::InsufficientPermissions => write!(
                f,
                "your user account doesn't have the necessary permissions to access this resource"
            ),
            AuthError::MissingIdentity | AuthError::Internal(_) => write!(
                f,
                "the server encountered a problem and could not process your request"
            ),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match &self {
            AuthError::MissingIdentity => {
                tracing::error!("identity missing from request; authenticate middleware not mounted")
            }
            AuthError::Internal(detail) => {
                tracing::error!(error = %detail, "authentication failed on storage")
            }
            _ => {}
        }

        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        let mut response = (status, body).into_response();

        if matches!(self, AuthError::InvalidAuthToken) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
