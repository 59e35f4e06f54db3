// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Opaque bearer tokens and the request guards built on them.
//!
//! ## Auth Flow
//!
//! 1. Client obtains a token from `POST /v1/tokens/authentication`
//! 2. Client sends `Authorization: Bearer <26-char base32 token>`
//! 3. Server:
//!    - Validates the token shape (length and alphabet)
//!    - Hashes it with SHA-256 and looks up an unexpired `authentication` row
//!    - Attaches `Identity::Authenticated(user)` to the request, or
//!      `Identity::Anonymous` when no header was sent
//! 4. Route guards check the identity: authenticated, activated, role,
//!    permission
//!
//! ## Security
//!
//! - Token plaintexts are never persisted, only their SHA-256 hash
//! - Unknown, expired and wrong-scope tokens are indistinguishable to clients
//! - Storage failures during authentication are 500s, never 401s

pub mod error;
pub mod extractor;
pub mod identity;
pub mod middleware;
pub mod password;
pub mod roles;
pub mod token;

pub use error::AuthError;
pub use extractor::CurrentUser;
pub use identity::Identity;
pub use middleware::{
    authenticate, require_activated, require_authenticated, require_permission, require_role,
    PermissionGate,
};
pub use roles::Role;
pub use token::{Token, TokenScope};
