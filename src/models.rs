// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies for the REST API. All types derive `ToSchema`
//! for the OpenAPI document. Responses are wrapped in a single-key envelope
//! (`{"user_info": ...}`, `{"module_infos": [...]}`) by the handlers.
//!
//! ## Validation
//!
//! Request types expose `validate()`, returning every failing field at once
//! as a [`FieldErrors`] map. Handlers turn a non-empty map into a 422.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::Role;
use crate::error::FieldErrors;
use crate::storage::{DepartmentInfo, ModuleInfo, User};

static EMAIL_RX: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
});

const MAX_TEXT_BYTES: usize = 500;
const MIN_PASSWORD_BYTES: usize = 8;
// bcrypt ignores everything past 72 bytes
const MAX_PASSWORD_BYTES: usize = 72;

/// Collects field errors, keeping the first message per field.
#[derive(Debug, Default)]
struct Validator {
    errors: FieldErrors,
}

impl Validator {
    fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.errors
                .entry(field.to_string())
                .or_insert_with(|| message.to_string());
        }
    }

    fn text(&mut self, value: &str, field: &str) {
        self.check(!value.trim().is_empty(), field, "must be provided");
        self.check(
            value.len() <= MAX_TEXT_BYTES,
            field,
            "must not be more than 500 bytes long",
        );
    }

    fn email(&mut self, value: &str) {
        self.check(!value.is_empty(), "email", "must be provided");
        let valid = match EMAIL_RX.as_ref() {
            Ok(rx) => rx.is_match(value),
            Err(_) => false,
        };
        self.check(valid, "email", "must be a valid email address");
    }

    fn finish(self) -> Result<(), FieldErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

// =============================================================================
// User Models
// =============================================================================

/// Public view of a user. Never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub name: String,
    pub surname: String,
    pub email: String,
    pub role: Role,
    pub activated: bool,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            created_at: user.created_at,
            updated_at: user.updated_at,
            name: user.name,
            surname: user.surname,
            email: user.email,
            role: user.role,
            activated: user.activated,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserEnvelope {
    pub user_info: UserResponse,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserListEnvelope {
    pub user_infos: Vec<UserResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterUserRequest {
    pub name: String,
    pub surname: String,
    pub email: String,
    pub password: String,
}

impl RegisterUserRequest {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut v = Validator::default();
        v.text(&self.name, "name");
        v.text(&self.surname, "surname");
        v.email(&self.email);
        v.check(!self.password.is_empty(), "password", "must be provided");
        v.check(
            self.password.len() >= MIN_PASSWORD_BYTES,
            "password",
            "must be at least 8 bytes long",
        );
        v.check(
            self.password.len() <= MAX_PASSWORD_BYTES,
            "password",
            "must not be more than 72 bytes long",
        );
        v.finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ActivateUserRequest {
    /// Plaintext activation token from the welcome email.
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EditUserRequest {
    pub name: String,
    pub surname: String,
    pub email: String,
}

impl EditUserRequest {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut v = Validator::default();
        v.text(&self.name, "name");
        v.text(&self.surname, "surname");
        v.email(&self.email);
        v.finish()
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

// =============================================================================
// Token Models
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateAuthTokenRequest {
    pub email: String,
    pub password: String,
}

impl CreateAuthTokenRequest {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut v = Validator::default();
        v.email(&self.email);
        v.check(!self.password.is_empty(), "password", "must be provided");
        v.finish()
    }
}

/// A freshly issued bearer token. The plaintext is only ever returned here.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthenticationToken {
    pub token: String,
    pub expiry: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthenticationTokenEnvelope {
    pub authentication_token: AuthenticationToken,
}

// =============================================================================
// Module Models
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModuleInfoRequest {
    pub module_name: String,
    /// Duration in nanoseconds.
    pub module_duration: i64,
    pub exam_type: String,
}

impl ModuleInfoRequest {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut v = Validator::default();
        v.text(&self.module_name, "moduleName");
        v.check(
            self.module_duration > 0,
            "moduleDuration",
            "must be a positive integer",
        );
        v.text(&self.exam_type, "examType");
        v.finish()
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ModuleEnvelope {
    pub module_info: ModuleInfo,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ModuleListEnvelope {
    pub module_infos: Vec<ModuleInfo>,
}

// =============================================================================
// Department Models
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateDepartmentRequest {
    pub department_name: String,
    pub staff_quantity: u32,
    pub department_director: String,
    pub module_id: u64,
}

impl CreateDepartmentRequest {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut v = Validator::default();
        v.text(&self.department_name, "departmentName");
        v.text(&self.department_director, "departmentDirector");
        v.finish()
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DepartmentEnvelope {
    pub department_info: DepartmentInfo,
}

// =============================================================================
// Health
// =============================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SystemInfo {
    pub environment: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Always `available` when the process is serving.
    pub status: String,
    pub system_info: SystemInfo,
}
