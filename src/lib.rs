// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Campus API - Module & Department Registry Service
//!
//! JSON REST backend for user accounts, course modules and departments.
//! Requests carry opaque bearer tokens; access is decided by activation
//! state, role and per-user permission codes.
//!
//! ## Modules
//!
//! - `api` - HTTP handlers, router and OpenAPI document (Axum)
//! - `auth` - Tokens, password hashing and the authorization middleware chain
//! - `storage` - Embedded redb repositories
//! - `sweeper` - Periodic re-issue of stale activation tokens
//! - `ratelimit` - Per-client token bucket limiter

pub mod api;
pub mod auth;
pub mod background;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod logging;
pub mod mailer;
pub mod models;
pub mod ratelimit;
pub mod state;
pub mod storage;
pub mod sweeper;
