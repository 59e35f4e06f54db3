// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};

use crate::models::{HealthResponse, SystemInfo};
use crate::state::AppState;

/// Liveness check. Does not touch storage.
#[utoipa::path(
    get,
    path = "/v1/healthcheck",
    tag = "Health",
    responses(
        (status = 200, description = "Service is available", body = HealthResponse)
    )
)]
pub async fn healthcheck(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "available".to_string(),
        system_info: SystemInfo {
            environment: state.config.env.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    })
}
