// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};

use crate::{
    auth::{password, token::AUTHENTICATION_TTL_HOURS, TokenScope},
    error::{ApiError, AppJson},
    models::{AuthenticationToken, AuthenticationTokenEnvelope, CreateAuthTokenRequest},
    state::AppState,
    storage::{StoreError, TokenRepository, UserRepository},
};

const INVALID_CREDENTIALS: &str = "invalid authentication credentials";

/// Exchange email and password for a bearer token valid for 24 hours.
///
/// Unknown email and wrong password produce the same 401.
#[utoipa::path(
    post,
    path = "/v1/tokens/authentication",
    request_body = CreateAuthTokenRequest,
    tag = "Tokens",
    responses(
        (status = 201, description = "Token issued", body = AuthenticationTokenEnvelope),
        (status = 401, description = "Invalid credentials"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn create_authentication_token(
    State(state): State<AppState>,
    AppJson(request): AppJson<CreateAuthTokenRequest>,
) -> Result<(StatusCode, Json<AuthenticationTokenEnvelope>), ApiError> {
    request.validate().map_err(ApiError::failed_validation)?;

    let email = request.email.clone();
    let user = match state
        .db
        .call(move |db| UserRepository::new(db).get_by_email(&email))
        .await
    {
        Ok(user) => user,
        Err(StoreError::NotFound(_)) => return Err(ApiError::unauthorized(INVALID_CREDENTIALS)),
        Err(e) => return Err(e.into()),
    };

    let hash = user.password_hash.clone();
    let plaintext = request.password;
    let matches = tokio::task::spawn_blocking(move || password::matches(&plaintext, &hash))
        .await
        .map_err(ApiError::internal)?
        .map_err(ApiError::internal)?;
    if !matches {
        tracing::debug!(user_id = user.id, "password mismatch");
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    }

    let user_id = user.id;
    let token = state
        .db
        .call(move |db| {
            TokenRepository::new(db).new_token(
                user_id,
                chrono::Duration::hours(AUTHENTICATION_TTL_HOURS),
                TokenScope::Authentication,
            )
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(AuthenticationTokenEnvelope {
            authentication_token: AuthenticationToken {
                token: token.plaintext,
                expiry: token.expiry,
            },
        }),
    ))
}
