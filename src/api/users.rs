// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use super::read_id;
use crate::{
    auth::{
        password,
        token::{validate_plaintext, TokenError, ACTIVATION_TTL_DAYS},
        CurrentUser, Role, TokenScope,
    },
    error::{ApiError, AppJson},
    mailer::USER_WELCOME_TEMPLATE,
    models::{
        ActivateUserRequest, EditUserRequest, MessageResponse, RegisterUserRequest, UserEnvelope,
        UserListEnvelope, UserResponse,
    },
    state::AppState,
    storage::{permissions::MODULES_READ, NewUser, StoreError, TokenRepository, UserRepository},
};

/// Register an account. The account starts unactivated; an activation token
/// is mailed in the background.
#[utoipa::path(
    post,
    path = "/v1/user-infos",
    request_body = RegisterUserRequest,
    tag = "Users",
    responses(
        (status = 202, description = "Account created, activation email queued", body = UserEnvelope),
        (status = 400, description = "Malformed JSON body"),
        (status = 422, description = "Validation failed or email already registered")
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    AppJson(request): AppJson<RegisterUserRequest>,
) -> Result<(StatusCode, Json<UserEnvelope>), ApiError> {
    request.validate().map_err(ApiError::failed_validation)?;

    let plaintext = request.password.clone();
    let password_hash = tokio::task::spawn_blocking(move || password::hash(&plaintext))
        .await
        .map_err(ApiError::internal)?
        .map_err(ApiError::internal)?;

    let new = NewUser {
        name: request.name,
        surname: request.surname,
        email: request.email,
        password_hash,
        role: Role::User,
        activated: false,
    };

    let (user, token) = state
        .db
        .call(move |db| {
            UserRepository::new(db).register(
                new,
                &[MODULES_READ],
                chrono::Duration::days(ACTIVATION_TTL_DAYS),
            )
        })
        .await?;

    tracing::info!(user_id = user.id, "user registered");
    state.tasks.send_email(
        user.email.clone(),
        USER_WELCOME_TEMPLATE,
        serde_json::json!({
            "activationToken": token.plaintext,
            "userInfoID": user.id,
        }),
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(UserEnvelope {
            user_info: user.into(),
        }),
    ))
}

/// Activate an account with the token from the welcome email. Every
/// activation token of the user is consumed.
#[utoipa::path(
    post,
    path = "/v1/user-infos/activated",
    request_body = ActivateUserRequest,
    tag = "Users",
    responses(
        (status = 200, description = "Account activated", body = UserEnvelope),
        (status = 409, description = "Concurrent modification"),
        (status = 422, description = "Invalid or expired activation token")
    )
)]
pub async fn activate_user(
    State(state): State<AppState>,
    AppJson(request): AppJson<ActivateUserRequest>,
) -> Result<Json<UserEnvelope>, ApiError> {
    match validate_plaintext(&request.token) {
        Ok(()) => {}
        Err(TokenError::Length) if request.token.is_empty() => {
            return Err(ApiError::invalid_field("token", "must be provided"))
        }
        Err(TokenError::Length) => {
            return Err(ApiError::invalid_field("token", "must be 26 bytes long"))
        }
        Err(_) => {
            return Err(ApiError::invalid_field(
                "token",
                "invalid or expired activation token",
            ))
        }
    }

    let token = request.token;
    let lookup = state
        .db
        .call(move |db| TokenRepository::new(db).get_user_for_token(TokenScope::Activation, &token))
        .await;

    let user = match lookup {
        Ok(user) => user,
        Err(StoreError::NotFound(_)) => {
            return Err(ApiError::invalid_field(
                "token",
                "invalid or expired activation token",
            ))
        }
        Err(e) => return Err(e.into()),
    };

    let activated = state
        .db
        .call(move |db| UserRepository::new(db).activate(&user, user.version))
        .await?;

    tracing::info!(user_id = activated.id, "user activated");
    Ok(Json(UserEnvelope {
        user_info: activated.into(),
    }))
}

/// Show a user. Callers may only view their own record.
#[utoipa::path(
    get,
    path = "/v1/user-infos/{id}",
    params(("id" = u64, Path, description = "User id")),
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, body = UserEnvelope),
        (status = 403, description = "Not activated, or not the caller's own record"),
        (status = 404, description = "No such user")
    )
)]
pub async fn get_user(
    Path(id): Path<String>,
    CurrentUser(current): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<UserEnvelope>, ApiError> {
    let id = read_id(&id)?;
    if current.id != id {
        return Err(ApiError::forbidden(
            "you can only access your own user info",
        ));
    }

    let user = state.db.call(move |db| UserRepository::new(db).get(id)).await?;
    Ok(Json(UserEnvelope {
        user_info: user.into(),
    }))
}

#[utoipa::path(
    get,
    path = "/v1/user-infos",
    tag = "Users",
    security(("bearer" = [])),
    responses((status = 200, body = UserListEnvelope))
)]
pub async fn list_users(State(state): State<AppState>) -> Result<Json<UserListEnvelope>, ApiError> {
    let users = state.db.call(|db| UserRepository::new(db).list()).await?;
    Ok(Json(UserListEnvelope {
        user_infos: users.into_iter().map(UserResponse::from).collect(),
    }))
}

/// Replace a user's name, surname and email.
#[utoipa::path(
    put,
    path = "/v1/user-infos/{id}",
    params(("id" = u64, Path, description = "User id")),
    request_body = EditUserRequest,
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, body = UserEnvelope),
        (status = 404, description = "No such user"),
        (status = 409, description = "Concurrent modification"),
        (status = 422, description = "Validation failed or email already registered")
    )
)]
pub async fn edit_user(
    Path(id): Path<String>,
    State(state): State<AppState>,
    AppJson(request): AppJson<EditUserRequest>,
) -> Result<Json<UserEnvelope>, ApiError> {
    let id = read_id(&id)?;
    let mut user = state.db.call(move |db| UserRepository::new(db).get(id)).await?;

    request.validate().map_err(ApiError::failed_validation)?;
    user.name = request.name;
    user.surname = request.surname;
    user.email = request.email;

    let updated = state
        .db
        .call(move |db| UserRepository::new(db).update(&user, user.version))
        .await?;

    Ok(Json(UserEnvelope {
        user_info: updated.into(),
    }))
}

/// Delete a user together with its tokens and permissions.
#[utoipa::path(
    delete,
    path = "/v1/user-infos/{id}",
    params(("id" = u64, Path, description = "User id")),
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, body = MessageResponse),
        (status = 404, description = "No such user")
    )
)]
pub async fn delete_user(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = read_id(&id)?;
    state.db.call(move |db| UserRepository::new(db).delete(id)).await?;

    tracing::info!(user_id = id, "user deleted");
    Ok(Json(MessageResponse {
        message: "user info successfully deleted".to_string(),
    }))
}
