// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP surface.
//!
//! Layering, outermost first: panic recovery, CORS, request id and tracing,
//! rate limiting, `authenticate`, then the per-group route guard.

use std::any::Any;

use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, HeaderValue, Request, StatusCode},
    middleware::{from_fn, from_fn_with_state},
    response::Response,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::Span;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{
        authenticate, require_activated, require_permission, require_role, PermissionGate, Role,
        TokenScope,
    },
    error::ApiError,
    models::{
        ActivateUserRequest, AuthenticationToken, AuthenticationTokenEnvelope,
        CreateAuthTokenRequest, CreateDepartmentRequest, DepartmentEnvelope, EditUserRequest,
        HealthResponse, MessageResponse, ModuleEnvelope, ModuleInfoRequest, ModuleListEnvelope,
        RegisterUserRequest, SystemInfo, UserEnvelope, UserListEnvelope, UserResponse,
    },
    ratelimit::rate_limit,
    state::AppState,
    storage::{permissions::MODULES_READ, DepartmentInfo, ModuleInfo},
};

pub mod departments;
pub mod health;
pub mod modules;
pub mod tokens;
pub mod users;

const INTERNAL_PANIC_BODY: &str =
    r#"{"error":"the server encountered a problem and could not process your request"}"#;

pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/v1/healthcheck", get(health::healthcheck))
        .route("/v1/user-infos", post(users::register_user))
        .route("/v1/user-infos/activated", post(users::activate_user))
        .route(
            "/v1/tokens/authentication",
            post(tokens::create_authentication_token),
        );

    let activated = Router::new()
        .route("/v1/user-infos", get(users::list_users))
        .route("/v1/user-infos/{id}", get(users::get_user))
        .route("/v1/department-infos/{id}", get(departments::get_department))
        .route_layer(from_fn(require_activated));

    let admin = Router::new()
        .route(
            "/v1/user-infos/{id}",
            axum::routing::put(users::edit_user).delete(users::delete_user),
        )
        .route("/v1/module-infos", post(modules::create_module))
        .route(
            "/v1/module-infos/{id}",
            axum::routing::put(modules::edit_module).delete(modules::delete_module),
        )
        .route("/v1/department-infos", post(departments::create_department))
        .route_layer(from_fn_with_state(Role::Admin, require_role));

    let module_readers = Router::new()
        .route("/v1/module-infos", get(modules::list_modules))
        .route("/v1/module-infos/{id}", get(modules::get_module))
        .route_layer(from_fn_with_state(
            PermissionGate::new(state.db.clone(), MODULES_READ),
            require_permission,
        ));

    let api = Router::new()
        .merge(public)
        .merge(activated)
        .merge(admin)
        .merge(module_readers)
        .layer(from_fn_with_state(state.db.clone(), authenticate))
        .layer(from_fn_with_state(state.limiter.clone(), rate_limit))
        .with_state(state);

    Router::new()
        .merge(api)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TraceLayer::new_for_http().make_span_with(make_span)),
        )
        .layer(CorsLayer::permissive())
        .layer(CatchPanicLayer::custom(handle_panic))
}

async fn not_found() -> ApiError {
    ApiError::not_found("the requested resource could not be found")
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    tracing::debug_span!(
        "http-request",
        method = %request.method(),
        path = request.uri().path(),
        request_id
    )
}

/// Turn a handler panic into a JSON 500 and close the connection.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    tracing::error!(panic = %detail, "handler panicked");

    let mut response = Response::new(Body::from(INTERNAL_PANIC_BODY));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
        .headers_mut()
        .insert("connection", HeaderValue::from_static("close"));
    response
}

/// Parse a path id. Anything that is not a positive integer is a 404.
pub(crate) fn read_id(raw: &str) -> Result<u64, ApiError> {
    match raw.parse::<u64>() {
        Ok(id) if id >= 1 => Ok(id),
        _ => Err(ApiError::not_found(
            "the requested resource could not be found",
        )),
    }
}

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::healthcheck,
        users::register_user,
        users::activate_user,
        users::get_user,
        users::list_users,
        users::edit_user,
        users::delete_user,
        tokens::create_authentication_token,
        modules::create_module,
        modules::get_module,
        modules::list_modules,
        modules::edit_module,
        modules::delete_module,
        departments::create_department,
        departments::get_department
    ),
    components(
        schemas(
            HealthResponse,
            SystemInfo,
            UserResponse,
            UserEnvelope,
            UserListEnvelope,
            RegisterUserRequest,
            ActivateUserRequest,
            EditUserRequest,
            MessageResponse,
            CreateAuthTokenRequest,
            AuthenticationToken,
            AuthenticationTokenEnvelope,
            ModuleInfo,
            ModuleInfoRequest,
            ModuleEnvelope,
            ModuleListEnvelope,
            DepartmentInfo,
            CreateDepartmentRequest,
            DepartmentEnvelope,
            Role,
            TokenScope
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Health", description = "Service liveness"),
        (name = "Users", description = "Registration, activation and user management"),
        (name = "Tokens", description = "Bearer token issuance"),
        (name = "Modules", description = "Course module records"),
        (name = "Departments", description = "Department records")
    )
)]
struct ApiDoc;
