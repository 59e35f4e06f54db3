// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication middleware and route guards.
//!
//! `authenticate` runs on every request and attaches an [`Identity`]. The
//! guards are mounted per route group with `route_layer` and only read that
//! identity:
//!
//! ```rust,ignore
//! let admin = Router::new()
//!     .route("/v1/module-infos", post(create_module))
//!     .route_layer(from_fn_with_state(Role::Admin, require_role));
//!
//! let app = admin.layer(from_fn_with_state(db, authenticate));
//! ```

use axum::{
    extract::{Request, State},
    http::{
        header::{AUTHORIZATION, VARY},
        HeaderMap, HeaderValue,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::token::validate_plaintext;
use super::{AuthError, Identity, Role, TokenScope};
use crate::storage::{Database, PermissionRepository, StoreError, TokenRepository, User};

/// Resolve the bearer token (if any) and attach the caller's [`Identity`].
pub async fn authenticate(
    State(db): State<Database>,
    mut request: Request,
    next: Next,
) -> Response {
    let resolved = resolve_identity(&db, request.headers()).await;
    let mut response = match resolved {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    };

    response
        .headers_mut()
        .append(VARY, HeaderValue::from_static("Authorization"));
    response
}

async fn resolve_identity(db: &Database, headers: &HeaderMap) -> Result<Identity, AuthError> {
    let Some(header) = headers.get(AUTHORIZATION) else {
        return Ok(Identity::Anonymous);
    };

    let token = bearer_token(header)?.to_string();
    validate_plaintext(&token).map_err(|_| AuthError::InvalidAuthToken)?;

    let lookup = db
        .call(move |db| {
            TokenRepository::new(db).get_user_for_token(TokenScope::Authentication, &token)
        })
        .await;

    match lookup {
        Ok(user) => Ok(Identity::Authenticated(user)),
        Err(StoreError::NotFound(_)) => Err(AuthError::InvalidAuthToken),
        Err(e) => Err(AuthError::Internal(e.to_string())),
    }
}

/// The header must be exactly `Bearer <token>`.
fn bearer_token(header: &HeaderValue) -> Result<&str, AuthError> {
    let value = header.to_str().map_err(|_| AuthError::InvalidAuthToken)?;
    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Ok(token),
        _ => Err(AuthError::InvalidAuthToken),
    }
}

fn authenticated_user(request: &Request) -> Result<&User, AuthError> {
    match request.extensions().get::<Identity>() {
        None => Err(AuthError::MissingIdentity),
        Some(Identity::Anonymous) => Err(AuthError::AuthenticationRequired),
        Some(Identity::Authenticated(user)) => Ok(user),
    }
}

fn activated_user(request: &Request) -> Result<&User, AuthError> {
    let user = authenticated_user(request)?;
    if !user.activated {
        return Err(AuthError::AccountNotActivated);
    }
    Ok(user)
}

/// Reject anonymous requests.
pub async fn require_authenticated(request: Request, next: Next) -> Result<Response, AuthError> {
    authenticated_user(&request)?;
    Ok(next.run(request).await)
}

/// Reject anonymous requests (401) and unactivated accounts (403).
pub async fn require_activated(request: Request, next: Next) -> Result<Response, AuthError> {
    activated_user(&request)?;
    Ok(next.run(request).await)
}

/// Reject callers whose role is not exactly the one in state.
///
/// Does not require activation.
pub async fn require_role(
    State(role): State<Role>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = authenticated_user(&request)?;
    if user.role != role {
        return Err(AuthError::InsufficientPermissions);
    }
    Ok(next.run(request).await)
}

/// State for [`require_permission`]: the permission code a route needs and
/// the database to load grants from.
#[derive(Clone)]
pub struct PermissionGate {
    db: Database,
    code: &'static str,
}

impl PermissionGate {
    pub fn new(db: Database, code: &'static str) -> Self {
        Self { db, code }
    }
}

/// Reject callers that are not activated or lack the gate's permission code.
pub async fn require_permission(
    State(gate): State<PermissionGate>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user_id = activated_user(&request)?.id;

    let permissions = gate
        .db
        .call(move |db| PermissionRepository::new(db).get_all_for_user(user_id))
        .await
        .map_err(|e| AuthError::Internal(e.to_string()))?;

    if !permissions.includes(gate.code) {
        tracing::debug!(user_id, code = gate.code, "permission denied");
        return Err(AuthError::InsufficientPermissions);
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::permissions::MODULES_READ;
    use crate::storage::test_support::temp_db;
    use crate::storage::users::tests::new_user;
    use crate::storage::UserRepository;
    use axum::{
        body::{to_bytes, Body},
        http::StatusCode,
        middleware::{from_fn, from_fn_with_state},
        routing::get,
        Router,
    };
    use chrono::Duration;
    use tower::ServiceExt;

    async fn ok() -> &'static str {
        "ok"
    }

    fn request(token: Option<&str>) -> axum::http::Request<Body> {
        let mut builder = axum::http::Request::builder().uri("/");
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    /// Insert a user and return an authentication token for it.
    fn login(db: &Database, email: &str, role: Role, activated: bool) -> (User, String) {
        let mut new = new_user(email);
        new.role = role;
        new.activated = activated;
        let user = UserRepository::new(db).insert(new).unwrap();
        let token = TokenRepository::new(db)
            .new_token(user.id, Duration::hours(1), TokenScope::Authentication)
            .unwrap();
        (user, token.plaintext)
    }

    fn activated_app(db: &Database) -> Router {
        Router::new()
            .route("/", get(ok))
            .route_layer(from_fn(require_activated))
            .layer(from_fn_with_state(db.clone(), authenticate))
    }

    fn admin_app(db: &Database) -> Router {
        Router::new()
            .route("/", get(ok))
            .route_layer(from_fn_with_state(Role::Admin, require_role))
            .layer(from_fn_with_state(db.clone(), authenticate))
    }

    #[tokio::test]
    async fn anonymous_passes_authenticate_but_not_guards() {
        let (db, _dir) = temp_db();

        let open = Router::new()
            .route("/", get(ok))
            .layer(from_fn_with_state(db.clone(), authenticate));
        let response = open.oneshot(request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(VARY).unwrap(), "Authorization");

        let response = activated_app(&db).oneshot(request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_token_is_401_with_challenge() {
        let (db, _dir) = temp_db();

        let response = activated_app(&db)
            .oneshot(request(Some("ABCDEFGHIJKLMNOPQRSTUVWXYZ")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get("www-authenticate").unwrap(),
            "Bearer"
        );
        assert_eq!(response.headers().get(VARY).unwrap(), "Authorization");

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(body["error"], "invalid or missing authentication token");
    }

    #[tokio::test]
    async fn storage_timeout_is_500_not_401() {
        let (db, _dir) = temp_db();
        let (_, token) = login(&db, "ada@example.com", Role::User, true);
        let slow = db
            .with_deadline(std::time::Duration::from_millis(10))
            .with_stall(std::time::Duration::from_millis(200));

        let response = activated_app(&slow)
            .oneshot(request(Some(&token)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get("www-authenticate").is_none());

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(body["error_code"], "internal_error");
    }

    #[tokio::test]
    async fn malformed_header_is_401() {
        let (db, _dir) = temp_db();
        let (_, token) = login(&db, "ada@example.com", Role::User, true);

        for header in [
            token.clone(),
            format!("Basic {token}"),
            format!("Bearer  {token}"),
            format!("Bearer {token} extra"),
            "Bearer short".to_string(),
        ] {
            let req = axum::http::Request::builder()
                .uri("/")
                .header(AUTHORIZATION, header.as_str())
                .body(Body::empty())
                .unwrap();
            let response = activated_app(&db).oneshot(req).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{header}");
        }
    }

    #[tokio::test]
    async fn activation_token_cannot_authenticate() {
        let (db, _dir) = temp_db();
        let user = UserRepository::new(&db)
            .insert(new_user("ada@example.com"))
            .unwrap();
        let activation = TokenRepository::new(&db)
            .new_token(user.id, Duration::days(3), TokenScope::Activation)
            .unwrap();

        let response = activated_app(&db)
            .oneshot(request(Some(&activation.plaintext)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn require_activated_rejects_unactivated_with_403() {
        let (db, _dir) = temp_db();
        let (_, pending) = login(&db, "ada@example.com", Role::User, false);
        let (_, active) = login(&db, "grace@example.com", Role::User, true);

        let response = activated_app(&db)
            .oneshot(request(Some(&pending)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = activated_app(&db)
            .oneshot(request(Some(&active)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn require_role_checks_role_not_activation() {
        let (db, _dir) = temp_db();
        let (_, user) = login(&db, "ada@example.com", Role::User, true);
        let (_, admin) = login(&db, "root@example.com", Role::Admin, false);

        let response = admin_app(&db).oneshot(request(Some(&user))).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = admin_app(&db).oneshot(request(Some(&admin))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = admin_app(&db).oneshot(request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn require_permission_checks_grants() {
        let (db, _dir) = temp_db();
        let (reader, with_grant) = login(&db, "ada@example.com", Role::User, true);
        let (_, without_grant) = login(&db, "grace@example.com", Role::User, true);
        PermissionRepository::new(&db)
            .add_for_user(reader.id, &[MODULES_READ])
            .unwrap();

        let app = Router::new()
            .route("/", get(ok))
            .route_layer(from_fn_with_state(
                PermissionGate::new(db.clone(), MODULES_READ),
                require_permission,
            ))
            .layer(from_fn_with_state(db.clone(), authenticate));

        let response = app
            .clone()
            .oneshot(request(Some(&with_grant)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(request(Some(&without_grant))).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn guard_without_authenticate_is_internal_error() {
        let app = Router::new()
            .route("/", get(ok))
            .route_layer(from_fn(require_authenticated));

        let response = app.oneshot(request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
