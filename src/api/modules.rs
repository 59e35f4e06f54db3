// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, State},
    http::{header::LOCATION, HeaderMap, HeaderValue, StatusCode},
    Json,
};

use super::read_id;
use crate::{
    error::{ApiError, AppJson},
    models::{MessageResponse, ModuleEnvelope, ModuleInfoRequest, ModuleListEnvelope},
    state::AppState,
    storage::{ModuleRepository, NewModuleInfo},
};

/// Page size of the module listing.
const LATEST_MODULES: usize = 50;

#[utoipa::path(
    post,
    path = "/v1/module-infos",
    request_body = ModuleInfoRequest,
    tag = "Modules",
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Module created", body = ModuleEnvelope,
            headers(("Location" = String, description = "URL of the new module"))),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn create_module(
    State(state): State<AppState>,
    AppJson(request): AppJson<ModuleInfoRequest>,
) -> Result<(StatusCode, HeaderMap, Json<ModuleEnvelope>), ApiError> {
    request.validate().map_err(ApiError::failed_validation)?;

    let new = NewModuleInfo {
        module_name: request.module_name,
        module_duration: request.module_duration,
        exam_type: request.exam_type,
    };
    let module = state
        .db
        .call(move |db| ModuleRepository::new(db).insert(new))
        .await?;

    let mut headers = HeaderMap::new();
    let location = HeaderValue::from_str(&format!("/v1/module-infos/{}", module.id))
        .map_err(ApiError::internal)?;
    headers.insert(LOCATION, location);

    Ok((
        StatusCode::CREATED,
        headers,
        Json(ModuleEnvelope {
            module_info: module,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/v1/module-infos/{id}",
    params(("id" = u64, Path, description = "Module id")),
    tag = "Modules",
    security(("bearer" = [])),
    responses(
        (status = 200, body = ModuleEnvelope),
        (status = 404, description = "No such module")
    )
)]
pub async fn get_module(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ModuleEnvelope>, ApiError> {
    let id = read_id(&id)?;
    let module = state.db.call(move |db| ModuleRepository::new(db).get(id)).await?;
    Ok(Json(ModuleEnvelope {
        module_info: module,
    }))
}

/// The 50 most recently created modules, newest first.
#[utoipa::path(
    get,
    path = "/v1/module-infos",
    tag = "Modules",
    security(("bearer" = [])),
    responses((status = 200, body = ModuleListEnvelope))
)]
pub async fn list_modules(
    State(state): State<AppState>,
) -> Result<Json<ModuleListEnvelope>, ApiError> {
    let modules = state
        .db
        .call(|db| ModuleRepository::new(db).latest(LATEST_MODULES))
        .await?;
    Ok(Json(ModuleListEnvelope {
        module_infos: modules,
    }))
}

#[utoipa::path(
    put,
    path = "/v1/module-infos/{id}",
    params(("id" = u64, Path, description = "Module id")),
    request_body = ModuleInfoRequest,
    tag = "Modules",
    security(("bearer" = [])),
    responses(
        (status = 200, body = ModuleEnvelope),
        (status = 404, description = "No such module"),
        (status = 409, description = "Concurrent modification"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn edit_module(
    Path(id): Path<String>,
    State(state): State<AppState>,
    AppJson(request): AppJson<ModuleInfoRequest>,
) -> Result<Json<ModuleEnvelope>, ApiError> {
    let id = read_id(&id)?;
    let mut module = state.db.call(move |db| ModuleRepository::new(db).get(id)).await?;

    request.validate().map_err(ApiError::failed_validation)?;
    module.module_name = request.module_name;
    module.module_duration = request.module_duration;
    module.exam_type = request.exam_type;

    let updated = state
        .db
        .call(move |db| ModuleRepository::new(db).update(&module, module.version))
        .await?;
    Ok(Json(ModuleEnvelope {
        module_info: updated,
    }))
}

#[utoipa::path(
    delete,
    path = "/v1/module-infos/{id}",
    params(("id" = u64, Path, description = "Module id")),
    tag = "Modules",
    security(("bearer" = [])),
    responses(
        (status = 200, body = MessageResponse),
        (status = 404, description = "No such module")
    )
)]
pub async fn delete_module(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = read_id(&id)?;
    state.db.call(move |db| ModuleRepository::new(db).delete(id)).await?;
    Ok(Json(MessageResponse {
        message: "module info successfully deleted".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::test_app;

    fn request(name: &str) -> ModuleInfoRequest {
        ModuleInfoRequest {
            module_name: name.into(),
            module_duration: 3_600_000_000_000,
            exam_type: "Final".into(),
        }
    }

    #[tokio::test]
    async fn create_sets_location_header() {
        let app = test_app();

        let (status, headers, Json(body)) =
            create_module(State(app.state.clone()), AppJson(request("Compilers")))
                .await
                .unwrap();

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(
            headers.get(LOCATION).unwrap(),
            &format!("/v1/module-infos/{}", body.module_info.id)
        );
        assert_eq!(body.module_info.version, 1);
    }

    #[tokio::test]
    async fn list_returns_latest_fifty_newest_first() {
        let app = test_app();
        for i in 0..55 {
            let (status, _, _) =
                create_module(State(app.state.clone()), AppJson(request(&format!("M{i}"))))
                    .await
                    .unwrap();
            assert_eq!(status, StatusCode::CREATED);
        }

        let Json(body) = list_modules(State(app.state.clone())).await.unwrap();
        assert_eq!(body.module_infos.len(), 50);
        assert_eq!(body.module_infos[0].module_name, "M54");
        assert_eq!(body.module_infos[49].module_name, "M5");
    }

    #[tokio::test]
    async fn edit_then_delete() {
        let app = test_app();
        let (_, _, Json(created)) =
            create_module(State(app.state.clone()), AppJson(request("Compilers")))
                .await
                .unwrap();
        let id = created.module_info.id.to_string();

        let Json(edited) = edit_module(
            Path(id.clone()),
            State(app.state.clone()),
            AppJson(request("Advanced Compilers")),
        )
        .await
        .unwrap();
        assert_eq!(edited.module_info.module_name, "Advanced Compilers");
        assert_eq!(edited.module_info.version, 2);

        let Json(deleted) = delete_module(Path(id.clone()), State(app.state.clone()))
            .await
            .unwrap();
        assert_eq!(deleted.message, "module info successfully deleted");
        let err = get_module(Path(id), State(app.state.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_module_is_422() {
        let app = test_app();
        let mut bad = request("");
        bad.module_duration = -1;

        let err = create_module(State(app.state.clone()), AppJson(bad))
            .await
            .unwrap_err();
        let fields = err.fields.unwrap();
        assert!(fields.contains_key("moduleName"));
        assert!(fields.contains_key("moduleDuration"));
    }
}
