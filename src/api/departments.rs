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
    models::{CreateDepartmentRequest, DepartmentEnvelope},
    state::AppState,
    storage::{DepartmentRepository, NewDepartmentInfo, StoreError},
};

#[utoipa::path(
    post,
    path = "/v1/department-infos",
    request_body = CreateDepartmentRequest,
    tag = "Departments",
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Department created", body = DepartmentEnvelope,
            headers(("Location" = String, description = "URL of the new department"))),
        (status = 422, description = "Validation failed or unknown module")
    )
)]
pub async fn create_department(
    State(state): State<AppState>,
    AppJson(request): AppJson<CreateDepartmentRequest>,
) -> Result<(StatusCode, HeaderMap, Json<DepartmentEnvelope>), ApiError> {
    request.validate().map_err(ApiError::failed_validation)?;

    let new = NewDepartmentInfo {
        department_name: request.department_name,
        staff_quantity: request.staff_quantity,
        department_director: request.department_director,
        module_id: request.module_id,
    };
    let department = match state
        .db
        .call(move |db| DepartmentRepository::new(db).insert(new))
        .await
    {
        Ok(department) => department,
        Err(StoreError::NotFound(_)) => {
            return Err(ApiError::invalid_field(
                "moduleId",
                "must reference an existing module",
            ))
        }
        Err(e) => return Err(e.into()),
    };

    let mut headers = HeaderMap::new();
    let location = HeaderValue::from_str(&format!("/v1/department-infos/{}", department.id))
        .map_err(ApiError::internal)?;
    headers.insert(LOCATION, location);

    Ok((
        StatusCode::CREATED,
        headers,
        Json(DepartmentEnvelope {
            department_info: department,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/v1/department-infos/{id}",
    params(("id" = u64, Path, description = "Department id")),
    tag = "Departments",
    security(("bearer" = [])),
    responses(
        (status = 200, body = DepartmentEnvelope),
        (status = 404, description = "No such department")
    )
)]
pub async fn get_department(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<DepartmentEnvelope>, ApiError> {
    let id = read_id(&id)?;
    let department = state
        .db
        .call(move |db| DepartmentRepository::new(db).get(id))
        .await?;
    Ok(Json(DepartmentEnvelope {
        department_info: department,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::test_app;
    use crate::storage::{ModuleRepository, NewModuleInfo};

    fn request(module_id: u64) -> CreateDepartmentRequest {
        CreateDepartmentRequest {
            department_name: "Computer Science".into(),
            staff_quantity: 12,
            department_director: "E. Dijkstra".into(),
            module_id,
        }
    }

    #[tokio::test]
    async fn unknown_module_is_422() {
        let app = test_app();
        let err = create_department(State(app.state.clone()), AppJson(request(99)))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(err.fields.unwrap().contains_key("moduleId"));
    }

    #[tokio::test]
    async fn create_then_get() {
        let app = test_app();
        let module = ModuleRepository::new(&app.state.db)
            .insert(NewModuleInfo {
                module_name: "Algorithms".into(),
                module_duration: 1,
                exam_type: "Final".into(),
            })
            .unwrap();

        let (status, headers, Json(created)) =
            create_department(State(app.state.clone()), AppJson(request(module.id)))
                .await
                .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert!(headers.contains_key(LOCATION));

        let Json(fetched) = get_department(
            Path(created.department_info.id.to_string()),
            State(app.state.clone()),
        )
        .await
        .unwrap();
        assert_eq!(fetched.department_info, created.department_info);
    }
}
