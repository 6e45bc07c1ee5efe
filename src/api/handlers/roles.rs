//! Role management endpoints (admin only).

use axum::{
    extract::{Extension, Path},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use ulid::Ulid;
use utoipa::ToSchema;

use super::RoleResponse;
use crate::{
    api::{
        error::{ApiError, ErrorBody},
        validation::{Rule, Validate, ValidatedJson, Validator},
        AppState,
    },
    store::{CreateRoleParams, UpdateRoleParams},
};

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct CreateRoleRequest {
    pub name: String,
    pub description: String,
}

impl Validate for CreateRoleRequest {
    fn validate(&self) -> Result<(), ApiError> {
        Validator::new()
            .text("name", &self.name, &[Rule::Required, Rule::Alphanum])
            .finish()
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct ListRolesRequest {
    pub page_id: i64,
    pub page_size: i64,
}

impl Validate for ListRolesRequest {
    fn validate(&self) -> Result<(), ApiError> {
        Validator::new()
            .number("page_id", self.page_id, &[Rule::Required, Rule::Gte(1)])
            .number(
                "page_size",
                self.page_size,
                &[Rule::Required, Rule::Min(5), Rule::Max(50)],
            )
            .finish()
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct UpdateRoleRequest {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
}

impl Validate for UpdateRoleRequest {
    fn validate(&self) -> Result<(), ApiError> {
        Validator::new()
            .text("id", &self.id, &[Rule::Required])
            .optional_text("name", self.name.as_deref(), &[Rule::Required, Rule::Alphanum])
            .finish()
    }
}

#[utoipa::path(
    post,
    path = "/role",
    request_body = CreateRoleRequest,
    responses(
        (status = 200, description = "Role created.", body = RoleResponse),
        (status = 400, description = "Invalid input.", body = ErrorBody),
        (status = 401, description = "Missing token or not an admin.", body = ErrorBody),
        (status = 403, description = "Role name already taken.", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "roles"
)]
pub async fn create_role(
    Extension(state): Extension<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<CreateRoleRequest>,
) -> Result<Json<RoleResponse>, ApiError> {
    let role = state
        .store
        .create_role(CreateRoleParams {
            external_id: Ulid::new().to_string(),
            name: request.name,
            description: request.description,
            created_at: state.clock.now(),
        })
        .await
        .map_err(ApiError::from_store)?;

    info!(role = %role.name, "role created");
    Ok(Json(RoleResponse::from(role)))
}

#[utoipa::path(
    get,
    path = "/role/{id}",
    params(
        ("id" = String, Path, description = "Role id")
    ),
    responses(
        (status = 200, description = "Role detail.", body = RoleResponse),
        (status = 401, description = "Missing token or not an admin.", body = ErrorBody),
        (status = 404, description = "Role not found.", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "roles"
)]
pub async fn get_role(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RoleResponse>, ApiError> {
    let role = state
        .store
        .get_role(id.trim())
        .await
        .map_err(ApiError::from_store)?;
    Ok(Json(RoleResponse::from(role)))
}

#[utoipa::path(
    post,
    path = "/role/all",
    request_body = ListRolesRequest,
    responses(
        (status = 200, description = "One page of roles ordered by name.", body = [RoleResponse]),
        (status = 400, description = "Invalid paging.", body = ErrorBody),
        (status = 401, description = "Missing token or not an admin.", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "roles"
)]
pub async fn list_roles(
    Extension(state): Extension<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<ListRolesRequest>,
) -> Result<Json<Vec<RoleResponse>>, ApiError> {
    let offset = (request.page_id - 1).saturating_mul(request.page_size);
    let roles = state
        .store
        .list_roles(request.page_size, offset)
        .await
        .map_err(ApiError::from_store)?;
    Ok(Json(roles.into_iter().map(RoleResponse::from).collect()))
}

#[utoipa::path(
    put,
    path = "/role",
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role updated.", body = RoleResponse),
        (status = 400, description = "Invalid input.", body = ErrorBody),
        (status = 401, description = "Missing token or not an admin.", body = ErrorBody),
        (status = 403, description = "Role name already taken.", body = ErrorBody),
        (status = 404, description = "Role not found.", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "roles"
)]
pub async fn update_role(
    Extension(state): Extension<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<UpdateRoleRequest>,
) -> Result<Json<RoleResponse>, ApiError> {
    let role = state
        .store
        .update_role(UpdateRoleParams {
            external_id: request.id,
            name: request.name,
            description: request.description,
            updated_at: state.clock.now(),
        })
        .await
        .map_err(ApiError::from_store)?;

    info!(role = %role.name, "role updated");
    Ok(Json(RoleResponse::from(role)))
}
