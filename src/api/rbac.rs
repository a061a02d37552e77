// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Role and menu administration endpoints.
//!
//! Each handler calls `require_permission` before touching anything.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::Auth;
use crate::error::{ApiError, ErrorBody};
use crate::rbac::{Menu, MenuFlags, NewMenu, NewRole, Role};
use crate::state::AppState;

pub const ROLE_LIST: &str = "system:role:list";
pub const ROLE_ADD: &str = "system:role:add";
pub const ROLE_EDIT: &str = "system:role:edit";
pub const ROLE_REMOVE: &str = "system:role:remove";
pub const MENU_LIST: &str = "system:menu:list";
pub const MENU_ADD: &str = "system:menu:add";
pub const MENU_EDIT: &str = "system:menu:edit";
pub const MENU_REMOVE: &str = "system:menu:remove";
pub const USER_ROLE: &str = "system:user:role";

/// Request body for PUT /v1/rbac/roles/{role_id}/status
#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleStatusRequest {
    pub enabled: bool,
}

/// Result of an association change.
#[derive(Debug, Serialize, ToSchema)]
pub struct AssociationResponse {
    /// `false` when the association was already in the requested state
    pub changed: bool,
}

async fn guard(state: &AppState, principal_id: i64, permission: &str) -> Result<(), ApiError> {
    state.permissions.require_permission(principal_id, permission).await?;
    Ok(())
}

#[utoipa::path(
    get,
    path = "/v1/rbac/roles",
    tag = "RBAC",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "All roles", body = [Role]),
        (status = 403, description = "Missing system:role:list", body = ErrorBody),
    )
)]
pub async fn list_roles(State(state): State<AppState>, Auth(user): Auth) -> Result<Json<Vec<Role>>, ApiError> {
    guard(&state, user.principal_id, ROLE_LIST).await?;
    Ok(Json(state.rbac.list_roles().await?))
}

#[utoipa::path(
    post,
    path = "/v1/rbac/roles",
    tag = "RBAC",
    security(("bearer" = [])),
    request_body = NewRole,
    responses(
        (status = 201, description = "Role created", body = Role),
        (status = 403, description = "Missing system:role:add", body = ErrorBody),
        (status = 409, description = "Role key already exists", body = ErrorBody),
    )
)]
pub async fn create_role(
    State(state): State<AppState>,
    Auth(user): Auth,
    Json(request): Json<NewRole>,
) -> Result<(StatusCode, Json<Role>), ApiError> {
    guard(&state, user.principal_id, ROLE_ADD).await?;
    if request.key.trim().is_empty() {
        return Err(ApiError::unprocessable("role key must not be empty"));
    }
    let role = state.rbac.create_role(request).await?;
    Ok((StatusCode::CREATED, Json(role)))
}

#[utoipa::path(
    put,
    path = "/v1/rbac/roles/{role_id}/status",
    tag = "RBAC",
    security(("bearer" = [])),
    params(("role_id" = i64, Path, description = "Role ID")),
    request_body = RoleStatusRequest,
    responses(
        (status = 200, description = "Role updated", body = Role),
        (status = 403, description = "Missing system:role:edit", body = ErrorBody),
        (status = 404, description = "Unknown role", body = ErrorBody),
    )
)]
pub async fn set_role_status(
    State(state): State<AppState>,
    Auth(user): Auth,
    Path(role_id): Path<i64>,
    Json(request): Json<RoleStatusRequest>,
) -> Result<Json<Role>, ApiError> {
    guard(&state, user.principal_id, ROLE_EDIT).await?;
    Ok(Json(state.rbac.set_role_enabled(role_id, request.enabled).await?))
}

#[utoipa::path(
    delete,
    path = "/v1/rbac/roles/{role_id}",
    tag = "RBAC",
    security(("bearer" = [])),
    params(("role_id" = i64, Path, description = "Role ID")),
    responses(
        (status = 204, description = "Role deleted"),
        (status = 403, description = "Missing system:role:remove", body = ErrorBody),
        (status = 404, description = "Unknown role", body = ErrorBody),
    )
)]
pub async fn delete_role(
    State(state): State<AppState>,
    Auth(user): Auth,
    Path(role_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    guard(&state, user.principal_id, ROLE_REMOVE).await?;
    state.rbac.delete_role(role_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/v1/rbac/menus",
    tag = "RBAC",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "All menus", body = [Menu]),
        (status = 403, description = "Missing system:menu:list", body = ErrorBody),
    )
)]
pub async fn list_menus(State(state): State<AppState>, Auth(user): Auth) -> Result<Json<Vec<Menu>>, ApiError> {
    guard(&state, user.principal_id, MENU_LIST).await?;
    Ok(Json(state.rbac.list_menus().await?))
}

#[utoipa::path(
    post,
    path = "/v1/rbac/menus",
    tag = "RBAC",
    security(("bearer" = [])),
    request_body = NewMenu,
    responses(
        (status = 201, description = "Menu created", body = Menu),
        (status = 403, description = "Missing system:menu:add", body = ErrorBody),
        (status = 404, description = "Unknown parent menu", body = ErrorBody),
    )
)]
pub async fn create_menu(
    State(state): State<AppState>,
    Auth(user): Auth,
    Json(request): Json<NewMenu>,
) -> Result<(StatusCode, Json<Menu>), ApiError> {
    guard(&state, user.principal_id, MENU_ADD).await?;
    if request.name.trim().is_empty() {
        return Err(ApiError::unprocessable("menu name must not be empty"));
    }
    let menu = state.rbac.create_menu(request).await?;
    Ok((StatusCode::CREATED, Json(menu)))
}

#[utoipa::path(
    patch,
    path = "/v1/rbac/menus/{menu_id}",
    tag = "RBAC",
    security(("bearer" = [])),
    params(("menu_id" = i64, Path, description = "Menu ID")),
    request_body = MenuFlags,
    responses(
        (status = 200, description = "Menu updated", body = Menu),
        (status = 403, description = "Missing system:menu:edit", body = ErrorBody),
        (status = 404, description = "Unknown menu", body = ErrorBody),
    )
)]
pub async fn update_menu_flags(
    State(state): State<AppState>,
    Auth(user): Auth,
    Path(menu_id): Path<i64>,
    Json(flags): Json<MenuFlags>,
) -> Result<Json<Menu>, ApiError> {
    guard(&state, user.principal_id, MENU_EDIT).await?;
    Ok(Json(state.rbac.update_menu_flags(menu_id, flags).await?))
}

#[utoipa::path(
    delete,
    path = "/v1/rbac/menus/{menu_id}",
    tag = "RBAC",
    security(("bearer" = [])),
    params(("menu_id" = i64, Path, description = "Menu ID")),
    responses(
        (status = 204, description = "Menu deleted"),
        (status = 403, description = "Missing system:menu:remove", body = ErrorBody),
        (status = 404, description = "Unknown menu", body = ErrorBody),
        (status = 409, description = "Menu has children", body = ErrorBody),
    )
)]
pub async fn delete_menu(
    State(state): State<AppState>,
    Auth(user): Auth,
    Path(menu_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    guard(&state, user.principal_id, MENU_REMOVE).await?;
    state.rbac.delete_menu(menu_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/v1/rbac/roles/{role_id}/menus/{menu_id}",
    tag = "RBAC",
    security(("bearer" = [])),
    params(
        ("role_id" = i64, Path, description = "Role ID"),
        ("menu_id" = i64, Path, description = "Menu ID"),
    ),
    responses(
        (status = 200, description = "Menu granted", body = AssociationResponse),
        (status = 403, description = "Missing system:role:edit", body = ErrorBody),
        (status = 404, description = "Unknown role or menu", body = ErrorBody),
    )
)]
pub async fn grant_menu(
    State(state): State<AppState>,
    Auth(user): Auth,
    Path((role_id, menu_id)): Path<(i64, i64)>,
) -> Result<Json<AssociationResponse>, ApiError> {
    guard(&state, user.principal_id, ROLE_EDIT).await?;
    let changed = state.rbac.grant_menu(role_id, menu_id).await?;
    Ok(Json(AssociationResponse { changed }))
}

#[utoipa::path(
    delete,
    path = "/v1/rbac/roles/{role_id}/menus/{menu_id}",
    tag = "RBAC",
    security(("bearer" = [])),
    params(
        ("role_id" = i64, Path, description = "Role ID"),
        ("menu_id" = i64, Path, description = "Menu ID"),
    ),
    responses(
        (status = 200, description = "Menu revoked", body = AssociationResponse),
        (status = 403, description = "Missing system:role:edit", body = ErrorBody),
    )
)]
pub async fn revoke_menu(
    State(state): State<AppState>,
    Auth(user): Auth,
    Path((role_id, menu_id)): Path<(i64, i64)>,
) -> Result<Json<AssociationResponse>, ApiError> {
    guard(&state, user.principal_id, ROLE_EDIT).await?;
    let changed = state.rbac.revoke_menu(role_id, menu_id).await?;
    Ok(Json(AssociationResponse { changed }))
}

#[utoipa::path(
    get,
    path = "/v1/rbac/principals/{principal_id}/roles",
    tag = "RBAC",
    security(("bearer" = [])),
    params(("principal_id" = i64, Path, description = "Principal ID")),
    responses(
        (status = 200, description = "Roles held", body = [Role]),
        (status = 403, description = "Missing system:user:role", body = ErrorBody),
    )
)]
pub async fn principal_roles(
    State(state): State<AppState>,
    Auth(user): Auth,
    Path(principal_id): Path<i64>,
) -> Result<Json<Vec<Role>>, ApiError> {
    guard(&state, user.principal_id, USER_ROLE).await?;
    Ok(Json(state.rbac.roles_of(principal_id).await?))
}

#[utoipa::path(
    put,
    path = "/v1/rbac/principals/{principal_id}/roles/{role_id}",
    tag = "RBAC",
    security(("bearer" = [])),
    params(
        ("principal_id" = i64, Path, description = "Principal ID"),
        ("role_id" = i64, Path, description = "Role ID"),
    ),
    responses(
        (status = 200, description = "Role assigned", body = AssociationResponse),
        (status = 403, description = "Missing system:user:role", body = ErrorBody),
        (status = 404, description = "Unknown role", body = ErrorBody),
    )
)]
pub async fn assign_role(
    State(state): State<AppState>,
    Auth(user): Auth,
    Path((principal_id, role_id)): Path<(i64, i64)>,
) -> Result<Json<AssociationResponse>, ApiError> {
    guard(&state, user.principal_id, USER_ROLE).await?;
    let changed = state.rbac.assign_role(principal_id, role_id).await?;
    Ok(Json(AssociationResponse { changed }))
}

#[utoipa::path(
    delete,
    path = "/v1/rbac/principals/{principal_id}/roles/{role_id}",
    tag = "RBAC",
    security(("bearer" = [])),
    params(
        ("principal_id" = i64, Path, description = "Principal ID"),
        ("role_id" = i64, Path, description = "Role ID"),
    ),
    responses(
        (status = 200, description = "Role unassigned", body = AssociationResponse),
        (status = 403, description = "Missing system:user:role", body = ErrorBody),
    )
)]
pub async fn unassign_role(
    State(state): State<AppState>,
    Auth(user): Auth,
    Path((principal_id, role_id)): Path<(i64, i64)>,
) -> Result<Json<AssociationResponse>, ApiError> {
    guard(&state, user.principal_id, USER_ROLE).await?;
    let changed = state.rbac.unassign_role(principal_id, role_id).await?;
    Ok(Json(AssociationResponse { changed }))
}
