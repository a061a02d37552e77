// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Caller-scoped authorization queries.

use std::collections::BTreeSet;

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::Auth;
use crate::error::{ApiError, ErrorBody};
use crate::rbac::MenuNode;
use crate::state::AppState;

/// Response for GET /v1/users/me/permissions
#[derive(Debug, Serialize, ToSchema)]
pub struct PermissionsResponse {
    pub principal_id: i64,
    pub username: String,
    /// Granted permission strings (`*:*:*` for administrators)
    pub permissions: BTreeSet<String>,
}

/// Permissions granted to the caller.
#[utoipa::path(
    get,
    path = "/v1/users/me/permissions",
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Permission set", body = PermissionsResponse),
        (status = 401, description = "Unauthorized", body = ErrorBody),
    )
)]
pub async fn my_permissions(
    State(state): State<AppState>,
    Auth(user): Auth,
) -> Result<Json<PermissionsResponse>, ApiError> {
    let permissions = state.permissions.get_permission_set(user.principal_id).await?;
    Ok(Json(PermissionsResponse {
        principal_id: user.principal_id,
        username: user.username,
        permissions,
    }))
}

/// Navigation tree visible to the caller.
#[utoipa::path(
    get,
    path = "/v1/users/me/menus",
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Menu forest", body = [MenuNode]),
        (status = 401, description = "Unauthorized", body = ErrorBody),
    )
)]
pub async fn my_menus(State(state): State<AppState>, Auth(user): Auth) -> Result<Json<Vec<MenuNode>>, ApiError> {
    Ok(Json(state.permissions.get_menu_tree(user.principal_id).await?))
}
