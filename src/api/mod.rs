// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    middleware::from_fn_with_state,
    routing::{get, patch, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{authenticator::LoginSession, edge_authenticate, AuthenticatedUser},
    error::ErrorBody,
    gateway,
    rbac::{Menu, MenuFlags, MenuKind, MenuNode, NewMenu, NewRole, Role},
    state::AppState,
};

pub mod auth;
pub mod health;
pub mod rbac;
pub mod users;

/// Full HTTP surface: local `/v1` API, health probes, docs, and the
/// gateway fallback for everything else. Every request passes the edge
/// authentication layer first.
pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        .route("/auth/password/code", post(auth::request_password_code))
        .route("/auth/password/reset", post(auth::reset_password))
        .route("/users/me/permissions", get(users::my_permissions))
        .route("/users/me/menus", get(users::my_menus))
        .route("/rbac/roles", get(rbac::list_roles).post(rbac::create_role))
        .route("/rbac/roles/{role_id}", axum::routing::delete(rbac::delete_role))
        .route("/rbac/roles/{role_id}/status", put(rbac::set_role_status))
        .route(
            "/rbac/roles/{role_id}/menus/{menu_id}",
            put(rbac::grant_menu).delete(rbac::revoke_menu),
        )
        .route("/rbac/menus", get(rbac::list_menus).post(rbac::create_menu))
        .route(
            "/rbac/menus/{menu_id}",
            patch(rbac::update_menu_flags).delete(rbac::delete_menu),
        )
        .route("/rbac/principals/{principal_id}/roles", get(rbac::principal_roles))
        .route(
            "/rbac/principals/{principal_id}/roles/{role_id}",
            put(rbac::assign_role).delete(rbac::unassign_role),
        );

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    let layers = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(CorsLayer::permissive());

    Router::new()
        .nest("/v1", v1_routes)
        .merge(health_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .fallback(gateway::proxy)
        .layer(from_fn_with_state(state.clone(), edge_authenticate))
        .layer(layers)
        .with_state(state)
}

struct BearerSecurity;

impl Modify for BearerSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        auth::login,
        auth::logout,
        auth::me,
        auth::request_password_code,
        auth::reset_password,
        users::my_permissions,
        users::my_menus,
        rbac::list_roles,
        rbac::create_role,
        rbac::set_role_status,
        rbac::delete_role,
        rbac::list_menus,
        rbac::create_menu,
        rbac::update_menu_flags,
        rbac::delete_menu,
        rbac::grant_menu,
        rbac::revoke_menu,
        rbac::principal_roles,
        rbac::assign_role,
        rbac::unassign_role
    ),
    components(
        schemas(
            ErrorBody,
            LoginSession,
            AuthenticatedUser,
            Role,
            Menu,
            MenuKind,
            MenuNode,
            NewRole,
            NewMenu,
            MenuFlags,
            auth::LoginRequest,
            auth::PasswordCodeRequest,
            auth::PasswordResetRequest,
            users::PermissionsResponse,
            rbac::RoleStatusRequest,
            rbac::AssociationResponse,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    modifiers(&BearerSecurity),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Auth", description = "Login, logout and password reset"),
        (name = "Users", description = "Caller permissions and navigation menus"),
        (name = "RBAC", description = "Role and menu administration")
    )
)]
struct ApiDoc;
