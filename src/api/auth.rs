// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Login, logout and password reset endpoints.

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::{authenticator::LoginSession, Auth, AuthenticatedUser};
use crate::error::{ApiError, ErrorBody};
use crate::state::AppState;

/// Request body for POST /v1/auth/login
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Request body for POST /v1/auth/password/code
#[derive(Debug, Deserialize, ToSchema)]
pub struct PasswordCodeRequest {
    pub email: String,
}

/// Request body for POST /v1/auth/password/reset
#[derive(Debug, Deserialize, ToSchema)]
pub struct PasswordResetRequest {
    pub email: String,
    /// One-time code received by email
    pub code: String,
    pub new_password: String,
}

/// Exchange username/password for a bearer token.
///
/// Any earlier session of the same account stops working.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginSession),
        (status = 400, description = "Missing username or password", body = ErrorBody),
        (status = 401, description = "Username or password incorrect", body = ErrorBody),
        (status = 503, description = "Dependency unavailable", body = ErrorBody),
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginSession>, ApiError> {
    if request.username.trim().is_empty() || request.password.is_empty() {
        return Err(ApiError::bad_request("username and password are required"));
    }
    let session = state
        .authenticator
        .login(request.username.trim(), &request.password)
        .await?;
    Ok(Json(session))
}

/// End the caller's session.
#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    tag = "Auth",
    security(("bearer" = [])),
    responses(
        (status = 204, description = "Logged out"),
        (status = 401, description = "Unauthorized", body = ErrorBody),
    )
)]
pub async fn logout(State(state): State<AppState>, Auth(user): Auth) -> Result<StatusCode, ApiError> {
    state.authenticator.logout(user.principal_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Identity of the caller.
#[utoipa::path(
    get,
    path = "/v1/auth/me",
    tag = "Auth",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Authenticated principal", body = AuthenticatedUser),
        (status = 401, description = "Unauthorized", body = ErrorBody),
    )
)]
pub async fn me(Auth(user): Auth) -> Json<AuthenticatedUser> {
    Json(user)
}

/// Email a one-time password reset code.
///
/// Always 202, whether or not the address belongs to an account.
#[utoipa::path(
    post,
    path = "/v1/auth/password/code",
    tag = "Auth",
    request_body = PasswordCodeRequest,
    responses(
        (status = 202, description = "Code sent if the address is known"),
        (status = 400, description = "Invalid email", body = ErrorBody),
    )
)]
pub async fn request_password_code(
    State(state): State<AppState>,
    Json(request): Json<PasswordCodeRequest>,
) -> Result<StatusCode, ApiError> {
    if !request.email.contains('@') {
        return Err(ApiError::bad_request("a valid email is required"));
    }
    state.password_reset.request_code(&request.email).await?;
    Ok(StatusCode::ACCEPTED)
}

/// Set a new password using a one-time code.
#[utoipa::path(
    post,
    path = "/v1/auth/password/reset",
    tag = "Auth",
    request_body = PasswordResetRequest,
    responses(
        (status = 204, description = "Password changed; existing session revoked"),
        (status = 400, description = "Invalid or expired code", body = ErrorBody),
    )
)]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(request): Json<PasswordResetRequest>,
) -> Result<StatusCode, ApiError> {
    if request.new_password.is_empty() {
        return Err(ApiError::bad_request("new_password must not be empty"));
    }
    state
        .password_reset
        .reset(&request.email, &request.code, &request.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
