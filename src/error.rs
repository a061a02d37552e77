// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::AuthError;

/// JSON body shared by every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// HTTP status code.
    pub code: u16,
    /// Human readable message.
    pub message: String,
    /// Epoch milliseconds when the error was produced.
    pub timestamp: i64,
}

impl ErrorBody {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code: status.as_u16(),
            message: message.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Render as a response with the matching status.
    pub fn into_response_with(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }

    pub fn gateway_timeout(message: impl Into<String>) -> Self {
        Self::new(StatusCode::GATEWAY_TIMEOUT, message)
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        let status = e.status_code();
        if status.is_server_error() {
            tracing::error!(error_code = e.error_code(), error = %e, "Request failed on a dependency");
        } else {
            tracing::warn!(error_code = e.error_code(), "Request rejected");
        }
        Self::new(status, e.public_message())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        ErrorBody::new(self.status, self.message).into_response_with(self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn constructors_set_status_and_message() {
        let nf = ApiError::not_found("missing");
        assert_eq!(nf.status, StatusCode::NOT_FOUND);
        assert_eq!(nf.message, "missing");

        let bad = ApiError::bad_request("bad");
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);
        assert_eq!(bad.message, "bad");

        let unp = ApiError::unprocessable("oops");
        assert_eq!(unp.status, StatusCode::UNPROCESSABLE_ENTITY);

        assert_eq!(ApiError::conflict("x").status, StatusCode::CONFLICT);
        assert_eq!(ApiError::bad_gateway("x").status, StatusCode::BAD_GATEWAY);
        assert_eq!(ApiError::gateway_timeout("x").status, StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn auth_errors_keep_status_and_public_message() {
        let err = ApiError::from(AuthError::Forbidden("system:role:edit".into()));
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert!(!err.message.contains("system:role:edit"));

        let err = ApiError::from(AuthError::BadCredentials);
        assert_eq!(err.message, crate::auth::error::LOGIN_FAILED_MESSAGE);
    }

    #[tokio::test]
    async fn into_response_returns_code_message_timestamp() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(body["code"], 400);
        assert_eq!(body["message"], "bad data");
        assert!(body["timestamp"].as_i64().unwrap() > 0);
    }
}
