// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.
//!
//! Every variant keeps its precise kind for logs (`error_code`), while
//! responses collapse authentication failures into two generic
//! messages so callers cannot probe which accounts exist.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::error::ErrorBody;
use crate::storage::KvError;

use super::credentials::StoreError;

/// Generic message for every login failure.
pub const LOGIN_FAILED_MESSAGE: &str = "username or password incorrect";

/// Generic message for every token/session failure.
pub const UNAUTHORIZED_MESSAGE: &str = "unauthorized, please log in";

/// Why the registry no longer vouches for a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionLapse {
    /// No session record (expired in storage or logged out).
    Absent,
    /// A different token is registered (later login elsewhere).
    Replaced,
}

/// Authentication error type.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("unknown account")]
    UnknownAccount,

    #[error("bad credentials")]
    BadCredentials,

    #[error("account is disabled")]
    DisabledAccount,

    #[error("account is locked")]
    LockedAccount,

    #[error("too many failed login attempts, account locked")]
    ExcessiveAttempts,

    #[error("bearer token missing")]
    MissingToken,

    #[error("bearer token is malformed or its signature is invalid")]
    TokenMalformed,

    #[error("bearer token has expired")]
    TokenExpired,

    #[error("session no longer live ({0:?})")]
    SessionSuperseded(SessionLapse),

    #[error("missing permission {0}")]
    Forbidden(String),

    #[error("password reset code is invalid or expired")]
    InvalidResetCode,

    #[error("dependency timed out after {0:?}")]
    DependencyTimeout(Duration),

    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("internal authentication error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable code for logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::UnknownAccount => "UNKNOWN_ACCOUNT",
            AuthError::BadCredentials => "BAD_CREDENTIALS",
            AuthError::DisabledAccount => "DISABLED_ACCOUNT",
            AuthError::LockedAccount => "LOCKED_ACCOUNT",
            AuthError::ExcessiveAttempts => "EXCESSIVE_ATTEMPTS",
            AuthError::MissingToken => "TOKEN_MISSING",
            AuthError::TokenMalformed => "TOKEN_MALFORMED",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::SessionSuperseded(_) => "SESSION_SUPERSEDED",
            AuthError::Forbidden(_) => "FORBIDDEN",
            AuthError::InvalidResetCode => "INVALID_RESET_CODE",
            AuthError::DependencyTimeout(_) => "DEPENDENCY_TIMEOUT",
            AuthError::DependencyUnavailable(_) => "DEPENDENCY_UNAVAILABLE",
            AuthError::Internal(_) => "INTERNAL",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::UnknownAccount
            | AuthError::BadCredentials
            | AuthError::DisabledAccount
            | AuthError::LockedAccount
            | AuthError::ExcessiveAttempts
            | AuthError::MissingToken
            | AuthError::TokenMalformed
            | AuthError::TokenExpired
            | AuthError::SessionSuperseded(_) => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
            AuthError::InvalidResetCode => StatusCode::BAD_REQUEST,
            AuthError::DependencyTimeout(_) | AuthError::DependencyUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to clients.
    pub fn public_message(&self) -> &'static str {
        match self {
            AuthError::UnknownAccount
            | AuthError::BadCredentials
            | AuthError::DisabledAccount
            | AuthError::LockedAccount
            | AuthError::ExcessiveAttempts => LOGIN_FAILED_MESSAGE,
            AuthError::MissingToken | AuthError::TokenMalformed | AuthError::TokenExpired => {
                UNAUTHORIZED_MESSAGE
            }
            AuthError::SessionSuperseded(SessionLapse::Absent) => {
                "session expired, please log in again"
            }
            AuthError::SessionSuperseded(SessionLapse::Replaced) => {
                "account signed in elsewhere, please log in again"
            }
            AuthError::Forbidden(_) => "insufficient permissions for this operation",
            AuthError::InvalidResetCode => "verification code is invalid or expired",
            AuthError::DependencyTimeout(_) | AuthError::DependencyUnavailable(_) => {
                "service temporarily unavailable, please retry"
            }
            AuthError::Internal(_) => "internal server error",
        }
    }

    /// Whether this is a dependency failure rather than a verdict on the caller.
    pub fn is_dependency_failure(&self) -> bool {
        matches!(
            self,
            AuthError::DependencyTimeout(_) | AuthError::DependencyUnavailable(_)
        )
    }
}

impl From<KvError> for AuthError {
    fn from(e: KvError) -> Self {
        match e {
            KvError::Timeout(after) => AuthError::DependencyTimeout(after),
            KvError::Backend(msg) => AuthError::DependencyUnavailable(msg),
            KvError::Codec { .. } => AuthError::Internal(e.to_string()),
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Timeout(after) => AuthError::DependencyTimeout(after),
            StoreError::Backend(msg) => AuthError::DependencyUnavailable(msg),
            StoreError::NotFound(_) | StoreError::Conflict(_) => AuthError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error_code = self.error_code(), error = %self, "Authentication dependency failure");
        } else {
            tracing::debug!(error_code = self.error_code(), error = %self, "Request rejected");
        }
        ErrorBody::new(status, self.public_message()).into_response_with(status)
    }
}
