// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractor for the authenticated principal.
//!
//! ```rust,ignore
//! async fn my_handler(Auth(user): Auth) -> impl IntoResponse {
//!     // user is AuthenticatedUser
//! }
//! ```
//!
//! The extractor trusts what the edge established: the request
//! extension when the edge authenticated the request itself, or the
//! principal headers on a request the edge accepted as internal (trust
//! marker plus the shared secret). The edge strips those headers from
//! every other request. It never consults the session registry.

use axum::{extract::FromRequestParts, http::request::Parts};

use super::middleware::{decode_header_value, PRINCIPAL_ID_HEADER, PRINCIPAL_NAME_HEADER};
use super::{AuthError, AuthenticatedUser};

/// Extractor for authenticated principals.
pub struct Auth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for Auth
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>().cloned() {
            return Ok(Auth(user));
        }

        let principal_id = parts
            .headers
            .get(PRINCIPAL_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
            .ok_or(AuthError::MissingToken)?;
        let username = parts
            .headers
            .get(PRINCIPAL_NAME_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(decode_header_value)
            .filter(|name| !name.is_empty())
            .ok_or(AuthError::MissingToken)?;

        Ok(Auth(AuthenticatedUser::new(principal_id, username)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/test");
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn prefers_extension() {
        let mut parts = parts(&[("x-principal-id", "9"), ("x-principal-name", "other")]);
        parts.extensions.insert(AuthenticatedUser::new(1, "alice"));

        let Auth(user) = Auth::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(user, AuthenticatedUser::new(1, "alice"));
    }

    #[tokio::test]
    async fn falls_back_to_forwarded_headers() {
        let mut parts = parts(&[("x-principal-id", "7"), ("x-principal-name", "Zo%C3%AB+B")]);

        let Auth(user) = Auth::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(user, AuthenticatedUser::new(7, "Zoë B"));
    }

    #[tokio::test]
    async fn rejects_without_identity() {
        let mut parts = parts(&[]);
        let result = Auth::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(AuthError::MissingToken)));

        let mut parts = parts_with_bad_id();
        assert!(Auth::from_request_parts(&mut parts, &()).await.is_err());
    }

    fn parts_with_bad_id() -> Parts {
        parts(&[("x-principal-id", "abc"), ("x-principal-name", "alice")])
    }
}
