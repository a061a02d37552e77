// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token claims and authenticated principal representation.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Claims carried by a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    /// Subject (username)
    pub sub: String,

    /// Principal ID
    pub pid: i64,

    /// Issued at timestamp
    pub iat: i64,

    /// Expiration timestamp
    pub exp: i64,

    /// Unique token ID; keeps two tokens minted in the same second distinct
    pub jti: String,
}

/// Authenticated principal.
///
/// Both credential strategies normalize to this shape, and the edge
/// forwards it to downstream handlers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct AuthenticatedUser {
    /// Principal ID
    pub principal_id: i64,

    /// Login name
    pub username: String,
}

impl AuthenticatedUser {
    pub fn new(principal_id: i64, username: impl Into<String>) -> Self {
        Self {
            principal_id,
            username: username.into(),
        }
    }
}

impl From<&TokenClaims> for AuthenticatedUser {
    fn from(claims: &TokenClaims) -> Self {
        Self::new(claims.pid, claims.sub.clone())
    }
}
