// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Edge authentication middleware.
//!
//! Applied to the whole router with
//! `axum::middleware::from_fn_with_state(state, edge_authenticate)`.
//!
//! ## Per-request decision
//!
//! 1. Internal trust marker present together with the configured shared
//!    secret: drop the secret header and forward. Without a configured
//!    secret the marker is never honoured.
//! 2. Path on the anonymous allow-list: strip client-supplied identity
//!    headers and forward.
//! 3. No bearer token: 401.
//! 4. Token fails codec verification: 401.
//! 5. Session registry does not hold this token: 401 (503 if the
//!    registry cannot be reached).
//! 6. Inject the trust marker, principal headers and the
//!    [`AuthenticatedUser`] extension, then forward.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::error::{AuthError, SessionLapse};
use super::session::SessionStatus;
use super::AuthenticatedUser;
use crate::config::Config;
use crate::state::AppState;

/// Principal ID header injected for downstream services.
pub const PRINCIPAL_ID_HEADER: HeaderName = HeaderName::from_static("x-principal-id");

/// Percent-encoded principal name header injected for downstream services.
pub const PRINCIPAL_NAME_HEADER: HeaderName = HeaderName::from_static("x-principal-name");

/// Shared secret an internal caller presents next to the trust marker.
pub const TRUST_SECRET_HEADER: HeaderName = HeaderName::from_static("x-gateway-secret");

type HmacSha256 = Hmac<Sha256>;

/// Verifier for the trust secret. Comparison runs over HMAC tags so its
/// timing does not depend on where the presented value diverges.
#[derive(Clone)]
pub struct TrustSecret {
    key: Vec<u8>,
    expected: Vec<u8>,
}

impl TrustSecret {
    pub fn new(secret: &[u8]) -> Option<Self> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(secret).ok()?;
        mac.update(secret);
        Some(Self {
            key: secret.to_vec(),
            expected: mac.finalize().into_bytes().to_vec(),
        })
    }

    pub fn verify(&self, presented: &[u8]) -> bool {
        let Ok(mut mac) = <HmacSha256 as Mac>::new_from_slice(&self.key) else {
            return false;
        };
        mac.update(presented);
        mac.verify_slice(&self.expected).is_ok()
    }
}

impl fmt::Debug for TrustSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TrustSecret(<redacted>)")
    }
}

/// Anonymous allow-list.
///
/// Entries ending in `/**` match the prefix itself and anything below
/// it; every other entry matches exactly.
#[derive(Debug, Clone, Default)]
pub struct AnonymousPaths {
    exact: HashSet<String>,
    prefixes: Vec<String>,
}

impl AnonymousPaths {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut paths = Self::default();
        for entry in entries {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                continue;
            }
            match entry.strip_suffix("/**") {
                Some(prefix) => paths.prefixes.push(prefix.to_string()),
                None => {
                    paths.exact.insert(entry.to_string());
                }
            }
        }
        paths
    }

    pub fn matches(&self, path: &str) -> bool {
        if self.exact.contains(path) {
            return true;
        }
        self.prefixes.iter().any(|prefix| {
            path == prefix
                || path
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

/// Edge settings derived from [`Config`].
#[derive(Debug, Clone)]
pub struct EdgeConfig {
    pub auth_header: HeaderName,
    pub token_prefix: String,
    pub anonymous: AnonymousPaths,
    pub trust_flag_header: HeaderName,
    pub trust_service_header: HeaderName,
    pub service_name: String,
    pub trust_secret: Option<TrustSecret>,
    pub session_ttl: Duration,
    pub sliding: bool,
}

impl EdgeConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            auth_header: config.auth_header.clone(),
            token_prefix: config.token_prefix.clone(),
            anonymous: AnonymousPaths::new(&config.anonymous_paths),
            trust_flag_header: config.trust_flag_header.clone(),
            trust_service_header: config.trust_service_header.clone(),
            service_name: config.service_name.clone(),
            trust_secret: config.trust_secret.as_deref().and_then(TrustSecret::new),
            session_ttl: config.session_ttl,
            sliding: config.session_sliding,
        }
    }

    /// Flag header equals `true` (any case), the service header is
    /// non-empty and the secret header matches the configured secret.
    pub fn is_trusted(&self, headers: &HeaderMap) -> bool {
        let Some(secret) = &self.trust_secret else {
            return false;
        };
        let presented = headers
            .get(TRUST_SECRET_HEADER)
            .is_some_and(|v| secret.verify(v.as_bytes()));
        let flag = headers
            .get(&self.trust_flag_header)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));
        let service = headers
            .get(&self.trust_service_header)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| !v.trim().is_empty());
        flag && service && presented
    }

    /// Extract the bearer token. `None` on a missing header, wrong prefix
    /// or empty token.
    pub fn bearer_token<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        let value = headers.get(&self.auth_header)?.to_str().ok()?.trim();
        let token = if self.token_prefix.is_empty() {
            value
        } else {
            let (scheme, rest) = value.split_at_checked(self.token_prefix.len())?;
            if !scheme.eq_ignore_ascii_case(&self.token_prefix) || !rest.starts_with(' ') {
                return None;
            }
            rest.trim()
        };
        (!token.is_empty()).then_some(token)
    }

    /// Remove identity and trust headers a client may have forged.
    pub fn strip_identity(&self, headers: &mut HeaderMap) {
        headers.remove(PRINCIPAL_ID_HEADER);
        headers.remove(PRINCIPAL_NAME_HEADER);
        headers.remove(&self.trust_flag_header);
        headers.remove(&self.trust_service_header);
        headers.remove(TRUST_SECRET_HEADER);
    }

    /// Write the trust marker and principal headers.
    pub fn inject_identity(&self, headers: &mut HeaderMap, user: &AuthenticatedUser) {
        headers.insert(self.trust_flag_header.clone(), HeaderValue::from_static("true"));
        if let Ok(service) = HeaderValue::from_str(&self.service_name) {
            headers.insert(self.trust_service_header.clone(), service);
        }
        headers.insert(PRINCIPAL_ID_HEADER, HeaderValue::from(user.principal_id));
        if let Ok(name) = HeaderValue::from_str(&encode_header_value(&user.username)) {
            headers.insert(PRINCIPAL_NAME_HEADER, name);
        }
    }
}

/// Percent-encode a value for transport in a header.
pub fn encode_header_value(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Reverse of [`encode_header_value`].
pub fn decode_header_value(value: &str) -> String {
    url::form_urlencoded::parse(value.as_bytes())
        .next()
        .map(|(decoded, _)| decoded.into_owned())
        .unwrap_or_default()
}

/// Edge authentication middleware.
pub async fn edge_authenticate(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let edge = &state.edge;

    if edge.is_trusted(request.headers()) {
        request.headers_mut().remove(TRUST_SECRET_HEADER);
        return next.run(request).await;
    }

    if edge.anonymous.matches(request.uri().path()) {
        edge.strip_identity(request.headers_mut());
        return next.run(request).await;
    }

    match authenticate_request(&state, request.headers()).await {
        Ok(user) => {
            edge.strip_identity(request.headers_mut());
            edge.inject_identity(request.headers_mut(), &user);

            if edge.sliding {
                if let Err(e) = state.sessions.renew(user.principal_id, edge.session_ttl).await {
                    tracing::warn!(principal_id = user.principal_id, error = %e, "Session renewal failed");
                }
            }

            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => {
            tracing::warn!(
                path = %request.uri().path(),
                error_code = e.error_code(),
                "Edge rejected request"
            );
            e.into_response()
        }
    }
}

async fn authenticate_request(state: &AppState, headers: &HeaderMap) -> Result<AuthenticatedUser, AuthError> {
    let token = state.edge.bearer_token(headers).ok_or(AuthError::MissingToken)?;

    let verified = state.codec.verify(token).map_err(|e| {
        tracing::debug!(reason = %e, "Token verification failed");
        AuthError::from(e)
    })?;

    match state.sessions.status(verified.principal_id, token).await? {
        SessionStatus::Live => Ok(AuthenticatedUser::new(verified.principal_id, verified.username)),
        SessionStatus::Absent => Err(AuthError::SessionSuperseded(SessionLapse::Absent)),
        SessionStatus::Replaced => Err(AuthError::SessionSuperseded(SessionLapse::Replaced)),
    }
}
