// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Credential authentication and login orchestration.
//!
//! ## Strategies
//!
//! - `Password` - username/password checked against the credential store
//! - `Token` - bearer token checked by the codec, then the account is
//!   re-read so a since-disabled account cannot authenticate
//!
//! Strategies are evaluated with an at-least-one-successful policy.
//! Each credential kind is supported by exactly one strategy today, so
//! in practice only the matching strategy runs.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use utoipa::ToSchema;

use super::credentials::{CredentialStore, Principal, PrincipalStatus, StoreResult};
use super::error::AuthError;
use super::session::SessionRegistry;
use super::token::TokenCodec;
use super::AuthenticatedUser;
use crate::storage::KeyLock;

/// Credentials presented by a caller.
#[derive(Clone)]
pub enum Credentials {
    Password { username: String, password: String },
    Bearer { token: String },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .finish_non_exhaustive(),
            Credentials::Bearer { .. } => f.debug_struct("Bearer").finish_non_exhaustive(),
        }
    }
}

/// Authentication strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Password,
    Token,
}

impl Strategy {
    fn supports(self, credentials: &Credentials) -> bool {
        matches!(
            (self, credentials),
            (Strategy::Password, Credentials::Password { .. })
                | (Strategy::Token, Credentials::Bearer { .. })
        )
    }
}

/// Tunables for the authenticator.
#[derive(Debug, Clone)]
pub struct AuthenticatorSettings {
    /// Failed logins before the account is locked.
    pub max_failed_logins: u32,
    /// Lifetime embedded in issued tokens.
    pub token_ttl: Duration,
    /// TTL of the session record.
    pub session_ttl: Duration,
    /// Deadline for each credential store call.
    pub store_timeout: Duration,
    /// Token type echoed back to clients (the header prefix).
    pub token_type: String,
}

/// Result of a successful login.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LoginSession {
    /// Bearer token to present on subsequent requests.
    pub token: String,
    /// Prefix to use in the authorization header.
    pub token_type: String,
    /// Token expiry (epoch seconds).
    pub expires_at: i64,
    /// Principal ID
    pub principal_id: i64,
}

/// Authenticates credentials and manages login sessions.
pub struct Authenticator {
    store: Arc<dyn CredentialStore>,
    codec: Arc<TokenCodec>,
    sessions: SessionRegistry,
    login_lock: KeyLock,
    settings: AuthenticatorSettings,
    strategies: Vec<Strategy>,
}

impl Authenticator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        codec: Arc<TokenCodec>,
        sessions: SessionRegistry,
        login_lock: KeyLock,
        settings: AuthenticatorSettings,
    ) -> Self {
        Self {
            store,
            codec,
            sessions,
            login_lock,
            settings,
            strategies: vec![Strategy::Password, Strategy::Token],
        }
    }

    pub fn settings(&self) -> &AuthenticatorSettings {
        &self.settings
    }

    /// Authenticate credentials. Succeeds as soon as one applicable
    /// strategy succeeds; otherwise returns the last strategy's error.
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<AuthenticatedUser, AuthError> {
        let mut last_error = None;

        for strategy in self.strategies.iter().copied().filter(|s| s.supports(credentials)) {
            let outcome = match (strategy, credentials) {
                (Strategy::Password, Credentials::Password { username, password }) => {
                    self.authenticate_password(username, password).await
                }
                (Strategy::Token, Credentials::Bearer { token }) => self.authenticate_token(token).await,
                _ => continue,
            };

            match outcome {
                Ok(user) => return Ok(user),
                Err(e) if e.is_dependency_failure() => return Err(e),
                Err(e) => {
                    tracing::debug!(?strategy, error_code = e.error_code(), "Strategy rejected credentials");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(AuthError::BadCredentials))
    }

    async fn authenticate_password(&self, username: &str, password: &str) -> Result<AuthenticatedUser, AuthError> {
        let principal = self
            .store_call(self.store.find_by_username(username))
            .await?
            .ok_or(AuthError::UnknownAccount)?;
        ensure_active(&principal)?;

        if self.store_call(self.store.verify_password(username, password)).await? {
            // Status may have changed while the hash was being checked.
            let current = self
                .store_call(self.store.record_successful_login(username))
                .await?
                .ok_or(AuthError::UnknownAccount)?;
            ensure_active(&current)?;
            return Ok(AuthenticatedUser::new(current.id, current.username));
        }

        let updated = self
            .store_call(
                self.store
                    .record_failed_login(username, self.settings.max_failed_logins),
            )
            .await?;

        match updated {
            Some(p) if p.status == PrincipalStatus::Locked => {
                tracing::warn!(
                    principal_id = p.id,
                    failed_login_count = p.failed_login_count,
                    "Account locked after repeated login failures"
                );
                Err(AuthError::ExcessiveAttempts)
            }
            _ => Err(AuthError::BadCredentials),
        }
    }

    async fn authenticate_token(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let verified = self.codec.verify(token).map_err(|e| {
            tracing::debug!(reason = %e, "Bearer credential rejected by codec");
            AuthError::BadCredentials
        })?;

        let principal = self
            .store_call(self.store.find_by_username(&verified.username))
            .await?
            .ok_or(AuthError::UnknownAccount)?;
        if principal.id != verified.principal_id {
            return Err(AuthError::BadCredentials);
        }
        ensure_active(&principal)?;

        Ok(AuthenticatedUser::new(principal.id, principal.username))
    }

    /// Password login: authenticate, issue a token and register it as the
    /// principal's only live session.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginSession, AuthError> {
        let credentials = Credentials::Password {
            username: username.to_string(),
            password: password.to_string(),
        };
        let user = match self.authenticate(&credentials).await {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!(username, error_code = e.error_code(), "Login failed");
                return Err(e);
            }
        };

        // Serialize issue+register per principal so the last token handed
        // out is the one left in the registry.
        let guard = self
            .login_lock
            .acquire(&format!("login:lock:{}", user.principal_id))
            .await?;

        let registered = self.issue_and_register(&user).await;

        if let Err(e) = self.login_lock.release(guard).await {
            tracing::warn!(principal_id = user.principal_id, error = %e, "Failed to release login lock");
        }

        let session = registered?;
        tracing::info!(principal_id = user.principal_id, username = %user.username, "Login succeeded");
        Ok(session)
    }

    async fn issue_and_register(&self, user: &AuthenticatedUser) -> Result<LoginSession, AuthError> {
        let issued = self
            .codec
            .issue(user.principal_id, &user.username, self.settings.token_ttl)?;
        self.sessions
            .register(user.principal_id, &issued.token, self.settings.session_ttl)
            .await?;

        Ok(LoginSession {
            token: issued.token,
            token_type: self.settings.token_type.clone(),
            expires_at: issued.expires_at,
            principal_id: user.principal_id,
        })
    }

    /// End the principal's session.
    pub async fn logout(&self, principal_id: i64) -> Result<bool, AuthError> {
        Ok(self.sessions.revoke(principal_id).await?)
    }

    async fn store_call<T>(&self, call: impl Future<Output = StoreResult<T>>) -> Result<T, AuthError> {
        match tokio::time::timeout(self.settings.store_timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.settings.store_timeout.as_millis() as u64,
                    "Credential store call timed out"
                );
                Err(AuthError::DependencyTimeout(self.settings.store_timeout))
            }
        }
    }
}

fn ensure_active(principal: &Principal) -> Result<(), AuthError> {
    match principal.status {
        PrincipalStatus::Active => Ok(()),
        PrincipalStatus::Disabled => Err(AuthError::DisabledAccount),
        PrincipalStatus::Locked => Err(AuthError::LockedAccount),
    }
}
