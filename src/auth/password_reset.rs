// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Password reset via one-time email codes.
//!
//! ## Flow
//!
//! 1. `request_code(email)` generates a 6-digit code, stores its keyed
//!    digest at `pwd:code:{email}` with a TTL and hands the plaintext to
//!    the [`Mailer`]. Unknown addresses are accepted silently.
//! 2. `reset(email, code, new_password)` consumes the digest with
//!    `compare_and_delete`, so a code works at most once and a wrong
//!    guess leaves the real code in place. On success the password is
//!    replaced and the account's live session is revoked.
//!
//! Wrong guesses are counted at `pwd:attempts:{email}` for the life of
//! the code. Once `max_attempts` is reached the code is discarded and a
//! new one has to be requested.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use hmac::{Hmac, Mac};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::Sha256;

use super::credentials::{CredentialStore, StoreResult};
use super::error::AuthError;
use super::session::SessionRegistry;
use crate::storage::KvStore;

type HmacSha256 = Hmac<Sha256>;

const CODE_DIGITS: u32 = 6;
const KEY_CONTEXT: &[u8] = b"relational-gatekeeper/password-reset-code";

/// Delivery failure.
#[derive(Debug, thiserror::Error)]
#[error("mail delivery failed: {0}")]
pub struct MailError(pub String);

/// Outbound delivery of reset codes.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_reset_code(&self, email: &str, code: &str, valid_for: Duration) -> Result<(), MailError>;
}

/// Mailer that only logs the send. The code itself is never logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_reset_code(&self, email: &str, _code: &str, valid_for: Duration) -> Result<(), MailError> {
        tracing::info!(email, valid_for_secs = valid_for.as_secs(), "Password reset code dispatched");
        Ok(())
    }
}

/// Reset code lifetime and guess limits.
#[derive(Debug, Clone)]
pub struct ResetSettings {
    pub code_ttl: Duration,
    /// Wrong guesses tolerated before the outstanding code is discarded.
    pub max_attempts: u32,
    pub store_timeout: Duration,
}

/// One-time code issuance and redemption.
pub struct PasswordReset {
    kv: Arc<dyn KvStore>,
    store: Arc<dyn CredentialStore>,
    sessions: SessionRegistry,
    mailer: Arc<dyn Mailer>,
    digest_key: Vec<u8>,
    settings: ResetSettings,
    rng: SystemRandom,
}

impl PasswordReset {
    /// `secret` is the service secret; a dedicated digest key is derived from it.
    pub fn new(
        kv: Arc<dyn KvStore>,
        store: Arc<dyn CredentialStore>,
        sessions: SessionRegistry,
        mailer: Arc<dyn Mailer>,
        secret: &[u8],
        settings: ResetSettings,
    ) -> Result<Self, AuthError> {
        let digest_key = hmac_sha256(secret, &[KEY_CONTEXT])?;
        Ok(Self {
            kv,
            store,
            sessions,
            mailer,
            digest_key,
            settings,
            rng: SystemRandom::new(),
        })
    }

    fn key(email: &str) -> String {
        format!("pwd:code:{email}")
    }

    fn attempts_key(email: &str) -> String {
        format!("pwd:attempts:{email}")
    }

    /// Issue a code for `email` and send it. A newer code replaces any
    /// outstanding one.
    pub async fn request_code(&self, email: &str) -> Result<(), AuthError> {
        let email = email.trim().to_lowercase();
        if self.store_call(self.store.find_by_email(&email)).await?.is_none() {
            tracing::debug!(email = %email, "Reset code requested for unknown address");
            return Ok(());
        }

        let code = self.generate_code()?;
        let digest = self.digest(&email, &code)?;
        let ttl = self.settings.code_ttl;
        self.kv.set(&Self::key(&email), &digest, Some(ttl)).await?;
        self.kv.delete(&Self::attempts_key(&email)).await?;

        self.mailer
            .send_reset_code(&email, &code, ttl)
            .await
            .map_err(|e| AuthError::DependencyUnavailable(e.to_string()))?;
        Ok(())
    }

    /// Redeem a code and set a new password.
    pub async fn reset(&self, email: &str, code: &str, new_password: &str) -> Result<(), AuthError> {
        let email = email.trim().to_lowercase();
        let digest = self.digest(&email, code.trim())?;

        if !self.kv.compare_and_delete(&Self::key(&email), &digest).await? {
            tracing::warn!(email = %email, "Password reset with invalid or expired code");
            self.record_wrong_guess(&email).await?;
            return Err(AuthError::InvalidResetCode);
        }
        self.kv.delete(&Self::attempts_key(&email)).await?;

        if !self
            .store_call(self.store.update_password_by_email(&email, new_password))
            .await?
        {
            return Err(AuthError::InvalidResetCode);
        }

        if let Some(principal) = self.store_call(self.store.find_by_email(&email)).await? {
            self.sessions.revoke(principal.id).await?;
            tracing::info!(principal_id = principal.id, "Password reset completed");
        }
        Ok(())
    }

    async fn record_wrong_guess(&self, email: &str) -> Result<(), AuthError> {
        let attempts_key = Self::attempts_key(email);
        let attempts = self.kv.incr(&attempts_key).await?;
        if attempts == 1 {
            self.kv.expire(&attempts_key, self.settings.code_ttl).await?;
        }

        if attempts >= i64::from(self.settings.max_attempts) {
            let discarded = self.kv.delete(&Self::key(email)).await?;
            self.kv.delete(&attempts_key).await?;
            tracing::warn!(email = %email, attempts, discarded, "Reset code discarded after repeated wrong guesses");
        }
        Ok(())
    }

    fn generate_code(&self) -> Result<String, AuthError> {
        let mut buf = [0u8; 4];
        self.rng
            .fill(&mut buf)
            .map_err(|_| AuthError::Internal("system RNG failure".to_string()))?;
        let n = u32::from_be_bytes(buf) % 10u32.pow(CODE_DIGITS);
        Ok(format!("{n:06}"))
    }

    fn digest(&self, email: &str, code: &str) -> Result<String, AuthError> {
        let mac = hmac_sha256(&self.digest_key, &[email.as_bytes(), b"\0", code.as_bytes()])?;
        Ok(Base64::encode_string(&mac))
    }

    async fn store_call<T>(&self, call: impl Future<Output = StoreResult<T>>) -> Result<T, AuthError> {
        let timeout = self.settings.store_timeout;
        tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| AuthError::DependencyTimeout(timeout))?
            .map_err(AuthError::from)
    }
}

fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> Result<Vec<u8>, AuthError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| AuthError::Internal(format!("HMAC key rejected: {e}")))?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac.finalize().into_bytes().to_vec())
}
