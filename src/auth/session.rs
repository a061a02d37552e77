// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Single-active-session registry.
//!
//! One record per principal holds the only token currently considered
//! live. Registering a new token overwrites the record, which is how a
//! later login evicts an earlier one; revoking deletes it, which is how
//! logout takes effect before the token's own expiry.

use std::sync::Arc;
use std::time::Duration;

use crate::storage::{KvResult, KvStore};

/// Registry verdict for a presented token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// The presented token is the registered one.
    Live,
    /// No record (logged out, or expired in storage).
    Absent,
    /// A different token is registered.
    Replaced,
}

/// Cache-backed registry of live tokens.
#[derive(Clone)]
pub struct SessionRegistry {
    kv: Arc<dyn KvStore>,
}

impl SessionRegistry {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    fn key(principal_id: i64) -> String {
        format!("session:{principal_id}")
    }

    /// Record `token` as the principal's only live token.
    pub async fn register(&self, principal_id: i64, token: &str, ttl: Duration) -> KvResult<()> {
        self.kv.set(&Self::key(principal_id), token, Some(ttl)).await?;
        tracing::debug!(principal_id, ttl_secs = ttl.as_secs(), "Session registered");
        Ok(())
    }

    /// Classify a presented token against the registered one.
    pub async fn status(&self, principal_id: i64, token: &str) -> KvResult<SessionStatus> {
        Ok(match self.kv.get(&Self::key(principal_id)).await? {
            Some(current) if current.as_bytes() == token.as_bytes() => SessionStatus::Live,
            Some(_) => SessionStatus::Replaced,
            None => SessionStatus::Absent,
        })
    }

    /// Whether `token` is the principal's live token.
    pub async fn is_live(&self, principal_id: i64, token: &str) -> KvResult<bool> {
        Ok(self.status(principal_id, token).await? == SessionStatus::Live)
    }

    /// Drop the principal's session. Returns `true` if one existed.
    pub async fn revoke(&self, principal_id: i64) -> KvResult<bool> {
        let existed = self.kv.delete(&Self::key(principal_id)).await?;
        tracing::info!(principal_id, existed, "Session revoked");
        Ok(existed)
    }

    /// Extend the session TTL without touching the stored token.
    pub async fn renew(&self, principal_id: i64, ttl: Duration) -> KvResult<bool> {
        self.kv.expire(&Self::key(principal_id), ttl).await
    }
}
