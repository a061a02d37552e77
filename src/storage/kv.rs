// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key-value store abstraction shared by the session registry, the
//! permission cache and the lock/one-time-code helpers.
//!
//! Every operation touches exactly one key. The only compound operation
//! is [`KvStore::compare_and_delete`], which must be atomic in every
//! backend (a Lua script in Redis, a single critical section in memory).

use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

/// Error type for key-value operations.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("key-value operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("key-value backend error: {0}")]
    Backend(String),

    #[error("stored value for {key} is not valid: {source}")]
    Codec {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for key-value operations.
pub type KvResult<T> = Result<T, KvError>;

/// Single-key operations against a shared cache.
///
/// Values are strings; structured values go through [`get_json`] and
/// [`set_json`].
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a key. Expired keys read as absent.
    async fn get(&self, key: &str) -> KvResult<Option<String>>;

    /// Write a key, replacing any previous value and TTL.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> KvResult<()>;

    /// Write a key only if it is absent. Returns `true` if written.
    async fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> KvResult<bool>;

    /// Reset the TTL of an existing key. Returns `false` if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> KvResult<bool>;

    /// Delete a key. Returns `true` if a live key was removed.
    async fn delete(&self, key: &str) -> KvResult<bool>;

    /// Delete a key only if its current value equals `expected`.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> KvResult<bool>;

    /// Increment an integer key (absent counts as 0) and return the new value.
    async fn incr(&self, key: &str) -> KvResult<i64>;

    /// Round-trip check used by readiness probes.
    async fn ping(&self) -> KvResult<()>;
}

/// Read and deserialize a JSON value.
pub async fn get_json<T: DeserializeOwned>(kv: &dyn KvStore, key: &str) -> KvResult<Option<T>> {
    match kv.get(key).await? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| KvError::Codec {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

/// Serialize and write a JSON value.
pub async fn set_json<T: Serialize + Sync>(
    kv: &dyn KvStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> KvResult<()> {
    let raw = serde_json::to_string(value).map_err(|source| KvError::Codec {
        key: key.to_string(),
        source,
    })?;
    kv.set(key, &raw, ttl).await
}
