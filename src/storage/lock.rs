// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Owner-token locks on top of [`KvStore`].
//!
//! A lock is a key holding a random owner token with a lease TTL.
//! Release goes through `compare_and_delete`, so a holder whose lease
//! already expired cannot release a lock someone else now owns.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use super::kv::{KvError, KvResult, KvStore};

/// Default lease for a held lock.
const DEFAULT_LEASE: Duration = Duration::from_secs(10);

/// Default pause between acquisition attempts.
const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// A held lock. Must be passed back to [`KeyLock::release`].
#[derive(Debug)]
pub struct LockGuard {
    key: String,
    owner: String,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Lock manager for resource keys.
#[derive(Clone)]
pub struct KeyLock {
    kv: Arc<dyn KvStore>,
    lease: Duration,
    retry_interval: Duration,
    max_wait: Duration,
}

impl KeyLock {
    /// Create a lock manager that waits at most `max_wait` to acquire.
    pub fn new(kv: Arc<dyn KvStore>, max_wait: Duration) -> Self {
        Self {
            kv,
            lease: DEFAULT_LEASE,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            max_wait,
        }
    }

    /// Override the lease TTL.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Try once. Returns `None` if another owner holds the key.
    pub async fn try_acquire(&self, key: &str) -> KvResult<Option<LockGuard>> {
        let owner = Uuid::new_v4().to_string();
        if self.kv.set_nx(key, &owner, Some(self.lease)).await? {
            Ok(Some(LockGuard {
                key: key.to_string(),
                owner,
            }))
        } else {
            Ok(None)
        }
    }

    /// Retry until acquired or `max_wait` elapses.
    pub async fn acquire(&self, key: &str) -> KvResult<LockGuard> {
        let deadline = tokio::time::Instant::now() + self.max_wait;
        loop {
            if let Some(guard) = self.try_acquire(key).await? {
                return Ok(guard);
            }
            if tokio::time::Instant::now() + self.retry_interval > deadline {
                tracing::warn!(key, "Gave up waiting for lock");
                return Err(KvError::Timeout(self.max_wait));
            }
            tokio::time::sleep(self.retry_interval).await;
        }
    }

    /// Release a held lock. Returns `false` if the lease had already lapsed
    /// and the key belongs to someone else (or nobody).
    pub async fn release(&self, guard: LockGuard) -> KvResult<bool> {
        let released = self.kv.compare_and_delete(&guard.key, &guard.owner).await?;
        if !released {
            tracing::warn!(key = %guard.key, "Lock lease lapsed before release");
        }
        Ok(released)
    }
}
