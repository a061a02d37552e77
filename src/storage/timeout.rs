// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Deadline decorator for [`KvStore`] backends.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::kv::{KvError, KvResult, KvStore};

/// Wraps a backend so every call fails with [`KvError::Timeout`] once the
/// deadline elapses instead of blocking the request.
pub struct TimeoutKv {
    inner: Arc<dyn KvStore>,
    timeout: Duration,
}

impl TimeoutKv {
    pub fn new(inner: Arc<dyn KvStore>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T>(&self, op: &'static str, fut: impl Future<Output = KvResult<T>>) -> KvResult<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(op, timeout_ms = self.timeout.as_millis() as u64, "Key-value call timed out");
                Err(KvError::Timeout(self.timeout))
            }
        }
    }
}

#[async_trait]
impl KvStore for TimeoutKv {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        self.bounded("get", self.inner.get(key)).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> KvResult<()> {
        self.bounded("set", self.inner.set(key, value, ttl)).await
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> KvResult<bool> {
        self.bounded("set_nx", self.inner.set_nx(key, value, ttl)).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> KvResult<bool> {
        self.bounded("expire", self.inner.expire(key, ttl)).await
    }

    async fn delete(&self, key: &str) -> KvResult<bool> {
        self.bounded("delete", self.inner.delete(key)).await
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> KvResult<bool> {
        self.bounded("compare_and_delete", self.inner.compare_and_delete(key, expected))
            .await
    }

    async fn incr(&self, key: &str) -> KvResult<i64> {
        self.bounded("incr", self.inner.incr(key)).await
    }

    async fn ping(&self) -> KvResult<()> {
        self.bounded("ping", self.inner.ping()).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::storage::MemoryKv;

    /// Backend whose every call hangs, for exercising timeout paths.
    pub(crate) struct StalledKv;

    #[async_trait]
    impl KvStore for StalledKv {
        async fn get(&self, _key: &str) -> KvResult<Option<String>> {
            std::future::pending().await
        }
        async fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> KvResult<()> {
            std::future::pending().await
        }
        async fn set_nx(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> KvResult<bool> {
            std::future::pending().await
        }
        async fn expire(&self, _key: &str, _ttl: Duration) -> KvResult<bool> {
            std::future::pending().await
        }
        async fn delete(&self, _key: &str) -> KvResult<bool> {
            std::future::pending().await
        }
        async fn compare_and_delete(&self, _key: &str, _expected: &str) -> KvResult<bool> {
            std::future::pending().await
        }
        async fn incr(&self, _key: &str) -> KvResult<i64> {
            std::future::pending().await
        }
        async fn ping(&self) -> KvResult<()> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_backend_times_out() {
        let kv = TimeoutKv::new(Arc::new(StalledKv), Duration::from_millis(50));
        assert!(matches!(kv.get("k").await, Err(KvError::Timeout(_))));
        assert!(matches!(kv.ping().await, Err(KvError::Timeout(_))));
    }

    #[tokio::test]
    async fn healthy_backend_passes_through() {
        let kv = TimeoutKv::new(Arc::new(MemoryKv::new(10)), Duration::from_secs(1));
        kv.set("k", "v", None).await.unwrap();
        assert_eq!(kv.get("k").await.unwrap().as_deref(), Some("v"));
    }
}
