// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process LRU backend for [`KvStore`].
//!
//! Each entry carries its own optional deadline. Expired entries are
//! dropped lazily on access. When the cache is full the least recently
//! used entry is evicted, so capacity must cover every live session.
//! Evicting a live entry logs a warning and bumps [`MemoryKv::evictions`].

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use tokio::time::Instant;

use super::kv::{KvError, KvResult, KvStore};

/// Cached value + optional expiry deadline.
struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: &str, ttl: Option<Duration>) -> Self {
        Self {
            value: value.to_string(),
            expires_at: ttl.and_then(deadline),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at
            .map(|deadline| Instant::now() >= deadline)
            .unwrap_or(false)
    }
}

/// `now + ttl`, or no deadline when that is past the clock's range.
fn deadline(ttl: Duration) -> Option<Instant> {
    Instant::now().checked_add(ttl)
}

/// In-process key-value store.
pub struct MemoryKv {
    cache: Mutex<LruCache<String, CacheEntry>>,
    evictions: AtomicU64,
}

impl MemoryKv {
    /// Create a new store holding at most `capacity` keys.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            evictions: AtomicU64::new(0),
        }
    }

    /// Live entries dropped to make room since startup.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    fn insert(&self, cache: &mut LruCache<String, CacheEntry>, key: &str, entry: CacheEntry) {
        if let Some((evicted, old)) = cache.push(key.to_string(), entry) {
            if evicted != key && !old.is_expired() {
                let total = self.evictions.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    key = %evicted,
                    capacity = cache.cap().get(),
                    total_evictions = total,
                    "Cache full, evicted live entry; raise CACHE_CAPACITY"
                );
            }
        }
    }

    fn lock(&self) -> KvResult<MutexGuard<'_, LruCache<String, CacheEntry>>> {
        self.cache
            .lock()
            .map_err(|_| KvError::Backend("cache lock poisoned".to_string()))
    }
}

/// Look up a live entry, dropping it if expired.
fn live_entry<'a>(
    cache: &'a mut LruCache<String, CacheEntry>,
    key: &str,
) -> Option<&'a mut CacheEntry> {
    if cache.peek(key).is_some_and(CacheEntry::is_expired) {
        cache.pop(key);
        return None;
    }
    cache.get_mut(key)
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        let mut cache = self.lock()?;
        Ok(live_entry(&mut cache, key).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> KvResult<()> {
        let mut cache = self.lock()?;
        self.insert(&mut cache, key, CacheEntry::new(value, ttl));
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> KvResult<bool> {
        let mut cache = self.lock()?;
        if live_entry(&mut cache, key).is_some() {
            return Ok(false);
        }
        self.insert(&mut cache, key, CacheEntry::new(value, ttl));
        Ok(true)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> KvResult<bool> {
        let mut cache = self.lock()?;
        match live_entry(&mut cache, key) {
            Some(entry) => {
                entry.expires_at = deadline(ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> KvResult<bool> {
        let mut cache = self.lock()?;
        Ok(cache
            .pop(key)
            .is_some_and(|entry| !entry.is_expired()))
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> KvResult<bool> {
        let mut cache = self.lock()?;
        let matches = live_entry(&mut cache, key).is_some_and(|entry| entry.value == expected);
        if matches {
            cache.pop(key);
        }
        Ok(matches)
    }

    async fn incr(&self, key: &str) -> KvResult<i64> {
        let mut cache = self.lock()?;
        match live_entry(&mut cache, key) {
            Some(entry) => {
                let current: i64 = entry.value.parse().map_err(|_| {
                    KvError::Backend(format!("value at {key} is not an integer"))
                })?;
                let next = current
                    .checked_add(1)
                    .ok_or_else(|| KvError::Backend(format!("counter at {key} overflowed")))?;
                entry.value = next.to_string();
                Ok(next)
            }
            None => {
                self.insert(&mut cache, key, CacheEntry::new("1", None));
                Ok(1)
            }
        }
    }

    async fn ping(&self) -> KvResult<()> {
        self.lock().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_and_get() {
        let kv = MemoryKv::new(10);
        assert!(kv.get("k").await.unwrap().is_none());

        kv.set("k", "v", None).await.unwrap();
        assert_eq!(kv.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_expiry() {
        let kv = MemoryKv::new(10);
        kv.set("k", "v", Some(Duration::from_secs(5))).await.unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(kv.get("k").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(kv.get("k").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn expire_extends_deadline_without_touching_value() {
        let kv = MemoryKv::new(10);
        kv.set("k", "v", Some(Duration::from_secs(5))).await.unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(kv.expire("k", Duration::from_secs(5)).await.unwrap());

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(kv.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(!kv.expire("missing", Duration::from_secs(5)).await.unwrap());
    }

    #[tokio::test]
    async fn set_nx_only_writes_absent_keys() {
        let kv = MemoryKv::new(10);
        assert!(kv.set_nx("k", "a", None).await.unwrap());
        assert!(!kv.set_nx("k", "b", None).await.unwrap());
        assert_eq!(kv.get("k").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn set_nx_replaces_expired_keys() {
        let kv = MemoryKv::new(10);
        kv.set("k", "a", Some(Duration::from_secs(1))).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(kv.set_nx("k", "b", None).await.unwrap());
    }

    #[tokio::test]
    async fn compare_and_delete_checks_owner() {
        let kv = MemoryKv::new(10);
        kv.set("lock", "owner-a", None).await.unwrap();

        assert!(!kv.compare_and_delete("lock", "owner-b").await.unwrap());
        assert!(kv.get("lock").await.unwrap().is_some());

        assert!(kv.compare_and_delete("lock", "owner-a").await.unwrap());
        assert!(kv.get("lock").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn incr_counts_from_zero() {
        let kv = MemoryKv::new(10);
        assert_eq!(kv.incr("gen").await.unwrap(), 1);
        assert_eq!(kv.incr("gen").await.unwrap(), 2);

        kv.set("text", "abc", None).await.unwrap();
        assert!(matches!(kv.incr("text").await, Err(KvError::Backend(_))));
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let kv = MemoryKv::new(10);
        kv.set("k", "v", None).await.unwrap();
        assert!(kv.delete("k").await.unwrap());
        assert!(!kv.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn least_recently_used_key_is_evicted() {
        let kv = MemoryKv::new(2);
        kv.set("a", "1", None).await.unwrap();
        kv.set("b", "2", None).await.unwrap();
        kv.get("a").await.unwrap();
        kv.set("c", "3", None).await.unwrap();

        assert!(kv.get("a").await.unwrap().is_some());
        assert!(kv.get("b").await.unwrap().is_none());
        assert_eq!(kv.evictions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn overwrites_and_expired_victims_are_not_evictions() {
        let kv = MemoryKv::new(1);
        kv.set("a", "1", Some(Duration::from_secs(1))).await.unwrap();
        kv.set("a", "2", Some(Duration::from_secs(1))).await.unwrap();
        assert_eq!(kv.evictions(), 0);

        tokio::time::advance(Duration::from_secs(2)).await;
        kv.set("b", "1", None).await.unwrap();
        assert_eq!(kv.evictions(), 0);
    }

    #[tokio::test]
    async fn huge_ttl_does_not_panic() {
        let kv = MemoryKv::new(10);
        kv.set("k", "v", Some(Duration::from_secs(u64::MAX))).await.unwrap();
        assert!(kv.expire("k", Duration::MAX).await.unwrap());
        assert_eq!(kv.get("k").await.unwrap().as_deref(), Some("v"));
    }
}
