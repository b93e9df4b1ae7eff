//! `InMemorySharedCache`: a `DashMap`-backed `SharedCacheBackend`.
//!
//! Reference/testing implementation of the shared tier. Lets integration
//! tests and the crate's own test suite exercise `TwoLevel` and
//! `StampedeGuard`'s cluster-wide path without a live Redis; also a worked
//! example for anyone implementing an alternative L2 backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::clock::{Clock, SystemClock};
use crate::error::CacheError;

use super::shared::SharedCacheBackend;

struct Entry {
    bytes: Vec<u8>,
    expires_at: Instant,
}

impl Entry {
    fn remaining(&self, now: Instant) -> Option<Duration> {
        self.expires_at.checked_duration_since(now)
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry").field("len", &self.bytes.len()).finish()
    }
}

/// In-memory stand-in for the shared tier, keyed by the same `namespace::id`
/// wire strings `SharedCacheBackend` callers already use.
///
/// Takes a [`Clock`] (defaulting to [`SystemClock`]) rather than calling
/// `Instant::now()` inline, so tests can drive TTL expiry deterministically
/// with a `ManualClock` instead of sleeping real time.
#[derive(Debug)]
pub struct InMemorySharedCache {
    entries: DashMap<String, Entry>,
    online: AtomicBool,
    clock: Arc<dyn Clock>,
}

impl Default for InMemorySharedCache {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySharedCache {
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            online: AtomicBool::new(true),
            clock,
        }
    }

    /// Simulate a backend outage for degraded-mode tests (S6). Every
    /// subsequent call returns [`CacheError::CacheTierUnavailable`] until
    /// [`InMemorySharedCache::go_online`] is called.
    pub fn go_offline(&self) {
        self.online.store(false, Ordering::SeqCst);
    }

    pub fn go_online(&self) {
        self.online.store(true, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), CacheError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::cache_tier_unavailable(
                super::Tier::L2,
                anyhow::anyhow!("in-memory shared cache is offline"),
            ))
        }
    }
}

#[async_trait]
impl SharedCacheBackend for InMemorySharedCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.check_online()?;
        let now = self.clock.now();
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Ok(Some(entry.bytes.clone())),
            Some(_) => {
                self.entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn get_with_ttl(
        &self,
        key: &str,
    ) -> Result<Option<(Vec<u8>, Option<Duration>)>, CacheError> {
        self.check_online()?;
        let now = self.clock.now();
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                Ok(Some((entry.bytes.clone(), entry.remaining(now))))
            }
            Some(_) => {
                self.entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        self.check_online()?;
        self.entries.insert(
            key.to_string(),
            Entry {
                bytes,
                expires_at: self.clock.now() + ttl,
            },
        );
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        self.check_online()?;
        self.entries.remove(key);
        Ok(())
    }

    async fn invalidate_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        self.check_online()?;
        let matching: Vec<String> = self
            .entries
            .iter()
            .map(|e| e.key().clone())
            .filter(|k| k.starts_with(prefix))
            .collect();
        for k in &matching {
            self.entries.remove(k);
        }
        Ok(matching.len() as u64)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.check_online()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let cache = InMemorySharedCache::new();
        cache
            .put("productById::1", b"data".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        let got = cache.get("productById::1").await.unwrap();
        assert_eq!(got, Some(b"data".to_vec()));
    }

    #[tokio::test]
    async fn offline_backend_errors() {
        let cache = InMemorySharedCache::new();
        cache.go_offline();
        assert!(cache.ping().await.is_err());
        assert!(cache.get("x").await.is_err());
    }

    #[tokio::test]
    async fn invalidate_prefix_removes_only_matching_keys() {
        let cache = InMemorySharedCache::new();
        cache
            .put("products::a", b"1".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        cache
            .put("products::b", b"2".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        cache
            .put("categories::c", b"3".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        let removed = cache.invalidate_prefix("products::").await.unwrap();
        assert_eq!(removed, 2);
        assert!(cache.get("categories::c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn manual_clock_drives_deterministic_expiry() {
        let clock = Arc::new(ManualClock::new());
        let cache = InMemorySharedCache::with_clock(Arc::clone(&clock) as Arc<dyn Clock>);
        cache
            .put("productById::1", b"data".to_vec(), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(cache.get("productById::1").await.unwrap().is_some());

        clock.advance(Duration::from_secs(10));
        assert!(cache.get("productById::1").await.unwrap().is_none());
    }
}
