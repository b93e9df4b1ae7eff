//! Tier-1 (`LocalCache`): in-process bounded map with per-entry TTL.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashSet;
use moka::future::Cache;
use moka::Expiry;
use tracing::debug;

use crate::key::{CacheKey, Namespace};
use crate::metrics::MetricsSink;

use super::Tier;

#[derive(Debug, Clone)]
struct Entry {
    bytes: Vec<u8>,
    ttl_write: Duration,
    ttl_access: Option<Duration>,
}

/// Per-entry expiry policy: each entry carries its own write/idle TTL
/// (namespaces are written with different TTLs, e.g. `searchResults` at 1m
/// vs `productById` at 5m), so expiry can't be a single cache-wide setting.
/// `expire_after_read` folds the idle TTL in without ever extending the
/// entry past its absolute write deadline.
struct EntryExpiry;

impl Expiry<String, Entry> for EntryExpiry {
    fn expire_after_create(&self, _key: &String, value: &Entry, _current_time: Instant) -> Option<Duration> {
        Some(value.ttl_write)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _current_time: Instant,
        _current_duration: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl_write)
    }

    fn expire_after_read(
        &self,
        _key: &String,
        value: &Entry,
        current_time: Instant,
        current_duration: Option<Duration>,
        last_modified_at: Instant,
    ) -> Option<Duration> {
        let Some(ttl_access) = value.ttl_access else {
            return current_duration;
        };
        let absolute_remaining = (last_modified_at + value.ttl_write)
            .checked_duration_since(current_time)
            .unwrap_or(Duration::ZERO);
        Some(ttl_access.min(absolute_remaining))
    }
}

/// Configuration for [`LocalCache`].
#[derive(Debug, Clone, Copy)]
pub struct LocalCacheConfig {
    /// Maximum number of entries before moka evicts by capacity (LRU-ish, moka's W-TinyLFU).
    pub max_size: u64,
    /// Default absolute TTL applied on write when a caller doesn't supply a
    /// per-namespace one (raw `LocalCache` use, e.g. in tests).
    pub ttl_write: Duration,
    /// Default idle TTL; `None` disables idle eviction.
    pub ttl_access: Option<Duration>,
}

impl Default for LocalCacheConfig {
    fn default() -> Self {
        Self {
            max_size: 10_000,
            ttl_write: Duration::from_secs(300),
            ttl_access: Some(Duration::from_secs(180)),
        }
    }
}

/// Point-in-time counters for [`LocalCache`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: u64,
}

/// The in-process hot tier. Backed by `moka::future::Cache` with a per-entry
/// [`EntryExpiry`], so each namespace's write/idle TTL is carried on the
/// entry itself rather than configured once for the whole cache; a
/// `DashSet` side-index of live keys per namespace makes
/// [`LocalCache::invalidate_prefix`] O(namespace size) instead of O(total
/// size), since moka has no native prefix scan.
pub struct LocalCache {
    cache: Cache<String, Entry>,
    default_ttl_write: Duration,
    default_ttl_access: Option<Duration>,
    namespace_keys: Arc<DashSet<String>>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    evictions: Arc<AtomicU64>,
    metrics: Arc<dyn MetricsSink>,
}

impl std::fmt::Debug for LocalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCache")
            .field("default_ttl_write", &self.default_ttl_write)
            .field("entry_count", &self.cache.entry_count())
            .finish()
    }
}

impl LocalCache {
    /// Build a `LocalCache` that logs evictions via `TracingMetricsSink`.
    /// Use [`LocalCache::with_metrics`] to route them into a shared sink
    /// instead (what [`crate::builder::CacheSystemBuilder`] does).
    #[must_use]
    pub fn new(config: LocalCacheConfig) -> Self {
        Self::with_metrics(config, Arc::new(crate::metrics::TracingMetricsSink))
    }

    #[must_use]
    pub fn with_metrics(config: LocalCacheConfig, metrics: Arc<dyn MetricsSink>) -> Self {
        let evictions = Arc::new(AtomicU64::new(0));
        let evictions_for_listener = Arc::clone(&evictions);
        let metrics_for_listener = Arc::clone(&metrics);

        let cache = Cache::builder()
            .max_capacity(config.max_size)
            .expire_after(EntryExpiry)
            .eviction_listener(move |_key, _value, _cause| {
                evictions_for_listener.fetch_add(1, Ordering::Relaxed);
                metrics_for_listener.cache_eviction(Tier::L1);
            })
            .build();

        Self {
            cache,
            default_ttl_write: config.ttl_write,
            default_ttl_access: config.ttl_access,
            namespace_keys: Arc::new(DashSet::new()),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            evictions,
            metrics,
        }
    }

    pub async fn get(&self, key: &CacheKey) -> Option<Vec<u8>> {
        let wire = key.wire();
        match self.cache.get(&wire).await {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.bytes)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or overwrite `key` with `bytes`, expiring after `ttl_write`
    /// (and, if `ttl_access` is set, sooner on idle) — both carried on the
    /// entry itself via [`EntryExpiry`].
    pub async fn put(&self, key: &CacheKey, bytes: Vec<u8>, ttl_write: Duration, ttl_access: Option<Duration>) {
        let wire = key.wire();
        self.namespace_keys.insert(wire.clone());
        self.cache
            .insert(
                wire,
                Entry {
                    bytes,
                    ttl_write,
                    ttl_access,
                },
            )
            .await;
    }

    /// [`Self::put`] using this cache's configured default TTLs. Convenience
    /// for callers with no per-namespace policy of their own (raw
    /// `LocalCache` use, tests).
    pub async fn put_default(&self, key: &CacheKey, bytes: Vec<u8>) {
        self.put(key, bytes, self.default_ttl_write, self.default_ttl_access).await;
    }

    pub async fn invalidate(&self, key: &CacheKey) {
        let wire = key.wire();
        self.namespace_keys.remove(&wire);
        self.cache.invalidate(&wire).await;
    }

    /// Remove every tracked key under `namespace`.
    pub async fn invalidate_prefix(&self, namespace: Namespace) {
        let prefix = CacheKey::namespace_prefix(namespace);
        let matching: Vec<String> = self
            .namespace_keys
            .iter()
            .filter(|k| k.starts_with(&prefix))
            .map(|k| k.clone())
            .collect();
        debug!(namespace = %namespace, count = matching.len(), "invalidating local namespace");
        for wire in matching {
            self.namespace_keys.remove(&wire);
            self.cache.invalidate(&wire).await;
        }
    }

    /// Drop every entry, regardless of namespace.
    pub fn invalidate_all(&self) {
        self.namespace_keys.clear();
        self.cache.invalidate_all();
    }

    #[must_use]
    pub fn stats(&self) -> LocalCacheStats {
        LocalCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            size: self.cache.entry_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(ns: Namespace, id: &str) -> CacheKey {
        CacheKey::new(ns, id)
    }

    #[tokio::test]
    async fn put_then_get_hits() {
        let cache = LocalCache::new(LocalCacheConfig::default());
        let k = key(Namespace::ProductById, "1");
        cache.put_default(&k, b"hello".to_vec()).await;
        assert_eq!(cache.get(&k).await, Some(b"hello".to_vec()));
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn miss_on_unknown_key() {
        let cache = LocalCache::new(LocalCacheConfig::default());
        let k = key(Namespace::ProductById, "missing");
        assert_eq!(cache.get(&k).await, None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn invalidate_prefix_only_clears_namespace() {
        let cache = LocalCache::new(LocalCacheConfig::default());
        let a = key(Namespace::Products, "a");
        let b = key(Namespace::Products, "b");
        let other = key(Namespace::Categories, "c");
        cache.put_default(&a, b"1".to_vec()).await;
        cache.put_default(&b, b"2".to_vec()).await;
        cache.put_default(&other, b"3".to_vec()).await;

        cache.invalidate_prefix(Namespace::Products).await;

        assert_eq!(cache.get(&a).await, None);
        assert_eq!(cache.get(&b).await, None);
        assert_eq!(cache.get(&other).await, Some(b"3".to_vec()));
    }

    #[tokio::test]
    async fn invalidate_all_clears_every_namespace() {
        let cache = LocalCache::new(LocalCacheConfig::default());
        let a = key(Namespace::Products, "a");
        let b = key(Namespace::Categories, "c");
        cache.put_default(&a, b"1".to_vec()).await;
        cache.put_default(&b, b"2".to_vec()).await;

        cache.invalidate_all();

        assert_eq!(cache.get(&a).await, None);
        assert_eq!(cache.get(&b).await, None);
    }

    #[tokio::test]
    async fn per_entry_ttl_write_is_respected() {
        let cache = LocalCache::new(LocalCacheConfig::default());
        let short = key(Namespace::SearchResults, "short");
        let long = key(Namespace::ProductById, "long");
        cache.put(&short, b"1".to_vec(), Duration::from_millis(20), None).await;
        cache.put(&long, b"2".to_vec(), Duration::from_secs(60), None).await;

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(cache.get(&short).await, None, "short ttl_write entry must have expired");
        assert_eq!(cache.get(&long).await, Some(b"2".to_vec()), "long ttl_write entry must still be live");
    }

    #[tokio::test]
    async fn capacity_eviction_reports_through_metrics_sink() {
        use crate::metrics::AtomicMetricsSink;

        let metrics = Arc::new(AtomicMetricsSink::new());
        let cache = LocalCache::with_metrics(
            LocalCacheConfig {
                max_size: 1,
                ..LocalCacheConfig::default()
            },
            Arc::clone(&metrics) as Arc<dyn crate::metrics::MetricsSink>,
        );

        for i in 0..20u32 {
            let k = key(Namespace::ProductById, &i.to_string());
            cache.put_default(&k, vec![0u8; 8]).await;
        }
        cache.cache.run_pending_tasks().await;

        assert!(
            metrics.evictions_l1.load(Ordering::Relaxed) > 0,
            "capacity eviction under max_size=1 must be reported through the metrics sink"
        );
    }
}
