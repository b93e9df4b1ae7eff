//! `TwoLevel`: the read-through/write-through composite over C1 and C2.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::backends::{LocalCache, SharedCacheBackend, Tier};
use crate::codec::CacheCodec;
use crate::error::CacheError;
use crate::key::{CacheKey, Namespace};
use crate::metrics::MetricsSink;

/// Which tier satisfied a lookup, or whether it fell through to the origin
/// loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    L1,
    L2,
    Origin,
}

/// The TTL policy a single `get_or_load`/`put` call applies: the namespace's
/// L2 expiry plus the L1 write/idle TTLs used when the value is cached in
/// the fast tier.
///
/// [`Self::effective_l1_write`] enforces "C1's TTL must never exceed C2's
/// TTL" unconditionally, regardless of what's configured for `l1_write` —
/// a longer-lived L1 entry would let a stale value outlive the L2 copy it
/// was backfilled or written alongside, which is exactly the cross-node
/// staleness bound the two-tier design exists to cap.
#[derive(Debug, Clone, Copy)]
pub struct CacheTtl {
    pub l2: Duration,
    pub l1_write: Duration,
    pub l1_access: Option<Duration>,
}

impl CacheTtl {
    #[must_use]
    pub fn new(l2: Duration, l1_write: Duration, l1_access: Option<Duration>) -> Self {
        Self {
            l2,
            l1_write,
            l1_access,
        }
    }

    #[must_use]
    pub fn effective_l1_write(&self) -> Duration {
        self.l1_write.min(self.l2)
    }
}

/// The composite two-level cache: probes L1, then L2, then an
/// origin loader; writes go to L2 then L1; invalidation clears L1 before L2.
pub struct TwoLevel<C: CacheCodec> {
    local: Arc<LocalCache>,
    shared: Arc<dyn SharedCacheBackend>,
    codec: C,
    metrics: Arc<dyn MetricsSink>,
}

impl<C: CacheCodec> TwoLevel<C> {
    pub fn new(
        local: Arc<LocalCache>,
        shared: Arc<dyn SharedCacheBackend>,
        codec: C,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            local,
            shared,
            codec,
            metrics,
        }
    }

    /// Read-through lookup: L1 → L2 (backfilling L1) → `loader`.
    ///
    /// `loader` is only invoked on a full miss; its result is written to L2
    /// with `ttl.l2` and to L1 with `ttl.effective_l1_write()`.
    ///
    /// # Errors
    /// Propagates the loader's error. Tier failures never surface here:
    /// an unavailable L2 degrades to a miss and is logged/metered.
    pub async fn get_or_load<T, F, Fut>(
        &self,
        key: &CacheKey,
        ttl: CacheTtl,
        loader: F,
    ) -> Result<(T, Outcome), CacheError>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CacheError>>,
    {
        if let Some(bytes) = self.local.get(key).await {
            self.metrics.cache_hit(Tier::L1);
            let value = self.codec.decode(&bytes)?;
            return Ok((value, Outcome::L1));
        }

        match self.shared.get_with_ttl(&key.wire()).await {
            Ok(Some((bytes, _remaining_ttl))) => {
                self.metrics.cache_hit(Tier::L2);
                match self.codec.decode::<T>(&bytes) {
                    Ok(value) => {
                        // Backfill never outlives L2: effective_l1_write()
                        // caps the write at ttl.l2 even if this namespace's
                        // configured l1_write is longer.
                        self.local
                            .put(key, bytes, ttl.effective_l1_write(), ttl.l1_access)
                            .await;
                        return Ok((value, Outcome::L2));
                    }
                    Err(e) => {
                        warn!(key = %key, error = %e, "l2 decode failed, treating as miss");
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(key = %key, error = %e, "shared cache unavailable, treating as miss");
            }
        }

        self.metrics.cache_miss();
        let load_start = Instant::now();
        self.metrics.store_query_total();
        let value = loader().await?;
        #[allow(clippy::cast_possible_truncation)]
        self.metrics
            .cache_load_duration(load_start.elapsed().as_millis() as u64);
        self.metrics.cache_load_origin();

        let bytes = self.codec.encode(&value)?;
        if let Err(e) = self.shared.put(&key.wire(), bytes.clone(), ttl.l2).await {
            warn!(key = %key, error = %e, "failed to write shared cache, continuing");
        }
        self.local
            .put(key, bytes, ttl.effective_l1_write(), ttl.l1_access)
            .await;

        Ok((value, Outcome::Origin))
    }

    /// Write-through: encode, write L2 (`ttl.l2`), then L1 (`ttl.effective_l1_write()`).
    ///
    /// # Errors
    /// Returns [`CacheError::CodecError`] if encoding fails.
    pub async fn put<T: serde::Serialize>(&self, key: &CacheKey, value: &T, ttl: CacheTtl) -> Result<(), CacheError> {
        let bytes = self.codec.encode(value)?;
        if let Err(e) = self.shared.put(&key.wire(), bytes.clone(), ttl.l2).await {
            warn!(key = %key, error = %e, "failed to write shared cache during put");
        }
        self.local
            .put(key, bytes, ttl.effective_l1_write(), ttl.l1_access)
            .await;
        Ok(())
    }

    /// Remove a single key from both tiers. L1 first, then L2: a reader
    /// racing the invalidation can't repopulate L1 from an L2 value that
    /// predates the mutation, since L2 is already gone by the time L1 is
    /// cleared.
    pub async fn invalidate(&self, key: &CacheKey) {
        self.local.invalidate(key).await;
        if let Err(e) = self.shared.invalidate(&key.wire()).await {
            warn!(key = %key, error = %e, "shared cache invalidate failed, ttl will converge");
        }
    }

    /// Remove every key under `namespace` from both tiers, L1 first.
    pub async fn invalidate_namespace(&self, namespace: Namespace) {
        self.local.invalidate_prefix(namespace).await;
        let prefix = CacheKey::namespace_prefix(namespace);
        if let Err(e) = self.shared.invalidate_prefix(&prefix).await {
            warn!(namespace = %namespace, error = %e, "shared namespace invalidate failed, ttl will converge");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{InMemorySharedCache, LocalCacheConfig};
    use crate::codec::JsonCodec;
    use crate::metrics::AtomicMetricsSink;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn ttl(secs: u64) -> CacheTtl {
        CacheTtl::new(Duration::from_secs(secs), Duration::from_secs(secs), None)
    }

    fn build() -> TwoLevel<JsonCodec> {
        TwoLevel::new(
            Arc::new(LocalCache::new(LocalCacheConfig::default())),
            Arc::new(InMemorySharedCache::new()),
            JsonCodec,
            Arc::new(AtomicMetricsSink::new()),
        )
    }

    #[tokio::test]
    async fn miss_then_loader_then_hit() {
        let cache = build();
        let key = CacheKey::new(Namespace::ProductById, "1");
        let calls = Arc::new(AtomicU64::new(0));
        let calls_clone = Arc::clone(&calls);

        let (value, outcome) = cache
            .get_or_load(&key, ttl(60), || async move {
                calls_clone.fetch_add(1, Ordering::Relaxed);
                Ok::<_, CacheError>(42u32)
            })
            .await
            .unwrap();
        assert_eq!(value, 42);
        assert_eq!(outcome, Outcome::Origin);

        let (value2, outcome2) = cache
            .get_or_load(&key, ttl(60), || async {
                panic!("loader should not run on hit");
                #[allow(unreachable_code)]
                Ok::<_, CacheError>(0u32)
            })
            .await
            .unwrap();
        assert_eq!(value2, 42);
        assert_eq!(outcome2, Outcome::L1);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn l2_hit_backfills_l1() {
        let cache = build();
        let key = CacheKey::new(Namespace::ProductById, "7");
        cache.put(&key, &"seeded".to_string(), ttl(60)).await.unwrap();

        cache.local.invalidate(&key).await;
        assert!(cache.local.get(&key).await.is_none());

        let (value, outcome): (String, Outcome) = cache
            .get_or_load(&key, ttl(60), || async {
                panic!("loader should not run, value lives in l2");
                #[allow(unreachable_code)]
                Ok::<_, CacheError>(String::new())
            })
            .await
            .unwrap();
        assert_eq!(value, "seeded");
        assert_eq!(outcome, Outcome::L2);
        assert!(cache.local.get(&key).await.is_some());
    }

    #[tokio::test]
    async fn invalidate_clears_both_tiers() {
        let cache = build();
        let key = CacheKey::new(Namespace::ProductById, "9");
        cache.put(&key, &"v".to_string(), ttl(60)).await.unwrap();
        cache.invalidate(&key).await;
        assert!(cache.local.get(&key).await.is_none());
        assert!(cache.shared.get(&key.wire()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn l1_write_ttl_is_capped_at_l2_ttl() {
        let cache = build();
        let key = CacheKey::new(Namespace::PriceRange, "price:0-100");
        let generous_l1_but_short_l2 = CacheTtl::new(Duration::from_secs(3), Duration::from_secs(300), None);
        assert_eq!(generous_l1_but_short_l2.effective_l1_write(), Duration::from_secs(3));

        cache
            .put(&key, &"v".to_string(), generous_l1_but_short_l2)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        // Not expired yet at 50ms against a 3s cap; this only proves the cap
        // was applied to the write, not the literal 300s config value.
        assert!(cache.local.get(&key).await.is_some());
    }
}
