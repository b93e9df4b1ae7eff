//! `StampedeGuard`: at-most-one concurrent loader per key, cluster-wide.
//!
//! Two layers: an in-process `DashMap<String, Arc<tokio::sync::Mutex<()>>>`
//! collapses concurrent callers within one process (no network round trip
//! for the common case), and a cluster-wide Redis lock (`SET NX PX` plus a
//! Lua compare-and-delete release) extends that guarantee across processes.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rand::Rng;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::metrics::{LockOutcome, MetricsSink};

/// Configuration for [`StampedeGuard`].
#[derive(Debug, Clone, Copy)]
pub struct LockConfig {
    /// How long a caller waits to acquire before falling through unprotected.
    pub wait_timeout: Duration,
    /// Server-side TTL on the cluster-wide lock; bounds a stuck holder.
    pub lease_timeout: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_secs(5),
            lease_timeout: Duration::from_secs(10),
        }
    }
}

/// A cluster-wide, holder-conditional lock store. `StampedeGuard` is generic
/// over this so tests can exercise singleflight without a live Redis.
#[async_trait::async_trait]
pub trait ClusterLock: Send + Sync + std::fmt::Debug {
    /// Attempt to set `key` to `holder` with expiry `lease`, only if unset.
    /// Returns `true` if acquired.
    async fn try_acquire(&self, key: &str, holder: &str, lease: Duration) -> bool;

    /// Release `key` only if its current value equals `holder` (conditional
    /// delete, implemented server-side as a Lua compare-and-delete script
    /// against a real store, the standard way to avoid a slow holder's
    /// late release evicting a fresh acquirer's lock).
    async fn release(&self, key: &str, holder: &str);
}

/// Lock acquisition failed within `wait_timeout`.
#[derive(Debug, thiserror::Error)]
#[error("lock acquisition timed out")]
pub struct LockTimeoutError;

struct ReleaseGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    lock: &'a dyn ClusterLock,
    key: String,
    holder: String,
    released: bool,
}

impl<'a> ReleaseGuard<'a> {
    async fn release_cluster(&mut self) {
        if !self.released {
            self.lock.release(&self.key, &self.holder).await;
            self.released = true;
        }
    }
}

impl<'a> Drop for ReleaseGuard<'a> {
    fn drop(&mut self) {
        if !self.released {
            // Best-effort: dropped outside an async context (cancellation),
            // so the server-side lease is the real backstop here. The
            // in-process mutex guard drops unconditionally via `self.guard`.
            warn!(key = %self.key, "stampede guard dropped without explicit release, relying on lease expiry");
        }
        drop(self.guard.take());
    }
}

/// Coordinates at-most-one concurrent loader per key.
pub struct StampedeGuard {
    in_process: DashMap<String, Arc<AsyncMutex<()>>>,
    cluster: Arc<dyn ClusterLock>,
    config: LockConfig,
    metrics: Arc<dyn MetricsSink>,
}

impl StampedeGuard {
    pub fn new(cluster: Arc<dyn ClusterLock>, config: LockConfig, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            in_process: DashMap::new(),
            cluster,
            config,
            metrics,
        }
    }

    fn mutex_for(&self, key: &str) -> Arc<AsyncMutex<()>> {
        Arc::clone(
            self.in_process
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }

    /// Drop the in-process entry for `key` once nobody else holds a clone of
    /// its mutex. `strong_count() <= 1` means the map's own reference is the
    /// only one left; if another waiter is mid-`mutex_for` for the same key
    /// it still holds its own clone, so the entry survives for them instead
    /// of being removed out from under a contender.
    fn cleanup_in_process_entry(&self, key: &str) {
        self.in_process.remove_if(key, |_, mutex| Arc::strong_count(mutex) <= 1);
    }

    /// Acquire the in-process mutex, then the cluster-wide lock (jittered
    /// retry until `wait_timeout`), run `body`, and release both on every
    /// exit path. `body` must re-check the cache before doing real work: a
    /// prior holder may have populated it while this caller waited.
    ///
    /// # Errors
    /// Returns [`LockTimeoutError`] if the lock isn't acquired within
    /// `wait_timeout`; the caller should fall through to an unprotected
    /// load. Otherwise returns whatever `body` returns.
    pub async fn with_lock<T, F, Fut>(&self, lock_key: &str, body: F) -> Result<T, LockTimeoutError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mutex = self.mutex_for(lock_key);
        let wait = self.config.wait_timeout;

        let guard = match tokio::time::timeout(wait, Arc::clone(&mutex).lock_owned()).await {
            Ok(guard) => guard,
            Err(_) => {
                self.metrics.lock_acquire(LockOutcome::Timeout);
                drop(mutex);
                self.cleanup_in_process_entry(lock_key);
                return Err(LockTimeoutError);
            }
        };
        drop(mutex);

        let holder = Uuid::new_v4().to_string();
        let acquired_at = tokio::time::Instant::now();
        let mut acquired = false;

        loop {
            if acquired_at.elapsed() >= wait {
                break;
            }
            if self
                .cluster
                .try_acquire(lock_key, &holder, self.config.lease_timeout)
                .await
            {
                acquired = true;
                break;
            }
            let jitter_ms = rand::thread_rng().gen_range(10..60);
            tokio::time::sleep(Duration::from_millis(jitter_ms)).await;
        }

        if !acquired {
            self.metrics.lock_acquire(LockOutcome::Timeout);
            drop(guard);
            self.cleanup_in_process_entry(lock_key);
            return Err(LockTimeoutError);
        }

        self.metrics.lock_acquire(LockOutcome::Acquired);
        debug!(key = %lock_key, holder = %holder, "stampede lock acquired");

        let mut release_guard = ReleaseGuard {
            guard: Some(guard),
            lock: self.cluster.as_ref(),
            key: lock_key.to_string(),
            holder: holder.clone(),
            released: false,
        };

        let hold_start = tokio::time::Instant::now();
        let result = body().await;
        let hold_ms = u64::try_from(hold_start.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.metrics.lock_hold_duration(hold_ms);

        if hold_start.elapsed() >= self.config.lease_timeout {
            self.metrics.lock_acquire(LockOutcome::LeaseExpired);
            warn!(key = %lock_key, "stampede guard body exceeded lease timeout, lock already expired server-side");
        }

        release_guard.release_cluster().await;
        drop(release_guard);
        self.cleanup_in_process_entry(lock_key);

        Ok(result)
    }
}

/// Production [`ClusterLock`], backed by Redis `SET NX PX` and a Lua
/// compare-and-delete release script, the idiomatic way to make `DEL`
/// conditional on holder identity so a slow holder's late release can't
/// evict a fresh acquirer's lock.
#[derive(Clone)]
pub struct RedisClusterLock {
    conn_manager: redis::aio::ConnectionManager,
}

impl std::fmt::Debug for RedisClusterLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisClusterLock").finish_non_exhaustive()
    }
}

impl RedisClusterLock {
    #[must_use]
    pub fn new(conn_manager: redis::aio::ConnectionManager) -> Self {
        Self { conn_manager }
    }
}

const RELEASE_SCRIPT: &str = r"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
else
    return 0
end
";

#[async_trait::async_trait]
impl ClusterLock for RedisClusterLock {
    async fn try_acquire(&self, key: &str, holder: &str, lease: Duration) -> bool {
        let mut conn = self.conn_manager.clone();
        #[allow(clippy::cast_possible_truncation)]
        let lease_ms = lease.as_millis() as usize;
        let result: Result<Option<String>, redis::RedisError> = redis::cmd("SET")
            .arg(key)
            .arg(holder)
            .arg("NX")
            .arg("PX")
            .arg(lease_ms)
            .query_async(&mut conn)
            .await;
        matches!(result, Ok(Some(_)))
    }

    async fn release(&self, key: &str, holder: &str) {
        let mut conn = self.conn_manager.clone();
        let script = redis::Script::new(RELEASE_SCRIPT);
        let result: Result<i64, redis::RedisError> = script
            .key(key)
            .arg(holder)
            .invoke_async(&mut conn)
            .await;
        if let Err(e) = result {
            warn!(key = %key, error = %e, "redis lock release failed, relying on lease expiry");
        }
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_support {
    use super::ClusterLock;
    use dashmap::DashMap;
    use std::time::Duration;

    /// In-memory `ClusterLock` for tests: no real network round trip, same
    /// holder-conditional semantics as the Redis Lua script.
    #[derive(Debug, Default)]
    pub struct InMemoryClusterLock {
        held: DashMap<String, String>,
    }

    impl InMemoryClusterLock {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait::async_trait]
    impl ClusterLock for InMemoryClusterLock {
        async fn try_acquire(&self, key: &str, holder: &str, _lease: Duration) -> bool {
            self.held
                .entry(key.to_string())
                .or_insert_with(|| holder.to_string());
            self.held.get(key).map(|v| v.value() == holder).unwrap_or(false)
        }

        async fn release(&self, key: &str, holder: &str) {
            if let Some(entry) = self.held.get(key) {
                if entry.value() == holder {
                    drop(entry);
                    self.held.remove(key);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::InMemoryClusterLock;
    use super::*;
    use crate::metrics::AtomicMetricsSink;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn guard() -> StampedeGuard {
        StampedeGuard::new(
            Arc::new(InMemoryClusterLock::new()),
            LockConfig::default(),
            Arc::new(AtomicMetricsSink::new()),
        )
    }

    #[tokio::test]
    async fn single_caller_acquires_and_releases() {
        let guard = guard();
        let result = guard.with_lock("k", || async { 5u32 }).await;
        assert_eq!(result.unwrap(), 5);
    }

    /// Bodies for the same key never run concurrently; the caller (not
    /// `StampedeGuard` itself) is responsible for re-checking the cache
    /// inside `body` to turn this serialization into true singleflight
    /// (see the `ProductService` integration test for that full path).
    #[tokio::test]
    async fn concurrent_callers_for_same_key_are_serialized() {
        let guard = Arc::new(guard());
        let in_flight = Arc::new(AtomicU64::new(0));
        let max_observed = Arc::new(AtomicU64::new(0));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let guard = Arc::clone(&guard);
            let in_flight = Arc::clone(&in_flight);
            let max_observed = Arc::clone(&max_observed);
            handles.push(tokio::spawn(async move {
                guard
                    .with_lock("hot-key", || {
                        let in_flight = Arc::clone(&in_flight);
                        let max_observed = Arc::clone(&max_observed);
                        async move {
                            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                            max_observed.fetch_max(now, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(5)).await;
                            in_flight.fetch_sub(1, Ordering::SeqCst);
                        }
                    })
                    .await
            }));
        }
        for h in handles {
            let _ = h.await;
        }
        assert_eq!(max_observed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn in_process_entry_is_removed_after_release() {
        let guard = guard();
        guard.with_lock("k", || async { 1u32 }).await.unwrap();
        assert!(
            guard.in_process.is_empty(),
            "the in-process map must not retain an entry once its last waiter has released it"
        );
    }

    #[tokio::test]
    async fn in_process_map_does_not_grow_unbounded_across_distinct_keys() {
        let guard = guard();
        for i in 0..500 {
            guard.with_lock(&format!("key-{i}"), || async { i }).await.unwrap();
        }
        assert!(
            guard.in_process.len() < 10,
            "distinct one-off keys must be cleaned up, not accumulate forever, got {} entries",
            guard.in_process.len()
        );
    }
}
