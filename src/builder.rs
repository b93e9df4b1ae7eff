//! Builder for assembling the whole cache system.
//!
//! # Example: default backends
//!
//! ```rust,ignore
//! // requires the `test-util` feature, for MockProductStore
//! use catalog_cache_core::{CacheSystemBuilder, store::MockProductStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = Arc::new(MockProductStore::new(Vec::new()));
//! let system = CacheSystemBuilder::new(store)
//!     .with_redis_url("redis://127.0.0.1:6379")
//!     .build()
//!     .await?;
//! let _ = system.service.get_all().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use anyhow::Result;

use crate::backends::{
    LocalCache, LocalCacheConfig, RedisSharedCache, SharedCacheBackend,
    SharedCacheConfig,
};
use crate::codec::{CacheCodec, JsonCodec};
use crate::metrics::{MetricsSink, TracingMetricsSink};
use crate::service::{NamespacePolicies, ProductService, WarmerConfig};
use crate::stampede::{ClusterLock, LockConfig, StampedeGuard};
use crate::store::ProductStore;
use crate::two_level::TwoLevel;

/// The fully assembled system: an owned [`ProductService`] plus whichever
/// other handles callers want to keep around directly.
pub struct CacheSystem<C: CacheCodec> {
    pub service: ProductService<C>,
}

/// Builds a [`CacheSystem`] from a [`ProductStore`], wiring in default or
/// custom L1/L2 backends, a codec, singleflight, and metrics.
pub struct CacheSystemBuilder<C: CacheCodec = JsonCodec> {
    store: Arc<dyn ProductStore>,
    local_config: LocalCacheConfig,
    shared_config: SharedCacheConfig,
    shared: Option<Arc<dyn SharedCacheBackend>>,
    cluster_lock: Option<Arc<dyn ClusterLock>>,
    lock_config: LockConfig,
    policies: NamespacePolicies,
    warmer_config: WarmerConfig,
    codec: C,
    metrics: Arc<dyn MetricsSink>,
    enable_singleflight: bool,
}

impl CacheSystemBuilder<JsonCodec> {
    #[must_use]
    pub fn new(store: Arc<dyn ProductStore>) -> Self {
        Self {
            store,
            local_config: LocalCacheConfig::default(),
            shared_config: SharedCacheConfig::default(),
            shared: None,
            cluster_lock: None,
            lock_config: LockConfig::default(),
            policies: NamespacePolicies::default(),
            warmer_config: WarmerConfig::default(),
            codec: JsonCodec,
            metrics: Arc::new(TracingMetricsSink),
            enable_singleflight: true,
        }
    }
}

impl<C: CacheCodec> CacheSystemBuilder<C> {
    #[must_use]
    pub fn with_local_config(mut self, config: LocalCacheConfig) -> Self {
        self.local_config = config;
        self
    }

    #[must_use]
    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.shared_config.url = url.into();
        self
    }

    #[must_use]
    pub fn with_shared_config(mut self, config: SharedCacheConfig) -> Self {
        self.shared_config = config;
        self
    }

    /// Use a custom shared (L2) backend instead of connecting to Redis, e.g.
    /// [`crate::backends::InMemorySharedCache`] for tests.
    #[must_use]
    pub fn with_shared_backend(mut self, shared: Arc<dyn SharedCacheBackend>) -> Self {
        self.shared = Some(shared);
        self
    }

    /// Use a custom cluster lock instead of connecting to Redis, e.g. the
    /// in-memory test fixture in `stampede::test_support`.
    #[must_use]
    pub fn with_cluster_lock(mut self, lock: Arc<dyn ClusterLock>) -> Self {
        self.cluster_lock = Some(lock);
        self
    }

    #[must_use]
    pub fn with_lock_config(mut self, config: LockConfig) -> Self {
        self.lock_config = config;
        self
    }

    #[must_use]
    pub fn with_namespace_policies(mut self, policies: NamespacePolicies) -> Self {
        self.policies = policies;
        self
    }

    #[must_use]
    pub fn with_warmer_config(mut self, config: WarmerConfig) -> Self {
        self.warmer_config = config;
        self
    }

    #[must_use]
    pub fn without_singleflight(mut self) -> Self {
        self.enable_singleflight = false;
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_codec<C2: CacheCodec>(self, codec: C2) -> CacheSystemBuilder<C2> {
        CacheSystemBuilder {
            store: self.store,
            local_config: self.local_config,
            shared_config: self.shared_config,
            shared: self.shared,
            cluster_lock: self.cluster_lock,
            lock_config: self.lock_config,
            policies: self.policies,
            warmer_config: self.warmer_config,
            codec,
            metrics: self.metrics,
            enable_singleflight: self.enable_singleflight,
        }
    }

    /// Connects to Redis (unless a custom shared backend/cluster lock was
    /// supplied), assembles every component, and runs the warmer once
    /// before returning.
    ///
    /// # Errors
    /// Returns an error if a live Redis connection is required (no custom
    /// backend/lock supplied) and cannot be established.
    pub async fn build(self) -> Result<CacheSystem<C>> {
        let shared: Arc<dyn SharedCacheBackend> = match self.shared {
            Some(shared) => shared,
            None => Arc::new(RedisSharedCache::connect(&self.shared_config).await?),
        };

        let cluster_lock: Arc<dyn ClusterLock> = match self.cluster_lock {
            Some(lock) => lock,
            None => {
                let client = redis::Client::open(self.shared_config.url.as_str())?;
                let conn_manager = redis::aio::ConnectionManager::new(client).await?;
                Arc::new(crate::stampede::RedisClusterLock::new(conn_manager))
            }
        };

        let local = Arc::new(LocalCache::with_metrics(self.local_config, Arc::clone(&self.metrics)));
        let cache = TwoLevel::new(local, shared, self.codec, Arc::clone(&self.metrics));

        let stampede = if self.enable_singleflight {
            Some(Arc::new(StampedeGuard::new(
                cluster_lock,
                self.lock_config,
                self.metrics,
            )))
        } else {
            None
        };

        let service = ProductService::new(
            cache,
            stampede,
            self.store,
            self.policies,
            self.warmer_config,
        );
        service.warm_up().await;

        Ok(CacheSystem { service })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemorySharedCache;
    use crate::stampede::test_support::InMemoryClusterLock;
    use crate::store::MockProductStore;

    #[tokio::test]
    async fn build_with_in_memory_backends_runs_warmer() {
        let store = Arc::new(MockProductStore::new(Vec::new()));
        let system = CacheSystemBuilder::new(store)
            .with_shared_backend(Arc::new(InMemorySharedCache::new()))
            .with_cluster_lock(Arc::new(InMemoryClusterLock::new()))
            .build()
            .await
            .unwrap();
        assert!(system.service.get_all().await.unwrap().is_empty());
    }
}
