//! The `SharedCacheBackend` trait: the seam the L2 tier is built on.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::CacheError;

/// A network-backed key/value store used as the shared (L2) cache tier.
///
/// Implementations operate on already-encoded bytes; `TwoLevel` owns
/// encoding/decoding via a `CacheCodec`. All methods are expected to treat
/// backend unavailability as a recoverable condition: callers map failures
/// here to [`CacheError::CacheTierUnavailable`] and degrade rather than fail
/// the request.
#[async_trait]
pub trait SharedCacheBackend: Send + Sync + std::fmt::Debug {
    /// Fetch the raw bytes stored at `key`, if present and unexpired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Fetch bytes alongside their remaining TTL, used by the two-level
    /// cache to backfill L1 with a TTL no longer than what L2 has left.
    async fn get_with_ttl(&self, key: &str) -> Result<Option<(Vec<u8>, Option<Duration>)>, CacheError>;

    /// Store `bytes` at `key`, expiring after `ttl`.
    async fn put(&self, key: &str, bytes: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// Remove a single key. A non-existent key is not an error.
    async fn invalidate(&self, key: &str) -> Result<(), CacheError>;

    /// Remove every key under `prefix` (a `namespace::` key prefix).
    /// Returns the number of keys removed.
    async fn invalidate_prefix(&self, prefix: &str) -> Result<u64, CacheError>;

    /// Cheap liveness probe, used by health checks and by tests asserting
    /// degraded-mode behavior (S6) against a backend taken offline.
    async fn ping(&self) -> Result<(), CacheError>;
}

/// Configuration shared by `SharedCacheBackend` implementations.
///
/// `pool_min_idle`/`pool_max_size` are surfaced for documentation and config
/// parity even though `RedisSharedCache`'s `ConnectionManager` multiplexes a
/// single managed connection rather than pooling; they exist so a future
/// pooled-client backend can read the same config struct without a breaking
/// change, and are validated in [`SharedCacheConfig::validate`].
#[derive(Debug, Clone)]
pub struct SharedCacheConfig {
    /// Redis connection string (ignored by non-Redis backends).
    pub url: String,
    /// TTL used when a caller doesn't specify a namespace-specific one.
    pub default_ttl: Duration,
    /// Timeout applied to every individual network operation.
    pub connect_timeout: Duration,
    /// Minimum idle connections to keep warm (documentation parity, see above).
    pub pool_min_idle: u32,
    /// Maximum pool size (documentation parity, see above).
    pub pool_max_size: u32,
}

impl Default for SharedCacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            default_ttl: Duration::from_secs(600),
            connect_timeout: Duration::from_secs(3),
            pool_min_idle: 10,
            pool_max_size: 50,
        }
    }
}

impl SharedCacheConfig {
    /// Validate the pool knobs against each other.
    ///
    /// # Errors
    /// Returns [`CacheError::InvalidInput`] if `pool_min_idle > pool_max_size`
    /// or `pool_max_size == 0`.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.pool_max_size == 0 {
            return Err(CacheError::InvalidInput(
                "pool_max_size must be at least 1".to_string(),
            ));
        }
        if self.pool_min_idle > self.pool_max_size {
            return Err(CacheError::InvalidInput(
                "pool_min_idle must not exceed pool_max_size".to_string(),
            ));
        }
        Ok(())
    }
}
