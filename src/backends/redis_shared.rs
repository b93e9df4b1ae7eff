//! `RedisSharedCache`: the production `SharedCacheBackend`.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::{debug, info, warn};

use crate::error::CacheError;

use super::shared::{SharedCacheBackend, SharedCacheConfig};
use super::Tier;

/// Redis-backed shared tier. Owns a `ConnectionManager`, which reconnects
/// transparently on connection loss; cloning it per call is cheap (it's a
/// handle to the managed connection, not a new socket).
#[derive(Clone)]
pub struct RedisSharedCache {
    conn_manager: ConnectionManager,
    op_timeout: Duration,
}

impl std::fmt::Debug for RedisSharedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisSharedCache")
            .field("op_timeout", &self.op_timeout)
            .finish()
    }
}

impl RedisSharedCache {
    /// Connect to Redis and verify the connection with a `PING`.
    ///
    /// # Errors
    /// Returns [`CacheError::StoreUnavailable`] if the client can't be built
    /// or the connection/ping fails.
    pub async fn connect(config: &SharedCacheConfig) -> Result<Self, CacheError> {
        config.validate()?;

        let client = Client::open(config.url.as_str())
            .map_err(|e| CacheError::StoreUnavailable(format!("invalid redis url: {e}")))?;

        let conn_manager = tokio::time::timeout(config.connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| CacheError::StoreUnavailable("redis connect timed out".to_string()))?
            .map_err(|e| CacheError::StoreUnavailable(format!("redis connect failed: {e}")))?;

        let cache = Self {
            conn_manager,
            op_timeout: config.connect_timeout,
        };
        cache.ping().await?;
        info!(url = %config.url, "connected to shared cache backend");
        Ok(cache)
    }

    async fn with_timeout<F, T>(&self, fut: F) -> Result<T, CacheError>
    where
        F: std::future::Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(CacheError::cache_tier_unavailable(Tier::L2, anyhow::anyhow!(e))),
            Err(_) => Err(CacheError::cache_tier_unavailable(
                Tier::L2,
                anyhow::anyhow!("redis operation timed out"),
            )),
        }
    }

    /// Non-blocking cursor-based key scan (SCAN, never KEYS).
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.conn_manager.clone();
        let pattern = format!("{prefix}*");
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next_cursor, batch): (u64, Vec<String>) = self
                .with_timeout(
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(200)
                        .query_async(&mut conn),
                )
                .await?;
            cursor = next_cursor;
            keys.extend(batch);
            if cursor == 0 {
                break;
            }
        }
        Ok(keys)
    }
}

#[async_trait]
impl SharedCacheBackend for RedisSharedCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.conn_manager.clone();
        self.with_timeout(conn.get(key)).await
    }

    async fn get_with_ttl(
        &self,
        key: &str,
    ) -> Result<Option<(Vec<u8>, Option<Duration>)>, CacheError> {
        let mut conn = self.conn_manager.clone();
        let value: Option<Vec<u8>> = self.with_timeout(conn.get(key)).await?;
        let Some(bytes) = value else {
            return Ok(None);
        };
        let ttl_secs: i64 = self.with_timeout(conn.ttl(key)).await?;
        let ttl = if ttl_secs > 0 {
            Some(Duration::from_secs(ttl_secs as u64))
        } else {
            None
        };
        Ok(Some((bytes, ttl)))
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn_manager.clone();
        let ttl_secs = ttl.as_secs().max(1);
        self.with_timeout(conn.set_ex(key, bytes, ttl_secs)).await
    }

    async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn_manager.clone();
        let _: i64 = self.with_timeout(conn.del(key)).await?;
        Ok(())
    }

    async fn invalidate_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let keys = self.scan_prefix(prefix).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn_manager.clone();
        let removed: u64 = self.with_timeout(conn.del(&keys)).await?;
        debug!(prefix = %prefix, removed, "invalidated shared namespace");
        Ok(removed)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn_manager.clone();
        let result: Result<String, _> = self
            .with_timeout(redis::cmd("PING").query_async(&mut conn))
            .await;
        if let Err(ref e) = result {
            warn!(error = %e, "shared cache ping failed");
        }
        result.map(|_| ())
    }
}
