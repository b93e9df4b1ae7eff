//! Error taxonomy for the catalog cache core.
//!
//! The core favors availability over strict cache consistency: only a small
//! subset of these variants are meant to reach a caller as `Err` (see
//! [`CacheError::is_caller_facing`]). Everything else is swallowed into
//! degraded behavior by the component that produced it, after being logged
//! and metered.

use crate::backends::Tier;

/// Errors surfaced or swallowed across the cache core.
#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    /// The requested entity does not exist in the store. Never cached.
    #[error("not found")]
    NotFound,

    /// The store failed the request outright (connection, query error, ...).
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// A cache tier (almost always L2) failed an operation. Treated as a
    /// soft miss on read and a no-op on write by callers; never fatal.
    #[error("cache tier {tier} unavailable")]
    CacheTierUnavailable {
        tier: Tier,
        #[source]
        source: anyhow::Error,
    },

    /// `StampedeGuard` could not acquire the lock within `wait_timeout`.
    /// Callers fall through to an unprotected load.
    #[error("lock acquisition timed out")]
    LockTimeout,

    /// Encode/decode failure. Read path treats as miss; write path skips
    /// the cache write.
    #[error("codec error: {0}")]
    CodecError(#[source] anyhow::Error),

    /// Caller-supplied input was invalid. Never reaches the cache.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl CacheError {
    /// `true` for the variants that must propagate to the caller; `false`
    /// for variants a component should swallow into degraded behavior
    /// (metric + log) instead.
    #[must_use]
    pub fn is_caller_facing(&self) -> bool {
        matches!(
            self,
            Self::NotFound | Self::StoreUnavailable(_) | Self::InvalidInput(_)
        )
    }

    pub fn cache_tier_unavailable(tier: Tier, source: impl Into<anyhow::Error>) -> Self {
        Self::CacheTierUnavailable {
            tier,
            source: source.into(),
        }
    }

    pub fn codec(source: impl Into<anyhow::Error>) -> Self {
        Self::CodecError(source.into())
    }
}
