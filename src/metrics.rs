//! Observability seam. `MetricsSink` is the in-scope interface; a metrics
//! *exporter* (e.g. a `/metrics` HTTP endpoint) is explicitly out of scope
//! and belongs to the surrounding service, not this crate.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::backends::Tier;

/// One method per observable metric. Implementations must be cheap and
/// non-blocking; they're called on hot paths.
pub trait MetricsSink: Send + Sync + std::fmt::Debug {
    fn cache_hit(&self, tier: Tier);
    fn cache_miss(&self);
    fn cache_eviction(&self, tier: Tier);
    fn cache_load_duration(&self, duration_ms: u64);
    fn cache_load_origin(&self);
    fn store_query_total(&self);
    fn lock_acquire(&self, outcome: LockOutcome);
    fn lock_hold_duration(&self, duration_ms: u64);
}

/// Outcome of a `StampedeGuard` acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    Acquired,
    Timeout,
    LeaseExpired,
}

/// Default sink: logs each call via `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn cache_hit(&self, tier: Tier) {
        tracing::debug!(%tier, "cache_hit");
    }

    fn cache_miss(&self) {
        tracing::debug!("cache_miss");
    }

    fn cache_eviction(&self, tier: Tier) {
        tracing::trace!(%tier, "cache_eviction");
    }

    fn cache_load_duration(&self, duration_ms: u64) {
        tracing::trace!(duration_ms, "cache_load_duration");
    }

    fn cache_load_origin(&self) {
        tracing::debug!("cache_load_origin");
    }

    fn store_query_total(&self) {
        tracing::trace!("store_query_total");
    }

    fn lock_acquire(&self, outcome: LockOutcome) {
        tracing::debug!(?outcome, "lock_acquire");
    }

    fn lock_hold_duration(&self, duration_ms: u64) {
        tracing::trace!(duration_ms, "lock_hold_duration");
    }
}

/// Counter-based sink for test assertions.
#[derive(Debug, Default)]
pub struct AtomicMetricsSink {
    pub hits_l1: AtomicU64,
    pub hits_l2: AtomicU64,
    pub misses: AtomicU64,
    pub evictions_l1: AtomicU64,
    pub evictions_l2: AtomicU64,
    pub loads_origin: AtomicU64,
    pub store_queries: AtomicU64,
    pub lock_acquired: AtomicU64,
    pub lock_timeouts: AtomicU64,
    pub lock_lease_expired: AtomicU64,
}

impl AtomicMetricsSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetricsSink for AtomicMetricsSink {
    fn cache_hit(&self, tier: Tier) {
        match tier {
            Tier::L1 => self.hits_l1.fetch_add(1, Ordering::Relaxed),
            Tier::L2 => self.hits_l2.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn cache_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn cache_eviction(&self, tier: Tier) {
        match tier {
            Tier::L1 => self.evictions_l1.fetch_add(1, Ordering::Relaxed),
            Tier::L2 => self.evictions_l2.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn cache_load_duration(&self, _duration_ms: u64) {}

    fn cache_load_origin(&self) {
        self.loads_origin.fetch_add(1, Ordering::Relaxed);
    }

    fn store_query_total(&self) {
        self.store_queries.fetch_add(1, Ordering::Relaxed);
    }

    fn lock_acquire(&self, outcome: LockOutcome) {
        match outcome {
            LockOutcome::Acquired => self.lock_acquired.fetch_add(1, Ordering::Relaxed),
            LockOutcome::Timeout => self.lock_timeouts.fetch_add(1, Ordering::Relaxed),
            LockOutcome::LeaseExpired => self.lock_lease_expired.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn lock_hold_duration(&self, _duration_ms: u64) {}
}
