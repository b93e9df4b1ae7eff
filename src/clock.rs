//! Injectable time source.
//!
//! `LocalCache`'s backing store (moka) owns its own wall-clock TTL enforcement,
//! but `SharedCache`, `StampedeGuard` lock tokens, and the higher-level TTL
//! tests all reason about elapsed time explicitly. Threading a [`Clock`]
//! through them (rather than calling `Instant::now()` inline, as the
//! reference multi-tier cache this crate grew from does) lets tests like
//! S5 (TTL expiry) advance time deterministically instead of sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A source of monotonic time.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> Instant;
}

/// Default clock, backed by `std::time::Instant`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Test clock that advances only when told to.
///
/// `base` is fixed at construction; `offset_millis` is added to it on every
/// `now()` call, and is bumped by [`ManualClock::advance`].
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    offset_millis: Arc<AtomicU64>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset_millis: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Move the clock forward by `duration`. Past `get` results for expired
    /// entries become visible to subsequent `now()` callers immediately.
    pub fn advance(&self, duration: Duration) {
        #[allow(clippy::cast_possible_truncation)]
        self.offset_millis
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + Duration::from_millis(self.offset_millis.load(Ordering::SeqCst))
    }
}
