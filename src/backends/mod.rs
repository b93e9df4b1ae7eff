//! Cache tier backends: the in-process tier (`local`), the shared network
//! tier (`shared` trait plus its `redis_shared`/`memory_shared` impls).

pub mod local;
pub mod memory_shared;
pub mod redis_shared;
pub mod shared;

pub use local::{LocalCache, LocalCacheConfig, LocalCacheStats};
pub use memory_shared::InMemorySharedCache;
pub use redis_shared::RedisSharedCache;
pub use shared::{SharedCacheBackend, SharedCacheConfig};

use std::fmt;

/// Which cache tier an operation or error pertains to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    L1,
    L2,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::L1 => "L1",
            Self::L2 => "L2",
        })
    }
}
