//! Multi-tier read-through cache core for a product catalog service.
//!
//! Two cooperating cache tiers sit in front of a [`store::ProductStore`]: an
//! in-process tier (`backends::local`) and a shared network tier
//! (`backends::shared`), composed by [`two_level::TwoLevel`] into a single
//! read-through/write-through cache. [`stampede::StampedeGuard`] prevents
//! redundant concurrent loads of the same key, both within a process and
//! cluster-wide. [`service::ProductService`] binds all of this to the
//! catalog's namespaces, key templates, TTL policy, and mutation
//! invalidation rules.
//!
//! The quickest way in is [`CacheSystemBuilder`]:
//!
//! ```rust,ignore
//! // requires the `test-util` feature, for MockProductStore
//! use catalog_cache_core::{CacheSystemBuilder, store::MockProductStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = Arc::new(MockProductStore::new(Vec::new()));
//! let system = CacheSystemBuilder::new(store).build().await?;
//! let products = system.service.get_all().await?;
//! # let _ = products;
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod builder;
pub mod clock;
pub mod codec;
pub mod error;
pub mod key;
pub mod metrics;
pub mod product;
pub mod service;
pub mod stampede;
pub mod store;
pub mod two_level;

pub use builder::{CacheSystem, CacheSystemBuilder};
pub use error::CacheError;
pub use key::{CacheKey, Namespace};
pub use product::Product;
pub use two_level::Outcome;
