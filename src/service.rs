//! `ProductService`: binds the caches to concrete catalog domain policies.
//!
//! Owns namespace/key-template derivation, per-namespace TTLs, the mutation
//! invalidation algebra, and the startup warmer. This is the only module
//! that knows what a product *is* for caching purposes; `TwoLevel` and the
//! backends below it are domain-agnostic.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::error;

use crate::codec::CacheCodec;
use crate::key::{CacheKey, Namespace};
use crate::product::Product;
use crate::stampede::StampedeGuard;
use crate::store::ProductStore;
use crate::two_level::{CacheTtl, TwoLevel};

/// Per-namespace L2 TTL, L1 TTL, and singleflight policy.
///
/// `l1_ttl_write` is this namespace's *configured* L1 TTL; the effective
/// write TTL actually applied (see [`CacheTtl::effective_l1_write`]) is
/// capped at `l2_ttl`, so misconfiguring this field too high can never
/// violate "C1's TTL ≤ C2's TTL" — it just means the cap always wins.
#[derive(Debug, Clone, Copy)]
pub struct NamespacePolicy {
    pub l2_ttl: Duration,
    pub l1_ttl_write: Duration,
    pub l1_ttl_access: Option<Duration>,
}

impl NamespacePolicy {
    #[must_use]
    pub fn cache_ttl(&self) -> CacheTtl {
        CacheTtl::new(self.l2_ttl, self.l1_ttl_write, self.l1_ttl_access)
    }
}

/// The full table of namespace policies, matching the defaults in §5.5.
#[derive(Debug, Clone, Copy)]
pub struct NamespacePolicies {
    pub product_by_id: NamespacePolicy,
    pub products: NamespacePolicy,
    pub search_results: NamespacePolicy,
    pub price_range: NamespacePolicy,
    pub categories: NamespacePolicy,
}

impl Default for NamespacePolicies {
    fn default() -> Self {
        Self {
            product_by_id: NamespacePolicy {
                l2_ttl: Duration::from_secs(15 * 60),
                l1_ttl_write: Duration::from_secs(5 * 60),
                l1_ttl_access: Some(Duration::from_secs(3 * 60)),
            },
            products: NamespacePolicy {
                l2_ttl: Duration::from_secs(10 * 60),
                l1_ttl_write: Duration::from_secs(5 * 60),
                l1_ttl_access: Some(Duration::from_secs(3 * 60)),
            },
            search_results: NamespacePolicy {
                l2_ttl: Duration::from_secs(5 * 60),
                l1_ttl_write: Duration::from_secs(60),
                l1_ttl_access: None,
            },
            price_range: NamespacePolicy {
                l2_ttl: Duration::from_secs(3 * 60),
                // Configured the same as the other listing namespaces;
                // cache_ttl().effective_l1_write() caps it at l2_ttl (3m)
                // since this namespace's L2 TTL is shorter than the 5m default.
                l1_ttl_write: Duration::from_secs(5 * 60),
                l1_ttl_access: Some(Duration::from_secs(3 * 60)),
            },
            categories: NamespacePolicy {
                l2_ttl: Duration::from_secs(60 * 60),
                l1_ttl_write: Duration::from_secs(5 * 60),
                l1_ttl_access: Some(Duration::from_secs(3 * 60)),
            },
        }
    }
}

/// Configuration for [`ProductService::warm_up`].
#[derive(Debug, Clone, Copy)]
pub struct WarmerConfig {
    /// How many active products (ordered by id ascending) to pre-populate.
    pub top_n: usize,
    /// How many most-recently-created products populate the `products/new`
    /// list.
    pub new_arrivals_n: usize,
}

impl Default for WarmerConfig {
    fn default() -> Self {
        Self {
            top_n: 100,
            new_arrivals_n: 10,
        }
    }
}

/// Binds [`TwoLevel`], an optional [`StampedeGuard`], and a [`ProductStore`]
/// to the catalog's namespace/key-template/TTL policy.
pub struct ProductService<C: CacheCodec> {
    cache: TwoLevel<C>,
    stampede: Option<Arc<StampedeGuard>>,
    store: Arc<dyn ProductStore>,
    policies: NamespacePolicies,
    warmer_config: WarmerConfig,
}

impl<C: CacheCodec> ProductService<C> {
    pub fn new(
        cache: TwoLevel<C>,
        stampede: Option<Arc<StampedeGuard>>,
        store: Arc<dyn ProductStore>,
        policies: NamespacePolicies,
        warmer_config: WarmerConfig,
    ) -> Self {
        Self {
            cache,
            stampede,
            store,
            policies,
            warmer_config,
        }
    }

    /// # Errors
    /// Propagates `ProductStore::find_by_id`'s error on a full miss.
    pub async fn get_by_id(&self, id: u64, use_singleflight: bool) -> Result<Product, crate::error::CacheError> {
        let key = CacheKey::new(Namespace::ProductById, id.to_string());
        let ttl = self.policies.product_by_id.cache_ttl();
        let store = Arc::clone(&self.store);

        if use_singleflight {
            if let Some(stampede) = &self.stampede {
                return self.get_with_singleflight(stampede, &key, ttl, id, store).await;
            }
        }

        let (product, _) = self
            .cache
            .get_or_load(&key, ttl, || async move { store.find_by_id(id).await })
            .await?;
        Ok(product)
    }

    async fn get_with_singleflight(
        &self,
        stampede: &Arc<StampedeGuard>,
        key: &CacheKey,
        ttl: CacheTtl,
        id: u64,
        store: Arc<dyn ProductStore>,
    ) -> Result<Product, crate::error::CacheError> {
        let lock_key = key.wire();
        let outcome = stampede
            .with_lock(&lock_key, || async {
                // Re-check the cache under the lock: a prior holder may have
                // populated it while this caller waited.
                self.cache
                    .get_or_load(key, ttl, || async move { store.find_by_id(id).await })
                    .await
            })
            .await;

        match outcome {
            Ok(result) => result.map(|(p, _)| p),
            Err(_lock_timeout) => {
                // Fall through to an unprotected load: one extra store hit,
                // never a correctness violation.
                let store = Arc::clone(&self.store);
                let (product, _) = self
                    .cache
                    .get_or_load(key, ttl, || async move { store.find_by_id(id).await })
                    .await?;
                Ok(product)
            }
        }
    }

    /// # Errors
    /// Propagates `ProductStore::find_active`'s error on a full miss.
    pub async fn get_all(&self) -> Result<Vec<Product>, crate::error::CacheError> {
        let key = CacheKey::new(Namespace::Products, "all");
        let ttl = self.policies.products.cache_ttl();
        let store = Arc::clone(&self.store);
        let (products, _) = self
            .cache
            .get_or_load(&key, ttl, || async move { store.find_active().await })
            .await?;
        Ok(products)
    }

    /// # Errors
    /// Propagates `ProductStore::find_by_category`'s error on a full miss.
    pub async fn get_by_category(&self, category: &str) -> Result<Vec<Product>, crate::error::CacheError> {
        let key = CacheKey::new(Namespace::Products, format!("category:{category}"));
        let ttl = self.policies.products.cache_ttl();
        let store = Arc::clone(&self.store);
        let category = category.to_string();
        let (products, _) = self
            .cache
            .get_or_load(&key, ttl, || async move { store.find_by_category(&category).await })
            .await?;
        Ok(products)
    }

    /// # Errors
    /// Propagates `ProductStore::search_products`'s error on a full miss.
    pub async fn search(&self, keyword: &str) -> Result<Vec<Product>, crate::error::CacheError> {
        let lowered = keyword.to_lowercase();
        let key = CacheKey::new(Namespace::SearchResults, lowered.clone());
        let ttl = self.policies.search_results.cache_ttl();
        let store = Arc::clone(&self.store);
        let (products, _) = self
            .cache
            .get_or_load(&key, ttl, || async move { store.search_products(&lowered).await })
            .await?;
        Ok(products)
    }

    /// # Errors
    /// Propagates `ProductStore::find_by_price_range`'s error on a full miss.
    pub async fn get_by_price_range(
        &self,
        min: Decimal,
        max: Decimal,
    ) -> Result<Vec<Product>, crate::error::CacheError> {
        let key = CacheKey::new(Namespace::PriceRange, format!("price:{min}-{max}"));
        let ttl = self.policies.price_range.cache_ttl();
        let store = Arc::clone(&self.store);
        let (products, _) = self
            .cache
            .get_or_load(&key, ttl, || async move { store.find_by_price_range(min, max).await })
            .await?;
        Ok(products)
    }

    /// # Errors
    /// Propagates `ProductStore::find_distinct_categories`'s error on a full miss.
    pub async fn get_categories(&self) -> Result<Vec<String>, crate::error::CacheError> {
        let key = CacheKey::new(Namespace::Categories, "all");
        let ttl = self.policies.categories.cache_ttl();
        let store = Arc::clone(&self.store);
        let (categories, _) = self
            .cache
            .get_or_load(&key, ttl, || async move { store.find_distinct_categories().await })
            .await?;
        Ok(categories)
    }

    /// # Errors
    /// Propagates `ProductStore::save`'s error. Invalidation failures never
    /// fail the mutation; they're logged and left to TTL convergence.
    pub async fn create(&self, product: Product) -> Result<Product, crate::error::CacheError> {
        let saved = self.store.save(product).await?;
        self.cache.invalidate_namespace(Namespace::Products).await;
        self.cache.invalidate_namespace(Namespace::Categories).await;
        self.cache.invalidate_namespace(Namespace::PriceRange).await;
        Ok(saved)
    }

    /// # Errors
    /// Propagates `ProductStore::save`'s error.
    pub async fn update(&self, id: u64, mut product: Product) -> Result<Product, crate::error::CacheError> {
        product.id = id;
        let saved = self.store.save(product).await?;

        let key = CacheKey::new(Namespace::ProductById, id.to_string());
        if let Err(e) = self.cache.put(&key, &saved, self.policies.product_by_id.cache_ttl()).await {
            error!(id, error = %e, "failed to refresh productById cache entry after update");
        }
        self.cache.invalidate_namespace(Namespace::Products).await;
        self.cache.invalidate_namespace(Namespace::PriceRange).await;
        Ok(saved)
    }

    /// # Errors
    /// Propagates `ProductStore::delete_by_id`'s error.
    pub async fn delete(&self, id: u64) -> Result<(), crate::error::CacheError> {
        self.store.delete_by_id(id).await?;
        let key = CacheKey::new(Namespace::ProductById, id.to_string());
        self.cache.invalidate(&key).await;
        self.cache.invalidate_namespace(Namespace::Products).await;
        self.cache.invalidate_namespace(Namespace::PriceRange).await;
        self.cache.invalidate_namespace(Namespace::SearchResults).await;
        Ok(())
    }

    /// Pre-populates both tiers before serving traffic. Each phase's
    /// failure is logged and does not abort the remaining phases. Running
    /// this twice is equivalent to running it once: every phase is a pure
    /// overwrite, never an accumulation.
    pub async fn warm_up(&self) {
        if let Err(e) = self.warm_active_products().await {
            error!(error = %e, "warmer: failed to populate productById");
        }
        let categories = match self.warm_categories().await {
            Ok(categories) => categories,
            Err(e) => {
                error!(error = %e, "warmer: failed to populate categories");
                Vec::new()
            }
        };
        for category in &categories {
            if let Err(e) = self.warm_category_products(category).await {
                error!(category = %category, error = %e, "warmer: failed to populate products/category");
            }
        }
        if let Err(e) = self.warm_new_arrivals().await {
            error!(error = %e, "warmer: failed to populate products/new");
        }
    }

    async fn warm_active_products(&self) -> Result<(), crate::error::CacheError> {
        let mut products = self.store.find_active().await?;
        products.sort_by_key(|p| p.id);
        products.truncate(self.warmer_config.top_n);
        for product in products {
            let key = CacheKey::new(Namespace::ProductById, product.id.to_string());
            self.cache.put(&key, &product, self.policies.product_by_id.cache_ttl()).await?;
        }
        Ok(())
    }

    async fn warm_categories(&self) -> Result<Vec<String>, crate::error::CacheError> {
        let categories = self.store.find_distinct_categories().await?;
        let key = CacheKey::new(Namespace::Categories, "all");
        self.cache.put(&key, &categories, self.policies.categories.cache_ttl()).await?;
        Ok(categories)
    }

    async fn warm_category_products(&self, category: &str) -> Result<(), crate::error::CacheError> {
        let products = self.store.find_by_category(category).await?;
        let key = CacheKey::new(Namespace::Products, format!("category:{category}"));
        self.cache.put(&key, &products, self.policies.products.cache_ttl()).await
    }

    async fn warm_new_arrivals(&self) -> Result<(), crate::error::CacheError> {
        let products = self
            .store
            .find_top_n_by_recency(self.warmer_config.new_arrivals_n)
            .await?;
        let key = CacheKey::new(Namespace::Products, "new");
        self.cache.put(&key, &products, self.policies.products.cache_ttl()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{InMemorySharedCache, LocalCache, LocalCacheConfig};
    use crate::codec::JsonCodec;
    use crate::metrics::AtomicMetricsSink;
    use crate::store::MockProductStore;
    use chrono::Utc;

    fn product(id: u64, category: &str, price: Decimal) -> Product {
        Product {
            id,
            name: format!("Product {id}"),
            description: String::new(),
            price,
            stock_quantity: 5,
            category: category.to_string(),
            brand: "Acme".to_string(),
            image_url: String::new(),
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn service(products: Vec<Product>) -> ProductService<JsonCodec> {
        let cache = TwoLevel::new(
            Arc::new(LocalCache::new(LocalCacheConfig::default())),
            Arc::new(InMemorySharedCache::new()),
            JsonCodec,
            Arc::new(AtomicMetricsSink::new()),
        );
        let store = Arc::new(MockProductStore::new(products));
        ProductService::new(
            cache,
            None,
            store,
            NamespacePolicies::default(),
            WarmerConfig::default(),
        )
    }

    #[tokio::test]
    async fn get_by_id_then_hits_cache_without_extra_store_call() {
        let svc = service(vec![product(1, "tools", Decimal::new(999, 2))]);
        let first = svc.get_by_id(1, false).await.unwrap();
        assert_eq!(first.id, 1);
        let second = svc.get_by_id(1, false).await.unwrap();
        assert_eq!(second.id, 1);
    }

    #[tokio::test]
    async fn update_invalidates_products_and_price_range_namespaces() {
        let svc = service(vec![product(1, "tools", Decimal::new(999, 2))]);
        let _ = svc.get_all().await.unwrap();
        let _ = svc
            .get_by_price_range(Decimal::new(0, 0), Decimal::new(100000, 2))
            .await
            .unwrap();

        let mut updated = product(1, "tools", Decimal::new(500, 2));
        updated.id = 1;
        svc.update(1, updated).await.unwrap();

        // Re-reading should observe the new price, not a stale cached list.
        let list = svc.get_all().await.unwrap();
        assert_eq!(list.first().unwrap().price, Decimal::new(500, 2));
    }

    #[tokio::test]
    async fn delete_invalidates_by_id_and_listing_namespaces() {
        let svc = service(vec![product(1, "tools", Decimal::new(999, 2))]);
        let _ = svc.get_by_id(1, false).await.unwrap();
        svc.delete(1).await.unwrap();
        assert!(svc.get_by_id(1, false).await.is_err());
    }

    #[tokio::test]
    async fn warm_up_is_idempotent() {
        let svc = service(vec![
            product(1, "tools", Decimal::new(999, 2)),
            product(2, "garden", Decimal::new(499, 2)),
        ]);
        svc.warm_up().await;
        svc.warm_up().await;
        let categories = svc.get_categories().await.unwrap();
        assert_eq!(categories.len(), 2);
    }
}
