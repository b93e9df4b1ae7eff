//! Shared fixtures for the integration suites.

use catalog_cache_core::backends::InMemorySharedCache;
use catalog_cache_core::store::MockProductStore;
use catalog_cache_core::stampede::test_support::InMemoryClusterLock;
use catalog_cache_core::{CacheSystem, CacheSystemBuilder, Product};
use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

pub fn sample_product(id: u64, category: &str, price_cents: i64, age_days: i64) -> Product {
    let now = Utc::now();
    Product {
        id,
        name: format!("Product {id}"),
        description: format!("Description for product {id}"),
        price: Decimal::new(price_cents, 2),
        stock_quantity: 10,
        category: category.to_string(),
        brand: "Acme".to_string(),
        image_url: String::new(),
        active: true,
        created_at: now - ChronoDuration::days(age_days),
        updated_at: now,
    }
}

pub async fn build_system(products: Vec<Product>) -> (CacheSystem<catalog_cache_core::codec::JsonCodec>, Arc<MockProductStore>) {
    let store = Arc::new(MockProductStore::new(products));
    let system = CacheSystemBuilder::new(Arc::clone(&store) as Arc<dyn catalog_cache_core::store::ProductStore>)
        .with_shared_backend(Arc::new(InMemorySharedCache::new()))
        .with_cluster_lock(Arc::new(InMemoryClusterLock::new()))
        .build()
        .await
        .expect("in-memory backends never fail to build");
    (system, store)
}
