//! Basic usage: build the cache system against an in-memory store and
//! read a product through twice, observing the second read hit L1.

use catalog_cache_core::store::MockProductStore;
use catalog_cache_core::{CacheSystemBuilder, Product};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let product = Product {
        id: 1,
        name: "Trail Running Shoe".to_string(),
        description: "Lightweight trail shoe".to_string(),
        price: Decimal::new(12999, 2),
        stock_quantity: 42,
        category: "footwear".to_string(),
        brand: "Acme".to_string(),
        image_url: String::new(),
        active: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    let store = Arc::new(MockProductStore::new(vec![product]));
    let system = CacheSystemBuilder::new(store)
        .with_shared_backend(Arc::new(
            catalog_cache_core::backends::InMemorySharedCache::new(),
        ))
        .with_cluster_lock(Arc::new(
            catalog_cache_core::stampede::test_support::InMemoryClusterLock::new(),
        ))
        .build()
        .await?;

    let first = system.service.get_by_id(1, false).await?;
    println!("first read (origin): {} = {}", first.id, first.name);

    let second = system.service.get_by_id(1, false).await?;
    println!("second read (l1 hit): {} = {}", second.id, second.name);

    Ok(())
}
