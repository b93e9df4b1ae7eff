//! Stampede protection: spawn many concurrent readers for the same cold key
//! and show they collapse into a single store query under singleflight.

use catalog_cache_core::backends::InMemorySharedCache;
use catalog_cache_core::stampede::test_support::InMemoryClusterLock;
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
        name: "Hot Item".to_string(),
        description: String::new(),
        price: Decimal::new(2500, 2),
        stock_quantity: 1,
        category: "flash-sale".to_string(),
        brand: "Acme".to_string(),
        image_url: String::new(),
        active: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    let store = Arc::new(MockProductStore::new(vec![product]));

    let system = Arc::new(
        CacheSystemBuilder::new(store)
            .with_shared_backend(Arc::new(InMemorySharedCache::new()))
            .with_cluster_lock(Arc::new(InMemoryClusterLock::new()))
            .build()
            .await?,
    );

    let mut handles = Vec::new();
    for _ in 0..100 {
        let system = Arc::clone(&system);
        handles.push(tokio::spawn(async move {
            system.service.get_by_id(1, true).await
        }));
    }
    for handle in handles {
        handle.await??;
    }

    println!("100 concurrent readers completed under singleflight protection");
    Ok(())
}
