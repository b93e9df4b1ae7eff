//! Multi-tier usage: show an L1 miss falling through to L2, backfilling L1,
//! then a namespace invalidation clearing both tiers.

use catalog_cache_core::backends::InMemorySharedCache;
use catalog_cache_core::store::MockProductStore;
use catalog_cache_core::stampede::test_support::InMemoryClusterLock;
use catalog_cache_core::{CacheSystemBuilder, Namespace, Product};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;

fn product(id: u64, category: &str) -> Product {
    Product {
        id,
        name: format!("Product {id}"),
        description: String::new(),
        price: Decimal::new(1999, 2),
        stock_quantity: 10,
        category: category.to_string(),
        brand: "Acme".to_string(),
        image_url: String::new(),
        active: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let store = Arc::new(MockProductStore::new(vec![
        product(1, "tools"),
        product(2, "garden"),
    ]));
    let system = CacheSystemBuilder::new(store)
        .with_shared_backend(Arc::new(InMemorySharedCache::new()))
        .with_cluster_lock(Arc::new(InMemoryClusterLock::new()))
        .build()
        .await?;

    let all = system.service.get_all().await?;
    println!("get_all (origin, warmer already primed productById): {} products", all.len());

    let by_category = system.service.get_by_category("tools").await?;
    println!("get_by_category(tools): {} products", by_category.len());

    // A mutation invalidates the products/priceRange namespaces; the next
    // get_all re-reads from the store instead of a stale cached list.
    let mut updated = product(1, "tools");
    updated.price = Decimal::new(999, 2);
    system.service.update(1, updated).await?;
    let _ = system.service.get_all().await?;
    println!("after update, namespace invalidated and re-read: ok");
    let _ = Namespace::ALL;

    Ok(())
}
