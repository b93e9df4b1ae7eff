//! The external persistence seam. The cache core never talks to a database
//! directly; it only ever calls through [`ProductStore`].

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::CacheError;
use crate::product::Product;

/// The relational store backing the catalog. All methods are `async` and
/// return `Result<_, CacheError>`; retries, if any, are internal to the
/// implementation and invisible to the cache core.
#[async_trait]
pub trait ProductStore: Send + Sync + std::fmt::Debug {
    async fn find_by_id(&self, id: u64) -> Result<Product, CacheError>;
    async fn find_active(&self) -> Result<Vec<Product>, CacheError>;
    async fn find_by_category(&self, category: &str) -> Result<Vec<Product>, CacheError>;
    async fn find_by_price_range(
        &self,
        min: Decimal,
        max: Decimal,
    ) -> Result<Vec<Product>, CacheError>;
    async fn search_products(&self, keyword: &str) -> Result<Vec<Product>, CacheError>;
    async fn find_distinct_categories(&self) -> Result<Vec<String>, CacheError>;
    async fn find_top_n_by_recency(&self, n: usize) -> Result<Vec<Product>, CacheError>;
    async fn save(&self, product: Product) -> Result<Product, CacheError>;
    async fn delete_by_id(&self, id: u64) -> Result<(), CacheError>;
}

/// In-memory `ProductStore` fixture. Call-counting lets tests assert on
/// store-query volume (e.g. that a cache hit never reaches the store).
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Default)]
pub struct MockProductStore {
    products: parking_lot::Mutex<Vec<Product>>,
    calls: std::sync::atomic::AtomicU64,
}

#[cfg(any(test, feature = "test-util"))]
impl MockProductStore {
    #[must_use]
    pub fn new(products: Vec<Product>) -> Self {
        Self {
            products: parking_lot::Mutex::new(products),
            calls: std::sync::atomic::AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn call_count(&self) -> u64 {
        self.calls.load(std::sync::atomic::Ordering::Relaxed)
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl ProductStore for MockProductStore {
    async fn find_by_id(&self, id: u64) -> Result<Product, CacheError> {
        self.record_call();
        self.products
            .lock()
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or(CacheError::NotFound)
    }

    async fn find_active(&self) -> Result<Vec<Product>, CacheError> {
        self.record_call();
        Ok(self
            .products
            .lock()
            .iter()
            .filter(|p| p.active)
            .cloned()
            .collect())
    }

    async fn find_by_category(&self, category: &str) -> Result<Vec<Product>, CacheError> {
        self.record_call();
        Ok(self
            .products
            .lock()
            .iter()
            .filter(|p| p.category == category)
            .cloned()
            .collect())
    }

    async fn find_by_price_range(
        &self,
        min: Decimal,
        max: Decimal,
    ) -> Result<Vec<Product>, CacheError> {
        self.record_call();
        Ok(self
            .products
            .lock()
            .iter()
            .filter(|p| p.price >= min && p.price <= max)
            .cloned()
            .collect())
    }

    async fn search_products(&self, keyword: &str) -> Result<Vec<Product>, CacheError> {
        self.record_call();
        let keyword = keyword.to_lowercase();
        Ok(self
            .products
            .lock()
            .iter()
            .filter(|p| p.name.to_lowercase().contains(&keyword))
            .cloned()
            .collect())
    }

    async fn find_distinct_categories(&self) -> Result<Vec<String>, CacheError> {
        self.record_call();
        let mut categories: Vec<String> = self
            .products
            .lock()
            .iter()
            .map(|p| p.category.clone())
            .collect();
        categories.sort();
        categories.dedup();
        Ok(categories)
    }

    async fn find_top_n_by_recency(&self, n: usize) -> Result<Vec<Product>, CacheError> {
        self.record_call();
        let mut products = self.products.lock().clone();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        products.truncate(n);
        Ok(products)
    }

    async fn save(&self, product: Product) -> Result<Product, CacheError> {
        self.record_call();
        let mut products = self.products.lock();
        if let Some(existing) = products.iter_mut().find(|p| p.id == product.id) {
            *existing = product.clone();
        } else {
            products.push(product.clone());
        }
        Ok(product)
    }

    async fn delete_by_id(&self, id: u64) -> Result<(), CacheError> {
        self.record_call();
        let mut products = self.products.lock();
        let before = products.len();
        products.retain(|p| p.id != id);
        if products.len() == before {
            return Err(CacheError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn product(id: u64, category: &str) -> Product {
        Product {
            id,
            name: format!("Product {id}"),
            description: String::new(),
            price: Decimal::new(100, 0),
            stock_quantity: 1,
            category: category.to_string(),
            brand: "Acme".to_string(),
            image_url: String::new(),
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn find_by_id_counts_calls() {
        let store = MockProductStore::new(vec![product(1, "tools")]);
        assert!(store.find_by_id(1).await.is_ok());
        assert!(store.find_by_id(2).await.is_err());
        assert_eq!(store.call_count(), 2);
    }

    #[tokio::test]
    async fn delete_missing_id_errors() {
        let store = MockProductStore::new(vec![product(1, "tools")]);
        assert!(store.delete_by_id(99).await.is_err());
        assert!(store.delete_by_id(1).await.is_ok());
    }
}
