//! The canonical cached domain entity.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A catalog product. `price` uses `Decimal` so cached round-trips never
/// drift the way an `f64` would; timestamps preserve at least second
/// precision through both codecs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub stock_quantity: u32,
    pub category: String,
    pub brand: String,
    pub image_url: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Product {
        Product {
            id: 1,
            name: "Widget".to_string(),
            description: "A widget".to_string(),
            price: Decimal::new(1999, 2),
            stock_quantity: 10,
            category: "tools".to_string(),
            brand: "Acme".to_string(),
            image_url: "https://example.com/widget.png".to_string(),
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn json_round_trip_preserves_decimal_price() {
        let product = sample();
        let json = serde_json::to_string(&product).unwrap();
        let decoded: Product = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.price, product.price);
    }

    #[test]
    fn postcard_round_trip_preserves_decimal_price() {
        let product = sample();
        let bytes = postcard::to_allocvec(&product).unwrap();
        let decoded: Product = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.price, product.price);
    }
}
