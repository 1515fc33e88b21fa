//! Product record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Price, ProductId};

/// A catalog product with its stock level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub partition_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Price,
    pub stock_quantity: i32,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub image_url: String,
    pub is_active: bool,
    pub created_date: DateTime<Utc>,
    #[serde(default)]
    pub last_modified_date: Option<DateTime<Utc>>,
}

impl Product {
    /// Partition key every write uses.
    pub const PARTITION_KEY: &'static str = "Product";

    /// Stock at or below this level counts as low.
    pub const LOW_STOCK_THRESHOLD: i32 = 5;

    /// Create an active product with a fresh id under the canonical partition.
    #[must_use]
    pub fn new(name: impl Into<String>, price: Price, stock_quantity: i32) -> Self {
        Self {
            name: name.into(),
            price,
            stock_quantity,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn is_out_of_stock(&self) -> bool {
        self.stock_quantity <= 0
    }

    #[must_use]
    pub const fn is_low_stock(&self) -> bool {
        self.stock_quantity > 0 && self.stock_quantity <= Self::LOW_STOCK_THRESHOLD
    }
}

impl Default for Product {
    fn default() -> Self {
        Self {
            id: ProductId::generate(),
            partition_key: Self::PARTITION_KEY.to_owned(),
            etag: None,
            name: String::new(),
            description: String::new(),
            price: Price::ZERO,
            stock_quantity: 0,
            category: String::new(),
            brand: String::new(),
            image_url: String::new(),
            is_active: true,
            created_date: Utc::now(),
            last_modified_date: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_levels() {
        let mut p = Product::new("Widget", Price::from_cents(999), 5);
        assert!(p.is_low_stock());
        p.stock_quantity = 0;
        assert!(p.is_out_of_stock());
        assert!(!p.is_low_stock());
        p.stock_quantity = 40;
        assert!(!p.is_low_stock());
    }
}
