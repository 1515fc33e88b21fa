//! Order record and its line items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CustomerId, OrderId, Price, PriceError, ProductId};

/// A line on an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Price,
}

impl OrderItem {
    /// Quantity times unit price.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Overflow` if the line total is out of range.
    pub fn line_total(&self) -> Result<Price, PriceError> {
        self.unit_price.times(self.quantity)
    }
}

/// A customer order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub partition_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    pub customer_id: CustomerId,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    pub total_amount: Price,
    pub status: String,
    pub order_date: DateTime<Utc>,
    #[serde(default)]
    pub shipped_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub shipping_address: String,
    #[serde(default)]
    pub notes: String,
}

impl Order {
    /// Partition key every write uses.
    pub const PARTITION_KEY: &'static str = "Order";

    /// Status given to new orders.
    pub const DEFAULT_STATUS: &'static str = "Pending";

    /// Create a pending order for a customer with the total computed from `items`.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Overflow` if the total is out of range.
    pub fn new(customer_id: CustomerId, items: Vec<OrderItem>) -> Result<Self, PriceError> {
        let mut order = Self {
            customer_id,
            items,
            ..Self::default()
        };
        order.recompute_total()?;
        Ok(order)
    }

    /// Sum of line totals.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Overflow` if a line or the sum is out of range.
    pub fn items_total(&self) -> Result<Price, PriceError> {
        self.items
            .iter()
            .map(OrderItem::line_total)
            .try_fold(Price::ZERO, |total, line| total.checked_add(line?))
    }

    /// Overwrite `total_amount` with the sum of line totals.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Overflow` and leaves the total untouched if the
    /// sum is out of range.
    pub fn recompute_total(&mut self) -> Result<(), PriceError> {
        self.total_amount = self.items_total()?;
        Ok(())
    }
}

impl Default for Order {
    fn default() -> Self {
        Self {
            id: OrderId::generate(),
            partition_key: Self::PARTITION_KEY.to_owned(),
            etag: None,
            customer_id: CustomerId::new(""),
            customer_name: String::new(),
            items: Vec::new(),
            total_amount: Price::ZERO,
            status: Self::DEFAULT_STATUS.to_owned(),
            order_date: Utc::now(),
            shipped_date: None,
            shipping_address: String::new(),
            notes: String::new(),
        }
    }
}
