//! Demo data for empty tables and an empty queue.

use abc_retail_core::{
    Customer, InventoryAction, InventoryQueueMessage, MessagePriority, Price, Product,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::state::Stores;
use crate::storage::{QueueError, StorageError};

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("seeding table failed: {0}")]
    Storage(#[from] StorageError),
    #[error("seeding queue failed: {0}")]
    Queue(#[from] QueueError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedCustomer {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip_code: String,
}

impl From<SeedCustomer> for Customer {
    fn from(seed: SeedCustomer) -> Self {
        Self {
            phone: seed.phone,
            address: seed.address,
            city: seed.city,
            state: seed.state,
            zip_code: seed.zip_code,
            ..Self::new(seed.first_name, seed.last_name, seed.email)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedProduct {
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
}

impl From<SeedProduct> for Product {
    fn from(seed: SeedProduct) -> Self {
        Self {
            description: seed.description,
            category: seed.category,
            brand: seed.brand,
            image_url: seed.image_url,
            ..Self::new(seed.name, seed.price, seed.stock_quantity)
        }
    }
}

/// Records and messages to load. Deserializable from YAML or JSON.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub customers: Vec<SeedCustomer>,
    #[serde(default)]
    pub products: Vec<SeedProduct>,
    #[serde(default)]
    pub messages: Vec<InventoryQueueMessage>,
}

/// What a seeding run wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub customers: usize,
    pub products: usize,
    pub messages: usize,
}

fn customer(first: &str, last: &str, email: &str, phone: &str, city: &str, state: &str) -> SeedCustomer {
    SeedCustomer {
        first_name: first.to_owned(),
        last_name: last.to_owned(),
        email: email.to_owned(),
        phone: phone.to_owned(),
        address: String::new(),
        city: city.to_owned(),
        state: state.to_owned(),
        zip_code: String::new(),
    }
}

fn product(name: &str, description: &str, cents: u32, stock: i32, category: &str, brand: &str) -> SeedProduct {
    SeedProduct {
        name: name.to_owned(),
        description: description.to_owned(),
        price: Price::from_cents(cents),
        stock_quantity: stock,
        category: category.to_owned(),
        brand: brand.to_owned(),
        image_url: String::new(),
    }
}

fn message(
    kind: &str,
    product_name: &str,
    quantity: i32,
    action: InventoryAction,
    priority: MessagePriority,
    notes: &str,
    user_id: &str,
) -> InventoryQueueMessage {
    InventoryQueueMessage {
        kind: kind.to_owned(),
        priority,
        notes: notes.to_owned(),
        user_id: user_id.to_owned(),
        ..InventoryQueueMessage::stock_change("", product_name, quantity, action)
    }
}

impl SeedData {
    /// Built-in demo set.
    #[must_use]
    pub fn demo() -> Self {
        Self {
            customers: vec![
                customer("John", "Doe", "john.doe@email.com", "555-0101", "New York", "NY"),
                customer("Jane", "Smith", "jane.smith@email.com", "555-0102", "Los Angeles", "CA"),
                customer("Mike", "Johnson", "mike.johnson@email.com", "555-0103", "Chicago", "IL"),
            ],
            products: vec![
                product(
                    "Wireless Headphones",
                    "Noise-canceling wireless headphones with 30-hour battery life",
                    19_999,
                    50,
                    "Electronics",
                    "TechAudio",
                ),
                product("Smart Watch", "Fitness tracking smart watch", 29_999, 30, "Electronics", "SmartTech"),
                product("Coffee Maker", "Programmable 12-cup coffee maker", 8_999, 25, "Home & Kitchen", "BrewMaster"),
                product("Yoga Mat", "Non-slip exercise mat", 3_999, 100, "Sports & Fitness", "FitLife"),
            ],
            messages: vec![
                message(
                    "low_stock_alert",
                    "Laptop Computer",
                    5,
                    InventoryAction::LowStockAlert,
                    MessagePriority::High,
                    "Stock level below minimum threshold. Consider restocking.",
                    "system",
                ),
                message(
                    "inventory_update",
                    "Wireless Mouse",
                    25,
                    InventoryAction::Add,
                    MessagePriority::Normal,
                    "New shipment received. Update inventory count.",
                    "warehouse-001",
                ),
                message(
                    "restock_request",
                    "USB Keyboard",
                    50,
                    InventoryAction::RestockRequest,
                    MessagePriority::Urgent,
                    "Out of stock. Immediate restock required.",
                    "sales-001",
                ),
                message(
                    "inventory_audit",
                    "Monitor Stand",
                    12,
                    InventoryAction::InventoryAudit,
                    MessagePriority::Low,
                    "Physical count differs from system count. Audit required.",
                    "audit-001",
                ),
            ],
        }
    }
}

/// Load `data` into whichever of the tables and queue are empty.
///
/// # Errors
///
/// Returns the first storage or queue error.
#[instrument(skip(stores, data))]
pub async fn seed(stores: &Stores, data: &SeedData) -> Result<SeedReport, SeedError> {
    let mut report = SeedReport::default();

    if stores.customers.all().await.is_empty() {
        for seed in &data.customers {
            stores.customers.create(Customer::from(seed.clone())).await?;
            report.customers += 1;
        }
    } else {
        info!("Customers table not empty, skipping");
    }

    if stores.products.all().await.is_empty() {
        for seed in &data.products {
            stores.products.create(Product::from(seed.clone())).await?;
            report.products += 1;
        }
    } else {
        info!("Products table not empty, skipping");
    }

    let inventory = &stores.inventory;
    if !inventory.is_enabled() {
        warn!("Inventory queue disabled, skipping messages");
    } else if inventory.length().await? == 0 {
        for message in &data.messages {
            inventory.send(message.clone()).await?;
            report.messages += 1;
        }
    } else {
        info!("Inventory queue not empty, skipping");
    }

    info!(
        customers = report.customers,
        products = report.products,
        messages = report.messages,
        "Seeding finished"
    );
    Ok(report)
}
