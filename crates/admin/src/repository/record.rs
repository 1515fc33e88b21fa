//! Mapping between domain records and table rows.
//!
//! Property names follow the PascalCase convention already used by other
//! writers of the same tables (`FirstName`, `StockQuantity`, ...), so rows
//! written by any of them read back the same way.

use abc_retail_core::{Customer, CustomerId, Order, OrderId, OrderItem, Price, Product, ProductId};
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::storage::{StorageError, TableEntity};

/// A table row could not be turned into a record.
#[derive(Debug, Error)]
#[error("invalid {kind} row '{row_key}': {reason}")]
pub struct RecordError {
    pub kind: &'static str,
    pub row_key: String,
    pub reason: String,
}

impl RecordError {
    fn new(kind: &'static str, entity: &TableEntity, reason: impl Into<String>) -> Self {
        Self {
            kind,
            row_key: entity.row_key.clone(),
            reason: reason.into(),
        }
    }
}

impl From<RecordError> for StorageError {
    fn from(err: RecordError) -> Self {
        Self::Decode(err.to_string())
    }
}

/// A record stored as one table row under a canonical partition key.
pub trait TableRecord: Clone + Send + Sync + 'static {
    /// Human name used in logs and errors.
    const KIND: &'static str;
    /// Partition key every write uses.
    const PARTITION_KEY: &'static str;

    fn row_key(&self) -> &str;
    fn partition_key(&self) -> &str;
    fn set_partition_key(&mut self, partition_key: String);
    fn etag(&self) -> Option<&str>;
    fn set_etag(&mut self, etag: Option<String>);

    /// Row for this record, at the record's current partition key.
    fn to_entity(&self) -> TableEntity;

    /// Record from a row. Keys and version tag come from the row.
    ///
    /// # Errors
    ///
    /// Returns `RecordError` if a required property is missing or malformed.
    fn from_entity(entity: TableEntity) -> Result<Self, RecordError>;

    /// Copy the caller-editable fields onto `fresh`. Keys, version tag and
    /// creation date stay as they are on `fresh`.
    fn overlay_onto(&self, fresh: &mut Self);

    /// Ordering key for listings (newest first).
    fn sort_key(&self) -> DateTime<Utc>;

    /// Hook run before every update.
    fn touch(&mut self) {}
}

/// Alternate spellings of a canonical partition key: plural, lowercase and
/// lowercase plural. `"Customer"` gives `["Customers", "customer", "customers"]`.
#[must_use]
pub fn partition_aliases(canonical: &str) -> Vec<String> {
    let plural = format!("{canonical}s");
    let lower = canonical.to_lowercase();
    let lower_plural = plural.to_lowercase();
    let mut aliases = Vec::with_capacity(3);
    for alias in [plural, lower, lower_plural] {
        if alias != canonical && !aliases.contains(&alias) {
            aliases.push(alias);
        }
    }
    aliases
}

fn created_or_timestamp(entity: &TableEntity, name: &str) -> DateTime<Utc> {
    entity
        .get_datetime(name)
        .or(entity.timestamp)
        .unwrap_or_else(Utc::now)
}

fn price_property(
    kind: &'static str,
    entity: &TableEntity,
    name: &str,
) -> Result<Price, RecordError> {
    match entity.get_f64(name) {
        None => Ok(Price::ZERO),
        Some(value) => Price::from_f64(value)
            .map_err(|e| RecordError::new(kind, entity, format!("{name}: {e}"))),
    }
}

fn i32_property(kind: &'static str, entity: &TableEntity, name: &str) -> Result<i32, RecordError> {
    entity.get_i64(name).map_or(Ok(0), |value| {
        i32::try_from(value).map_err(|_| RecordError::new(kind, entity, format!("{name} out of range")))
    })
}

impl TableRecord for Customer {
    const KIND: &'static str = "customer";
    const PARTITION_KEY: &'static str = Self::PARTITION_KEY;

    fn row_key(&self) -> &str {
        self.id.as_str()
    }

    fn partition_key(&self) -> &str {
        &self.partition_key
    }

    fn set_partition_key(&mut self, partition_key: String) {
        self.partition_key = partition_key;
    }

    fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    fn set_etag(&mut self, etag: Option<String>) {
        self.etag = etag;
    }

    fn to_entity(&self) -> TableEntity {
        TableEntity::new(&self.partition_key, self.id.as_str())
            .with("FirstName", self.first_name.as_str())
            .with("LastName", self.last_name.as_str())
            .with("Email", self.email.as_str())
            .with("Phone", self.phone.as_str())
            .with("Address", self.address.as_str())
            .with("City", self.city.as_str())
            .with("State", self.state.as_str())
            .with("ZipCode", self.zip_code.as_str())
            .with("IsActive", self.is_active)
            .with_datetime("CreatedDate", Some(self.created_date))
    }

    fn from_entity(entity: TableEntity) -> Result<Self, RecordError> {
        if entity.row_key.is_empty() {
            return Err(RecordError::new(Self::KIND, &entity, "empty row key"));
        }
        Ok(Self {
            first_name: entity.string_or_default("FirstName"),
            last_name: entity.string_or_default("LastName"),
            email: entity.string_or_default("Email"),
            phone: entity.string_or_default("Phone"),
            address: entity.string_or_default("Address"),
            city: entity.string_or_default("City"),
            state: entity.string_or_default("State"),
            zip_code: entity.string_or_default("ZipCode"),
            is_active: entity.get_bool("IsActive").unwrap_or(true),
            created_date: created_or_timestamp(&entity, "CreatedDate"),
            id: CustomerId::new(entity.row_key),
            partition_key: entity.partition_key,
            etag: entity.etag,
        })
    }

    fn overlay_onto(&self, fresh: &mut Self) {
        fresh.first_name.clone_from(&self.first_name);
        fresh.last_name.clone_from(&self.last_name);
        fresh.email.clone_from(&self.email);
        fresh.phone.clone_from(&self.phone);
        fresh.address.clone_from(&self.address);
        fresh.city.clone_from(&self.city);
        fresh.state.clone_from(&self.state);
        fresh.zip_code.clone_from(&self.zip_code);
        fresh.is_active = self.is_active;
    }

    fn sort_key(&self) -> DateTime<Utc> {
        self.created_date
    }
}

impl TableRecord for Product {
    const KIND: &'static str = "product";
    const PARTITION_KEY: &'static str = Self::PARTITION_KEY;

    fn row_key(&self) -> &str {
        self.id.as_str()
    }

    fn partition_key(&self) -> &str {
        &self.partition_key
    }

    fn set_partition_key(&mut self, partition_key: String) {
        self.partition_key = partition_key;
    }

    fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    fn set_etag(&mut self, etag: Option<String>) {
        self.etag = etag;
    }

    fn to_entity(&self) -> TableEntity {
        TableEntity::new(&self.partition_key, self.id.as_str())
            .with("Name", self.name.as_str())
            .with("Description", self.description.as_str())
            .with_double("Price", self.price.to_f64())
            .with("StockQuantity", self.stock_quantity)
            .with("Category", self.category.as_str())
            .with("Brand", self.brand.as_str())
            .with("ImageUrl", self.image_url.as_str())
            .with("IsActive", self.is_active)
            .with_datetime("CreatedDate", Some(self.created_date))
            .with_datetime("LastModifiedDate", self.last_modified_date)
    }

    fn from_entity(entity: TableEntity) -> Result<Self, RecordError> {
        if entity.row_key.is_empty() {
            return Err(RecordError::new(Self::KIND, &entity, "empty row key"));
        }
        Ok(Self {
            name: entity.string_or_default("Name"),
            description: entity.string_or_default("Description"),
            price: price_property(Self::KIND, &entity, "Price")?,
            stock_quantity: i32_property(Self::KIND, &entity, "StockQuantity")?,
            category: entity.string_or_default("Category"),
            brand: entity.string_or_default("Brand"),
            image_url: entity.string_or_default("ImageUrl"),
            is_active: entity.get_bool("IsActive").unwrap_or(true),
            created_date: created_or_timestamp(&entity, "CreatedDate"),
            last_modified_date: entity.get_datetime("LastModifiedDate"),
            id: ProductId::new(entity.row_key),
            partition_key: entity.partition_key,
            etag: entity.etag,
        })
    }

    fn overlay_onto(&self, fresh: &mut Self) {
        fresh.name.clone_from(&self.name);
        fresh.description.clone_from(&self.description);
        fresh.price = self.price;
        fresh.stock_quantity = self.stock_quantity;
        fresh.category.clone_from(&self.category);
        fresh.brand.clone_from(&self.brand);
        fresh.image_url.clone_from(&self.image_url);
        fresh.is_active = self.is_active;
        fresh.last_modified_date = self.last_modified_date;
    }

    fn sort_key(&self) -> DateTime<Utc> {
        self.created_date
    }

    fn touch(&mut self) {
        self.last_modified_date = Some(Utc::now());
    }
}

impl TableRecord for Order {
    const KIND: &'static str = "order";
    const PARTITION_KEY: &'static str = Self::PARTITION_KEY;

    fn row_key(&self) -> &str {
        self.id.as_str()
    }

    fn partition_key(&self) -> &str {
        &self.partition_key
    }

    fn set_partition_key(&mut self, partition_key: String) {
        self.partition_key = partition_key;
    }

    fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    fn set_etag(&mut self, etag: Option<String>) {
        self.etag = etag;
    }

    fn to_entity(&self) -> TableEntity {
        // Tables have no array type; items travel as a JSON string.
        let items = serde_json::to_string(&self.items).unwrap_or_else(|_| "[]".to_owned());
        TableEntity::new(&self.partition_key, self.id.as_str())
            .with("CustomerId", self.customer_id.as_str())
            .with("CustomerName", self.customer_name.as_str())
            .with("Items", items)
            .with_double("TotalAmount", self.total_amount.to_f64())
            .with("Status", self.status.as_str())
            .with_datetime("OrderDate", Some(self.order_date))
            .with_datetime("ShippedDate", self.shipped_date)
            .with("ShippingAddress", self.shipping_address.as_str())
            .with("Notes", self.notes.as_str())
    }

    fn from_entity(entity: TableEntity) -> Result<Self, RecordError> {
        if entity.row_key.is_empty() {
            return Err(RecordError::new(Self::KIND, &entity, "empty row key"));
        }
        let items: Vec<OrderItem> = match entity.get_str("Items") {
            None | Some("") => Vec::new(),
            Some(raw) => serde_json::from_str(raw)
                .map_err(|e| RecordError::new(Self::KIND, &entity, format!("Items: {e}")))?,
        };
        let status = match entity.get_str("Status") {
            Some(status) if !status.is_empty() => status.to_owned(),
            _ => Self::DEFAULT_STATUS.to_owned(),
        };
        Ok(Self {
            customer_id: CustomerId::new(entity.string_or_default("CustomerId")),
            customer_name: entity.string_or_default("CustomerName"),
            items,
            total_amount: price_property(Self::KIND, &entity, "TotalAmount")?,
            status,
            order_date: created_or_timestamp(&entity, "OrderDate"),
            shipped_date: entity.get_datetime("ShippedDate"),
            shipping_address: entity.string_or_default("ShippingAddress"),
            notes: entity.string_or_default("Notes"),
            id: OrderId::new(entity.row_key),
            partition_key: entity.partition_key,
            etag: entity.etag,
        })
    }

    fn overlay_onto(&self, fresh: &mut Self) {
        fresh.customer_id = self.customer_id.clone();
        fresh.customer_name.clone_from(&self.customer_name);
        fresh.items.clone_from(&self.items);
        fresh.total_amount = self.total_amount;
        fresh.status.clone_from(&self.status);
        fresh.shipped_date = self.shipped_date;
        fresh.shipping_address.clone_from(&self.shipping_address);
        fresh.notes.clone_from(&self.notes);
    }

    fn sort_key(&self) -> DateTime<Utc> {
        self.order_date
    }
}
