//! Domain records stored in table storage and on the inventory queue.
//!
//! Each table-backed record carries its own partition key and version tag
//! alongside the business fields. Rows written by other tools do not always
//! use the canonical partition key, so the key read from storage is kept as
//! is while writes use the record's `PARTITION_KEY` constant.

pub mod customer;
pub mod inventory;
pub mod order;
pub mod product;

pub use customer::Customer;
pub use inventory::{Delivery, InventoryQueueMessage, ReceivedMessage};
pub use order::{Order, OrderItem};
pub use product::Product;
