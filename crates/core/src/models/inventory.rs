//! Inventory-change notification carried on the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{InventoryAction, MessageId, MessagePriority, MessageStatus};

/// Body of an inventory queue message.
///
/// Serialized as camelCase JSON. Every field has a default so that bodies
/// from other producers with missing fields still decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InventoryQueueMessage {
    pub id: MessageId,
    #[serde(rename = "type")]
    pub kind: String,
    pub product_id: String,
    pub product_name: String,
    pub quantity: i32,
    pub action: InventoryAction,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub notes: String,
    pub priority: MessagePriority,
    pub status: MessageStatus,
}

impl InventoryQueueMessage {
    /// Message `type` used for stock notifications.
    pub const STOCK_CHANGE: &'static str = "inventory_update";

    /// A stock-change notification for a product.
    #[must_use]
    pub fn stock_change(
        product_id: impl Into<String>,
        product_name: impl Into<String>,
        quantity: i32,
        action: InventoryAction,
    ) -> Self {
        Self {
            kind: Self::STOCK_CHANGE.to_owned(),
            product_id: product_id.into(),
            product_name: product_name.into(),
            quantity,
            action,
            ..Self::default()
        }
    }
}

impl Default for InventoryQueueMessage {
    fn default() -> Self {
        Self {
            id: MessageId::generate(),
            kind: String::new(),
            product_id: String::new(),
            product_name: String::new(),
            quantity: 0,
            action: InventoryAction::default(),
            timestamp: Utc::now(),
            user_id: String::new(),
            notes: String::new(),
            priority: MessagePriority::default(),
            status: MessageStatus::default(),
        }
    }
}

/// Queue-side metadata for a message that was peeked or received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    /// Id assigned by the queue (distinct from the body's `id`).
    pub queue_message_id: String,
    /// Present only on received messages; needed to delete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pop_receipt: Option<String>,
    pub dequeue_count: u32,
    #[serde(default)]
    pub insertion_time: Option<DateTime<Utc>>,
}

/// A decoded message together with its delivery envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceivedMessage {
    #[serde(flatten)]
    pub message: InventoryQueueMessage,
    pub delivery: Delivery,
}
