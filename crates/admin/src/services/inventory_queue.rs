//! Inventory-change notifications on the queue.
//!
//! Messages travel as base64-encoded camelCase JSON. With no queue
//! configured the service is disabled: reads come back empty and writes fail
//! with `QueueError::NotConfigured`.

use std::sync::Arc;
use std::time::Duration;

use abc_retail_core::{
    Delivery, InventoryAction, InventoryQueueMessage, MessageId, MessagePriority, MessageStatus,
    Product, ReceivedMessage,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::repository::Page;
use crate::storage::{MAX_BATCH, QueueError, QueueStore, RawQueueMessage};

/// Default dashboard page size.
pub const DEFAULT_DASHBOARD_PAGE_SIZE: usize = 5;
/// Visibility timeout used when the caller gives none.
pub const DEFAULT_VISIBILITY: Duration = Duration::from_secs(30);

/// Bounded exponential backoff for retrying transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), without jitter.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Delay with up to 20% random jitter, still capped.
    fn jittered_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay(attempt);
        let jitter_ms = u64::try_from(delay.as_millis() / 5).unwrap_or(0);
        let jitter = Duration::from_millis(rand::rng().random_range(0..=jitter_ms));
        (delay + jitter).min(self.max_delay)
    }
}

/// Advisory message counts by status over a peeked batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub other: usize,
}

impl StatusCounts {
    fn tally<'a>(messages: impl IntoIterator<Item = &'a ReceivedMessage>) -> Self {
        let mut counts = Self::default();
        for received in messages {
            match received.message.status {
                MessageStatus::Pending => counts.pending += 1,
                MessageStatus::Processing => counts.processing += 1,
                MessageStatus::Completed => counts.completed += 1,
                MessageStatus::Failed => counts.failed += 1,
                MessageStatus::Other(_) => counts.other += 1,
            }
        }
        counts
    }
}

/// Read-only monitoring view of the queue.
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub enabled: bool,
    pub queue_length: u64,
    /// Counts over the peeked batch, not the whole queue.
    pub counts: StatusCounts,
    pub messages: Page<ReceivedMessage>,
}

/// Encode a message body for the queue.
///
/// # Errors
///
/// Returns `QueueError::Encoding` if the message cannot be serialized.
pub fn encode_message(message: &InventoryQueueMessage) -> Result<String, QueueError> {
    let json = serde_json::to_vec(message).map_err(|e| QueueError::Encoding(e.to_string()))?;
    Ok(BASE64.encode(json))
}

/// Decode a queue message. Accepts base64 JSON and plain JSON; anything else
/// comes back as a message whose `notes` hold the raw text.
#[must_use]
pub fn decode_message(raw: RawQueueMessage) -> ReceivedMessage {
    let parsed = BASE64
        .decode(raw.text.trim())
        .ok()
        .and_then(|bytes| serde_json::from_slice::<InventoryQueueMessage>(&bytes).ok())
        .or_else(|| serde_json::from_str::<InventoryQueueMessage>(&raw.text).ok());

    let message = parsed.unwrap_or_else(|| {
        debug!(message_id = %raw.message_id, "Undecodable queue message body");
        InventoryQueueMessage {
            id: MessageId::new(raw.message_id.as_str()),
            kind: "unknown".to_owned(),
            timestamp: raw.insertion_time.unwrap_or_else(Utc::now),
            notes: raw.text.clone(),
            ..InventoryQueueMessage::default()
        }
    });

    ReceivedMessage {
        message,
        delivery: Delivery {
            queue_message_id: raw.message_id,
            pop_receipt: raw.pop_receipt,
            dequeue_count: raw.dequeue_count,
            insertion_time: raw.insertion_time,
        },
    }
}

/// Notification sent after a product's stock was edited.
#[must_use]
pub fn stock_updated(product: &Product, user_id: &str) -> InventoryQueueMessage {
    InventoryQueueMessage {
        priority: if product.is_out_of_stock() || product.is_low_stock() {
            MessagePriority::High
        } else {
            MessagePriority::Normal
        },
        notes: format!(
            "Product '{}' updated. New stock quantity: {}",
            product.name, product.stock_quantity
        ),
        user_id: user_id.to_owned(),
        ..InventoryQueueMessage::stock_change(
            product.id.as_str(),
            product.name.as_str(),
            product.stock_quantity,
            InventoryAction::Update,
        )
    }
}

/// Notification sent after a product was deleted.
#[must_use]
pub fn product_removed(product: &Product, user_id: &str) -> InventoryQueueMessage {
    InventoryQueueMessage {
        priority: MessagePriority::High,
        notes: format!("Product '{}' deleted from inventory", product.name),
        user_id: user_id.to_owned(),
        ..InventoryQueueMessage::stock_change(
            product.id.as_str(),
            product.name.as_str(),
            0,
            InventoryAction::Remove,
        )
    }
}

/// Producer and monitor for the inventory queue.
#[derive(Clone)]
pub struct InventoryQueueService {
    queue: Option<Arc<dyn QueueStore>>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for InventoryQueueService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InventoryQueueService")
            .field("enabled", &self.queue.is_some())
            .field("retry", &self.retry)
            .finish()
    }
}

impl InventoryQueueService {
    #[must_use]
    pub fn new(queue: Option<Arc<dyn QueueStore>>) -> Self {
        Self {
            queue,
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.queue.is_some()
    }

    fn queue(&self) -> Result<&Arc<dyn QueueStore>, QueueError> {
        self.queue.as_ref().ok_or(QueueError::NotConfigured)
    }

    /// Enqueue a message. A fresh id and timestamp are assigned and the
    /// status is forced to pending. Returns the message as sent.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::NotConfigured` when disabled, or the backend error.
    #[instrument(skip(self, message), fields(product_id = %message.product_id, action = %message.action))]
    pub async fn send(
        &self,
        message: InventoryQueueMessage,
    ) -> Result<InventoryQueueMessage, QueueError> {
        let queue = self.queue()?;
        let message = InventoryQueueMessage {
            id: MessageId::generate(),
            timestamp: Utc::now(),
            status: MessageStatus::Pending,
            ..message
        };
        queue.send(&encode_message(&message)?).await?;
        info!(message_id = %message.id, "Inventory message sent");
        Ok(message)
    }

    /// Read up to `max` messages without hiding them.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    #[instrument(skip(self))]
    pub async fn peek(&self, max: u8) -> Result<Vec<ReceivedMessage>, QueueError> {
        let Some(queue) = &self.queue else {
            return Ok(Vec::new());
        };
        let raw = queue.peek(max.clamp(1, MAX_BATCH)).await?;
        Ok(raw.into_iter().map(decode_message).collect())
    }

    /// Receive up to `max` messages, hiding them for `visibility`.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    #[instrument(skip(self))]
    pub async fn receive(
        &self,
        max: u8,
        visibility: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let Some(queue) = &self.queue else {
            return Ok(Vec::new());
        };
        let raw = queue.receive(max.clamp(1, MAX_BATCH), visibility).await?;
        debug!(count = raw.len(), "Received messages");
        Ok(raw.into_iter().map(decode_message).collect())
    }

    /// Delete a received message, retrying transient failures with backoff.
    ///
    /// # Errors
    ///
    /// Returns the last error once attempts run out, or the first
    /// non-transient one.
    #[instrument(skip(self, pop_receipt))]
    pub async fn delete(&self, message_id: &str, pop_receipt: &str) -> Result<(), QueueError> {
        let queue = self.queue()?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match queue.delete(message_id, pop_receipt).await {
                Ok(()) => {
                    info!(attempt, "Inventory message deleted");
                    return Ok(());
                }
                Err(error) if error.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.jittered_delay(attempt);
                    warn!(%error, attempt, delay_ms = delay.as_millis(), "Delete failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Remove every message.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::NotConfigured` when disabled, or the backend error.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<(), QueueError> {
        self.queue()?.clear().await?;
        info!("Inventory queue cleared");
        Ok(())
    }

    /// Approximate message count. 0 when disabled.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn length(&self) -> Result<u64, QueueError> {
        match &self.queue {
            Some(queue) => queue.approximate_count().await,
            None => Ok(0),
        }
    }

    /// Peek a full batch, newest first, with status counts and one page.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    #[instrument(skip(self))]
    pub async fn dashboard(&self, page: usize, page_size: usize) -> Result<Dashboard, QueueError> {
        let mut messages = self.peek(MAX_BATCH).await?;
        messages.sort_by(|a, b| b.message.timestamp.cmp(&a.message.timestamp));
        let counts = StatusCounts::tally(&messages);
        let queue_length = self.length().await?;
        Ok(Dashboard {
            enabled: self.is_enabled(),
            queue_length,
            counts,
            messages: Page::slice(messages, page, page_size, usize::from(MAX_BATCH)),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use abc_retail_core::Price;

    use super::*;
    use crate::storage::MemoryQueue;

    fn service() -> (MemoryQueue, InventoryQueueService) {
        let queue = MemoryQueue::new();
        let service = InventoryQueueService::new(Some(Arc::new(queue.clone())));
        (queue, service)
    }

    #[test]
    fn test_backoff_delays() {
        let retry = RetryPolicy::default();
        assert_eq!(retry.delay(1), Duration::from_millis(100));
        assert_eq!(retry.delay(2), Duration::from_millis(200));
        assert_eq!(retry.delay(3), Duration::from_millis(400));
        assert_eq!(retry.delay(10), Duration::from_secs(2));
        assert!(retry.jittered_delay(10) <= Duration::from_secs(2));
    }

    #[test]
    fn test_encoding_is_base64_camel_case() {
        let message = InventoryQueueMessage::stock_change("p-1", "Widget", 3, InventoryAction::Add);
        let encoded = encode_message(&message).unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&BASE64.decode(&encoded).unwrap()).unwrap();
        assert_eq!(json["productName"], "Widget");

        let raw = RawQueueMessage {
            message_id: "q-1".into(),
            pop_receipt: None,
            dequeue_count: 0,
            insertion_time: None,
            text: encoded,
        };
        assert_eq!(decode_message(raw).message, message);
    }

    #[test]
    fn test_undecodable_body_kept_in_notes() {
        let raw = RawQueueMessage {
            message_id: "q-2".into(),
            pop_receipt: None,
            dequeue_count: 1,
            insertion_time: None,
            text: "restock aisle 4".into(),
        };
        let decoded = decode_message(raw);
        assert_eq!(decoded.message.notes, "restock aisle 4");
        assert_eq!(decoded.message.id.as_str(), "q-2");
        assert_eq!(decoded.delivery.dequeue_count, 1);
    }

    #[test]
    fn test_plain_json_body_accepted() {
        let raw = RawQueueMessage {
            message_id: "q-3".into(),
            pop_receipt: None,
            dequeue_count: 0,
            insertion_time: None,
            text: r#"{"productId":"p-7","action":"audit_now","status":"processing"}"#.into(),
        };
        let decoded = decode_message(raw);
        assert_eq!(decoded.message.product_id, "p-7");
        assert_eq!(decoded.message.action, InventoryAction::Other("audit_now".into()));
        assert_eq!(decoded.message.status, MessageStatus::Processing);
    }

    #[tokio::test]
    async fn test_send_forces_pending_and_new_id() {
        let (_queue, service) = service();
        let mut message =
            InventoryQueueMessage::stock_change("p-1", "Widget", 3, InventoryAction::Add);
        message.status = MessageStatus::Completed;
        let original_id = message.id.clone();

        let sent = service.send(message).await.unwrap();
        assert_eq!(sent.status, MessageStatus::Pending);
        assert_ne!(sent.id, original_id);

        let peeked = service.peek(10).await.unwrap();
        assert_eq!(peeked[0].message, sent);
    }

    #[tokio::test]
    async fn test_peek_is_repeatable_and_receive_removes() {
        let (_queue, service) = service();
        for n in 0..3 {
            service
                .send(InventoryQueueMessage::stock_change("p", "W", n, InventoryAction::Add))
                .await
                .unwrap();
        }

        let first = service.peek(32).await.unwrap();
        let second = service.peek(32).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(service.length().await.unwrap(), 3);

        let received = service.receive(1, DEFAULT_VISIBILITY).await.unwrap();
        let delivery = &received[0].delivery;
        service
            .delete(
                &delivery.queue_message_id,
                delivery.pop_receipt.as_deref().unwrap(),
            )
            .await
            .unwrap();
        let after = service.peek(32).await.unwrap();
        assert_eq!(after.len(), 2);
        assert!(
            after
                .iter()
                .all(|m| m.delivery.queue_message_id != delivery.queue_message_id)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_retries_transient_failures() {
        let (queue, service) = service();
        service
            .send(InventoryQueueMessage::default())
            .await
            .unwrap();
        let received = service.receive(1, DEFAULT_VISIBILITY).await.unwrap();
        let delivery = &received[0].delivery;

        queue.fail_next_deletes(2);
        service
            .delete(
                &delivery.queue_message_id,
                delivery.pop_receipt.as_deref().unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(queue.delete_attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_gives_up_after_three_attempts() {
        let (queue, service) = service();
        queue.fail_next_deletes(5);
        let err = service.delete("m", "r").await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(queue.delete_attempts(), 3);
    }

    #[tokio::test]
    async fn test_delete_with_wrong_receipt_is_not_retried() {
        let (queue, service) = service();
        service
            .send(InventoryQueueMessage::default())
            .await
            .unwrap();
        let received = service.receive(1, DEFAULT_VISIBILITY).await.unwrap();

        let err = service
            .delete(&received[0].delivery.queue_message_id, "stale")
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Api { status: 404, .. }));
        assert_eq!(queue.delete_attempts(), 1);
    }

    #[tokio::test]
    async fn test_dashboard_counts_and_pages() {
        let (queue, service) = service();
        for n in 0..7 {
            service
                .send(InventoryQueueMessage::stock_change("p", "W", n, InventoryAction::Add))
                .await
                .unwrap();
        }
        // Another producer's message with an explicit status.
        queue
            .send(r#"{"productId":"p-x","status":"failed"}"#)
            .await
            .unwrap();

        let dashboard = service.dashboard(1, 0).await.unwrap();
        assert_eq!(dashboard.counts.pending, 7);
        assert_eq!(dashboard.counts.failed, 1);
        assert_eq!(dashboard.queue_length, 8);
        assert_eq!(dashboard.messages.page_size, 1);

        let page = service
            .dashboard(2, DEFAULT_DASHBOARD_PAGE_SIZE)
            .await
            .unwrap();
        assert_eq!(page.messages.items.len(), 3);
    }

    #[tokio::test]
    async fn test_disabled_service() {
        let service = InventoryQueueService::new(None);
        assert!(service.peek(5).await.unwrap().is_empty());
        assert_eq!(service.length().await.unwrap(), 0);
        assert!(matches!(
            service.send(InventoryQueueMessage::default()).await,
            Err(QueueError::NotConfigured)
        ));
        assert!(!service.dashboard(1, 5).await.unwrap().enabled);
    }

    #[test]
    fn test_stock_notifications() {
        let mut product = Product::new("Kettle", Price::from_cents(45_000), 3);
        let message = stock_updated(&product, "admin");
        assert_eq!(message.action, InventoryAction::Update);
        assert_eq!(message.priority, MessagePriority::High);
        assert_eq!(message.quantity, 3);
        assert_eq!(message.kind, "inventory_update");

        product.stock_quantity = 40;
        assert_eq!(stock_updated(&product, "admin").priority, MessagePriority::Normal);
        assert_eq!(product_removed(&product, "admin").action, InventoryAction::Remove);
    }
}
