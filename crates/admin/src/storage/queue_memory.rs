//! In-memory queue backend with visibility windows and pop receipts.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::queue::{MAX_BATCH, QueueError, QueueStore, RawQueueMessage, clamp_visibility};

#[derive(Debug, Clone)]
struct Stored {
    id: String,
    text: String,
    inserted: DateTime<Utc>,
    visible_at: DateTime<Utc>,
    pop_receipt: Option<String>,
    dequeue_count: u32,
}

impl Stored {
    fn to_raw(&self, with_receipt: bool) -> RawQueueMessage {
        RawQueueMessage {
            message_id: self.id.clone(),
            pop_receipt: if with_receipt {
                self.pop_receipt.clone()
            } else {
                None
            },
            dequeue_count: self.dequeue_count,
            insertion_time: Some(self.inserted),
            text: self.text.clone(),
        }
    }
}

/// In-memory [`QueueStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryQueue {
    messages: Arc<RwLock<Vec<Stored>>>,
    transient_delete_failures: Arc<AtomicUsize>,
    delete_attempts: Arc<AtomicUsize>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` deletes fail with a 503.
    pub fn fail_next_deletes(&self, n: usize) {
        self.transient_delete_failures.store(n, Ordering::SeqCst);
    }

    /// Number of delete calls seen, including failed ones.
    #[must_use]
    pub fn delete_attempts(&self) -> usize {
        self.delete_attempts.load(Ordering::SeqCst)
    }

    /// Make every call fail with a 503.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), QueueError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(QueueError::Api {
                status: 503,
                message: "queue unavailable".into(),
            });
        }
        Ok(())
    }

    fn lock_error() -> QueueError {
        QueueError::Api {
            status: 500,
            message: "lock poisoned".into(),
        }
    }
}

#[async_trait]
impl QueueStore for MemoryQueue {
    async fn send(&self, text: &str) -> Result<(), QueueError> {
        self.check_available()?;
        let now = Utc::now();
        let mut messages = self.messages.write().map_err(|_| Self::lock_error())?;
        messages.push(Stored {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.to_owned(),
            inserted: now,
            visible_at: now,
            pop_receipt: None,
            dequeue_count: 0,
        });
        Ok(())
    }

    async fn peek(&self, max: u8) -> Result<Vec<RawQueueMessage>, QueueError> {
        self.check_available()?;
        let now = Utc::now();
        let messages = self.messages.read().map_err(|_| Self::lock_error())?;
        Ok(messages
            .iter()
            .filter(|m| m.visible_at <= now)
            .take(usize::from(max.clamp(1, MAX_BATCH)))
            .map(|m| m.to_raw(false))
            .collect())
    }

    async fn receive(
        &self,
        max: u8,
        visibility: Duration,
    ) -> Result<Vec<RawQueueMessage>, QueueError> {
        self.check_available()?;
        let now = Utc::now();
        let hidden_until = now
            + chrono::Duration::from_std(clamp_visibility(visibility))
                .map_err(|e| QueueError::Encoding(e.to_string()))?;
        let mut messages = self.messages.write().map_err(|_| Self::lock_error())?;
        Ok(messages
            .iter_mut()
            .filter(|m| m.visible_at <= now)
            .take(usize::from(max.clamp(1, MAX_BATCH)))
            .map(|m| {
                m.visible_at = hidden_until;
                m.dequeue_count += 1;
                m.pop_receipt = Some(uuid::Uuid::new_v4().to_string());
                m.to_raw(true)
            })
            .collect())
    }

    async fn delete(&self, message_id: &str, pop_receipt: &str) -> Result<(), QueueError> {
        self.delete_attempts.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let pending_failures = self.transient_delete_failures.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.transient_delete_failures
                .store(pending_failures - 1, Ordering::SeqCst);
            return Err(QueueError::Api {
                status: 503,
                message: "server busy".into(),
            });
        }

        let mut messages = self.messages.write().map_err(|_| Self::lock_error())?;
        let position = messages
            .iter()
            .position(|m| m.id == message_id && m.pop_receipt.as_deref() == Some(pop_receipt))
            .ok_or_else(|| QueueError::Api {
                status: 404,
                message: "message not found or pop receipt does not match".into(),
            })?;
        messages.remove(position);
        Ok(())
    }

    async fn clear(&self) -> Result<(), QueueError> {
        self.check_available()?;
        self.messages
            .write()
            .map_err(|_| Self::lock_error())?
            .clear();
        Ok(())
    }

    async fn approximate_count(&self) -> Result<u64, QueueError> {
        self.check_available()?;
        let messages = self.messages.read().map_err(|_| Self::lock_error())?;
        Ok(messages.len() as u64)
    }
}
