//! Message queue abstraction.
//!
//! Backends move opaque message text. Encoding of the inventory payload lives
//! in the inventory queue service.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Most messages a single peek or receive may return.
pub const MAX_BATCH: u8 = 32;

/// Shortest visibility timeout the queue accepts.
pub const MIN_VISIBILITY: Duration = Duration::from_secs(1);
/// Longest visibility timeout the queue accepts (seven days).
pub const MAX_VISIBILITY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Clamp a visibility timeout into the range the queue accepts.
#[must_use]
pub fn clamp_visibility(visibility: Duration) -> Duration {
    visibility.clamp(MIN_VISIBILITY, MAX_VISIBILITY)
}

/// Errors returned by queue backends.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Transport-level failure.
    #[error("queue request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with an unexpected status.
    #[error("queue API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The XML response could not be parsed.
    #[error("could not parse queue response: {0}")]
    Xml(String),

    /// A message body could not be encoded or decoded.
    #[error("message encoding error: {0}")]
    Encoding(String),

    /// No queue is configured.
    #[error("inventory queue is not configured")]
    NotConfigured,
}

impl QueueError {
    /// Whether retrying the same call may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Xml(_) | Self::Encoding(_) | Self::NotConfigured => false,
        }
    }
}

/// A message as stored on the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawQueueMessage {
    pub message_id: String,
    /// Set on received messages only.
    pub pop_receipt: Option<String>,
    pub dequeue_count: u32,
    pub insertion_time: Option<DateTime<Utc>>,
    pub text: String,
}

/// Access to one queue.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Enqueue a message with the given text.
    async fn send(&self, text: &str) -> Result<(), QueueError>;

    /// Read up to `max` visible messages without hiding them.
    async fn peek(&self, max: u8) -> Result<Vec<RawQueueMessage>, QueueError>;

    /// Read up to `max` visible messages and hide them for `visibility`.
    async fn receive(
        &self,
        max: u8,
        visibility: Duration,
    ) -> Result<Vec<RawQueueMessage>, QueueError>;

    /// Delete a received message. `pop_receipt` must be the one from the
    /// most recent receive.
    async fn delete(&self, message_id: &str, pop_receipt: &str) -> Result<(), QueueError>;

    /// Delete every message.
    async fn clear(&self) -> Result<(), QueueError>;

    /// Approximate number of messages.
    async fn approximate_count(&self) -> Result<u64, QueueError>;
}
