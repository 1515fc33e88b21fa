//! Inventory queue inspection.

use abc_retail_admin::state::Stores;
use tracing::{info, warn};

use super::{CommandError, print_json};

fn warn_if_disabled(stores: &Stores) {
    if !stores.inventory.is_enabled() {
        warn!("AZURE_QUEUE_SAS_URL not set; the inventory queue is disabled");
    }
}

/// Print up to `max` messages as JSON without hiding them.
///
/// # Errors
///
/// Returns the queue error, or an error if writing to stdout fails.
pub async fn peek(stores: &Stores, max: u8) -> Result<(), CommandError> {
    warn_if_disabled(stores);
    let messages = stores.inventory.peek(max).await?;
    info!(count = messages.len(), "Peeked messages");
    print_json(&messages)
}

/// Log the approximate message count.
///
/// # Errors
///
/// Returns the queue error.
pub async fn length(stores: &Stores) -> Result<(), CommandError> {
    warn_if_disabled(stores);
    let length = stores.inventory.length().await?;
    info!("Approximate queue length: {length}");
    Ok(())
}

/// Delete every message.
///
/// # Errors
///
/// Returns `QueueError::NotConfigured` when disabled, or the backend error.
pub async fn clear(stores: &Stores) -> Result<(), CommandError> {
    stores.inventory.clear().await?;
    info!("Inventory queue cleared");
    Ok(())
}
