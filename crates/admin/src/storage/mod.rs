//! Storage backends for tables and the inventory queue.
//!
//! Each concern has one trait and two implementations: HTTP against the
//! storage REST APIs, and in-memory for tests and local runs.

pub mod auth;
pub mod http_table;
pub mod memory;
pub mod queue;
pub mod queue_http;
pub mod queue_memory;
pub mod table;

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{BackendConfig, ConfigError};

pub use auth::TableCredentials;
pub use http_table::{HttpTable, HttpTableService, SasSnapshot};
pub use memory::{CallCounts, FaultSwitches, MemorySnapshot, MemoryTable};
pub use queue::{
    MAX_BATCH, MAX_VISIBILITY, MIN_VISIBILITY, QueueError, QueueStore, RawQueueMessage,
    clamp_visibility,
};
pub use queue_http::HttpQueue;
pub use queue_memory::MemoryQueue;
pub use table::{
    IfMatch, StorageError, TableEntity, TableSnapshot, TableStore, odata_literal, row_key_filter,
};

/// A table store plus its optional snapshot path.
#[derive(Clone)]
pub struct TableHandle {
    pub store: Arc<dyn TableStore>,
    pub snapshot: Option<Arc<dyn TableSnapshot>>,
}

impl TableHandle {
    #[must_use]
    pub fn new(store: Arc<dyn TableStore>, snapshot: Option<Arc<dyn TableSnapshot>>) -> Self {
        Self { store, snapshot }
    }

    /// Handle over an in-memory table, snapshot path included.
    #[must_use]
    pub fn memory(table: &MemoryTable) -> Self {
        Self {
            store: Arc::new(table.clone()),
            snapshot: Some(Arc::new(table.snapshot())),
        }
    }
}

impl std::fmt::Debug for TableHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableHandle")
            .field("table", &self.store.table_name())
            .field("snapshot", &self.snapshot.is_some())
            .finish()
    }
}

/// Longest error body echoed into a backend error.
const MAX_ERROR_BODY: usize = 512;

/// Cut an error body to at most [`MAX_ERROR_BODY`] bytes on a char boundary.
pub(crate) fn clip_error_body(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}

/// Every backend the service talks to.
#[derive(Clone)]
pub struct Backends {
    pub customers: TableHandle,
    pub products: TableHandle,
    pub orders: TableHandle,
    /// `None` disables the inventory queue.
    pub queue: Option<Arc<dyn QueueStore>>,
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends")
            .field("customers", &self.customers)
            .field("products", &self.products)
            .field("orders", &self.orders)
            .field("queue", &self.queue.is_some())
            .finish()
    }
}

impl Backends {
    /// Build backends from configuration.
    ///
    /// Tables without storage configuration fall back to memory. A missing
    /// queue URL leaves the queue disabled.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built or the queue URL is
    /// malformed.
    pub fn from_config(config: &BackendConfig) -> Result<Self, BackendError> {
        let tables = &config.tables;
        let (customers, products, orders) = if let Some(storage) = &config.storage {
            let mut service =
                HttpTableService::new(storage.endpoint.clone(), storage.credentials.clone())?;
            if let Some(sas) = &storage.snapshot_sas {
                service = service.with_snapshot_sas(sas.clone());
            }
            info!(endpoint = %storage.endpoint, "Using table storage");
            let handle = |name: &str| {
                TableHandle::new(
                    Arc::new(service.table(name)),
                    service
                        .snapshot(name)
                        .map(|s| Arc::new(s) as Arc<dyn TableSnapshot>),
                )
            };
            (
                handle(&tables.customers),
                handle(&tables.products),
                handle(&tables.orders),
            )
        } else {
            warn!("No table storage configured, using in-memory tables");
            (
                TableHandle::memory(&MemoryTable::new(&tables.customers)),
                TableHandle::memory(&MemoryTable::new(&tables.products)),
                TableHandle::memory(&MemoryTable::new(&tables.orders)),
            )
        };

        let queue = match &config.queue {
            Some(queue) => {
                let url = queue.queue_url(&config.queue_name)?;
                let queue = HttpQueue::new(&url)?;
                info!(queue = queue.queue_name(), "Using inventory queue");
                Some(Arc::new(queue) as Arc<dyn QueueStore>)
            }
            None => {
                warn!("AZURE_QUEUE_SAS_URL not set, inventory queue disabled");
                None
            }
        };

        Ok(Self {
            customers,
            products,
            orders,
            queue,
        })
    }
}

/// Errors building backends.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// In-memory backends that keep their concrete types, so tests can reach
/// counters and fault switches.
#[derive(Debug, Clone)]
pub struct MemoryBackends {
    pub customers: MemoryTable,
    pub products: MemoryTable,
    pub orders: MemoryTable,
    pub queue: MemoryQueue,
}

impl Default for MemoryBackends {
    fn default() -> Self {
        Self {
            customers: MemoryTable::new("Customers"),
            products: MemoryTable::new("Products"),
            orders: MemoryTable::new("Orders"),
            queue: MemoryQueue::new(),
        }
    }
}

impl MemoryBackends {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Type-erased view sharing the same rows and messages.
    #[must_use]
    pub fn backends(&self) -> Backends {
        Backends {
            customers: TableHandle::memory(&self.customers),
            products: TableHandle::memory(&self.products),
            orders: TableHandle::memory(&self.orders),
            queue: Some(Arc::new(self.queue.clone())),
        }
    }
}
