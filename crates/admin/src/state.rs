//! Application state shared across handlers.

use std::sync::Arc;

use abc_retail_core::{Customer, Order, Product};
use secrecy::SecretString;

use crate::config::{AdminConfig, BackendConfig};
use crate::repository::{Repository, UpdatePolicy};
use crate::services::InventoryQueueService;
use crate::storage::{BackendError, Backends};

/// Repositories and the queue service. Everything except HTTP concerns, so
/// the CLI can use it without an API key.
#[derive(Debug, Clone)]
pub struct Stores {
    pub customers: Repository<Customer>,
    pub products: Repository<Product>,
    pub orders: Repository<Order>,
    pub inventory: InventoryQueueService,
}

impl Stores {
    #[must_use]
    pub fn new(backends: Backends, policy: UpdatePolicy) -> Self {
        Self {
            customers: Repository::new(backends.customers, policy),
            products: Repository::new(backends.products, policy),
            orders: Repository::new(backends.orders, policy),
            inventory: InventoryQueueService::new(backends.queue),
        }
    }

    /// Build backends from configuration and wrap them.
    ///
    /// # Errors
    ///
    /// Returns an error if a backend cannot be constructed.
    pub fn from_config(config: &BackendConfig) -> Result<Self, BackendError> {
        let backends = Backends::from_config(config)?;
        let policy = UpdatePolicy {
            allow_recreate: config.allow_lossy_recreate,
        };
        Ok(Self::new(backends, policy))
    }
}

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    api_key: SecretString,
    stores: Stores,
}

impl AppState {
    #[must_use]
    pub fn new(backends: Backends, api_key: SecretString, policy: UpdatePolicy) -> Self {
        Self::with_stores(Stores::new(backends, policy), api_key)
    }

    #[must_use]
    pub fn with_stores(stores: Stores, api_key: SecretString) -> Self {
        Self {
            inner: Arc::new(AppStateInner { api_key, stores }),
        }
    }

    /// Build backends from configuration and wrap them.
    ///
    /// # Errors
    ///
    /// Returns an error if a backend cannot be constructed.
    pub fn from_config(config: &AdminConfig) -> Result<Self, BackendError> {
        let stores = Stores::from_config(&config.backends)?;
        Ok(Self::with_stores(stores, config.api_key.clone()))
    }

    #[must_use]
    pub fn api_key(&self) -> &SecretString {
        &self.inner.api_key
    }

    #[must_use]
    pub fn stores(&self) -> &Stores {
        &self.inner.stores
    }

    #[must_use]
    pub fn customers(&self) -> &Repository<Customer> {
        &self.inner.stores.customers
    }

    #[must_use]
    pub fn products(&self) -> &Repository<Product> {
        &self.inner.stores.products
    }

    #[must_use]
    pub fn orders(&self) -> &Repository<Order> {
        &self.inner.stores.orders
    }

    #[must_use]
    pub fn inventory(&self) -> &InventoryQueueService {
        &self.inner.stores.inventory
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("stores", &self.inner.stores)
            .finish_non_exhaustive()
    }
}
