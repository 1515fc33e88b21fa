//! Record access over table storage.
//!
//! Every write goes to the record kind's canonical partition key. Reads go
//! through the resolver so rows left under other spellings are still found.

pub mod record;
pub mod resolver;
pub mod updater;

use std::marker::PhantomData;

use serde::Serialize;
use tracing::{info, instrument, warn};

pub use record::{RecordError, TableRecord, partition_aliases};
pub use resolver::{Diagnosis, Probe, ProbeOutcome, ResolveStep, Resolved};
pub use updater::{Attempt, UpdateError, UpdateOutcome, UpdatePolicy, UpdateStrategy};

use crate::storage::{IfMatch, StorageError, TableHandle};

/// Largest page a listing returns.
pub const MAX_PAGE_SIZE: usize = 100;
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// One page of a listing.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based.
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub total_pages: usize,
}

impl<T> Page<T> {
    /// Slice `all` into a page. `page` is clamped to at least 1 and
    /// `page_size` to `1..=max`.
    #[must_use]
    pub fn slice(all: Vec<T>, page: usize, page_size: usize, max: usize) -> Self {
        let page = page.max(1);
        let page_size = page_size.clamp(1, max);
        let total = all.len();
        let items = all
            .into_iter()
            .skip((page - 1).saturating_mul(page_size))
            .take(page_size)
            .collect();
        Self {
            items,
            page,
            page_size,
            total,
            total_pages: total.div_ceil(page_size),
        }
    }
}

/// Access to one record kind.
#[derive(Debug, Clone)]
pub struct Repository<T> {
    table: TableHandle,
    policy: UpdatePolicy,
    _record: PhantomData<fn() -> T>,
}

impl<T: TableRecord> Repository<T> {
    #[must_use]
    pub const fn new(table: TableHandle, policy: UpdatePolicy) -> Self {
        Self {
            table,
            policy,
            _record: PhantomData,
        }
    }

    #[must_use]
    pub const fn table(&self) -> &TableHandle {
        &self.table
    }

    /// Insert a new record under the canonical partition key.
    ///
    /// Row keys are unique across every partition spelling, so an id that
    /// resolves anywhere counts as taken.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the id is taken, or any backend error.
    #[instrument(skip(self, record), fields(kind = T::KIND, id = record.row_key()))]
    pub async fn create(&self, record: T) -> Result<T, StorageError> {
        if let Some(existing) = self.resolve(record.row_key()).await {
            warn!(partition_key = existing.record.partition_key(), "Id already taken");
            return Err(StorageError::Conflict);
        }
        let mut record = record;
        record.set_partition_key(T::PARTITION_KEY.to_owned());
        record.set_etag(None);
        let inserted = self.table.store.insert(&record.to_entity()).await?;
        record.set_etag(inserted.etag);
        info!("Created");
        Ok(record)
    }

    /// Find a record by id.
    pub async fn get(&self, id: &str) -> Option<T> {
        self.resolve(id).await.map(|resolved| resolved.record)
    }

    /// Find a record by id, reporting which step found it.
    pub async fn resolve(&self, id: &str) -> Option<Resolved<T>> {
        resolver::resolve(&self.table, id).await
    }

    /// Every record, newest first.
    pub async fn all(&self) -> Vec<T> {
        resolver::list_all(&self.table).await
    }

    /// One page of records, newest first.
    pub async fn list(&self, page: usize, page_size: usize) -> Page<T> {
        Page::slice(self.all().await, page, page_size, MAX_PAGE_SIZE)
    }

    /// Persist an edited record.
    ///
    /// # Errors
    ///
    /// Returns `UpdateError::Exhausted` when every enabled strategy failed.
    pub async fn update(&self, record: T) -> Result<UpdateOutcome<T>, UpdateError> {
        updater::update(&self.table, record, self.policy).await
    }

    /// Delete a record wherever it lives. `Ok(false)` if it was not found.
    ///
    /// # Errors
    ///
    /// Returns any backend error from the delete call.
    #[instrument(skip(self), fields(kind = T::KIND))]
    pub async fn delete(&self, id: &str) -> Result<bool, StorageError> {
        let Some(resolved) = self.resolve(id).await else {
            return Ok(false);
        };
        let partition_key = resolved.record.partition_key();
        match self.table.store.delete(partition_key, id, IfMatch::Any).await {
            Ok(()) => {
                info!(partition_key, "Deleted");
                Ok(true)
            }
            Err(StorageError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Probe every resolver step for `id`.
    pub async fn diagnose(&self, id: &str) -> Diagnosis {
        resolver::diagnose::<T>(&self.table, id).await
    }

    /// Cheap reachability check: one point lookup.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the lookup fails.
    pub async fn ping(&self) -> Result<(), StorageError> {
        self.table
            .store
            .get_entity(T::PARTITION_KEY, "readiness-probe")
            .await
            .map(|_| ())
    }
}
