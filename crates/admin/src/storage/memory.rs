//! In-memory table backend.
//!
//! Used by tests and by local runs without storage credentials. Behaves like
//! the real service where the service layer can observe it: version tags
//! change on every write, conditional writes fail on a stale tag, and inserts
//! collide on an existing key. Call counters and fault switches let tests
//! observe how many backend round trips a code path makes.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use super::table::{IfMatch, StorageError, TableEntity, TableSnapshot, TableStore, strip_annotations};

type Key = (String, String);

#[derive(Debug, Default)]
struct Shared {
    rows: RwLock<BTreeMap<Key, TableEntity>>,
    version: AtomicU64,
}

impl Shared {
    fn next_etag(&self) -> String {
        let n = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        format!("W/\"datetime'{n}'\"")
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<Key, TableEntity>>, StorageError> {
        self.rows
            .read()
            .map_err(|_| StorageError::Unavailable("lock poisoned".into()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<Key, TableEntity>>, StorageError> {
        self.rows
            .write()
            .map_err(|_| StorageError::Unavailable("lock poisoned".into()))
    }
}

/// Number of calls made to each [`TableStore`] method.
#[derive(Debug, Default)]
pub struct CallCounts {
    pub get_entity: AtomicUsize,
    pub query: AtomicUsize,
    pub insert: AtomicUsize,
    pub merge: AtomicUsize,
    pub delete: AtomicUsize,
}

impl CallCounts {
    /// Total reads (point lookups plus queries).
    #[must_use]
    pub fn reads(&self) -> usize {
        self.get_entity.load(Ordering::SeqCst) + self.query.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        for counter in [
            &self.get_entity,
            &self.query,
            &self.insert,
            &self.merge,
            &self.delete,
        ] {
            counter.store(0, Ordering::SeqCst);
        }
    }
}

/// Switches that make the store fail on purpose.
#[derive(Debug, Default)]
pub struct FaultSwitches {
    pub point_lookups: AtomicBool,
    pub queries: AtomicBool,
    pub writes: AtomicBool,
}

impl FaultSwitches {
    /// Fail every operation.
    pub fn fail_all(&self) {
        self.point_lookups.store(true, Ordering::SeqCst);
        self.queries.store(true, Ordering::SeqCst);
        self.writes.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.point_lookups.store(false, Ordering::SeqCst);
        self.queries.store(false, Ordering::SeqCst);
        self.writes.store(false, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool, op: &str) -> Result<(), StorageError> {
        if flag.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(format!("injected {op} failure")));
        }
        Ok(())
    }
}

/// In-memory [`TableStore`] for one table.
#[derive(Debug, Clone)]
pub struct MemoryTable {
    name: String,
    shared: Arc<Shared>,
    calls: Arc<CallCounts>,
    faults: Arc<FaultSwitches>,
}

impl MemoryTable {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shared: Arc::default(),
            calls: Arc::default(),
            faults: Arc::default(),
        }
    }

    #[must_use]
    pub fn calls(&self) -> &CallCounts {
        &self.calls
    }

    #[must_use]
    pub fn faults(&self) -> &FaultSwitches {
        &self.faults
    }

    /// A snapshot reader over the same rows. It ignores this store's fault
    /// switches, the way the pre-signed HTTP path keeps working when the
    /// primary client does not.
    #[must_use]
    pub fn snapshot(&self) -> MemorySnapshot {
        MemorySnapshot {
            shared: Arc::clone(&self.shared),
            unavailable: Arc::default(),
        }
    }

    /// Write a row directly, bypassing counters and faults. Lets tests plant
    /// rows under non-canonical partition keys.
    ///
    /// # Errors
    ///
    /// Returns an error only if the internal lock is poisoned.
    pub fn seed_row(&self, entity: TableEntity) -> Result<TableEntity, StorageError> {
        let mut stored = entity;
        strip_annotations(&mut stored.properties);
        stored.etag = Some(self.shared.next_etag());
        stored.timestamp = Some(Utc::now());
        self.shared.write()?.insert(
            (stored.partition_key.clone(), stored.row_key.clone()),
            stored.clone(),
        );
        Ok(stored)
    }

    /// Number of rows currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.read().map(|rows| rows.len()).unwrap_or_default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TableStore for MemoryTable {
    fn table_name(&self) -> &str {
        &self.name
    }

    async fn get_entity(
        &self,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<TableEntity>, StorageError> {
        self.calls.get_entity.fetch_add(1, Ordering::SeqCst);
        FaultSwitches::check(&self.faults.point_lookups, "point lookup")?;
        let rows = self.shared.read()?;
        Ok(rows
            .get(&(partition_key.to_owned(), row_key.to_owned()))
            .cloned())
    }

    async fn query(&self, filter: Option<&str>) -> Result<Vec<TableEntity>, StorageError> {
        self.calls.query.fetch_add(1, Ordering::SeqCst);
        FaultSwitches::check(&self.faults.queries, "query")?;
        let clauses = filter.map(parse_filter).transpose()?.unwrap_or_default();
        let rows = self.shared.read()?;
        Ok(rows
            .values()
            .filter(|row| clauses.iter().all(|(prop, value)| matches_clause(row, prop, value)))
            .cloned()
            .collect())
    }

    async fn insert(&self, entity: &TableEntity) -> Result<TableEntity, StorageError> {
        self.calls.insert.fetch_add(1, Ordering::SeqCst);
        FaultSwitches::check(&self.faults.writes, "insert")?;
        let key = (entity.partition_key.clone(), entity.row_key.clone());
        let mut rows = self.shared.write()?;
        if rows.contains_key(&key) {
            return Err(StorageError::Conflict);
        }
        let mut stored = entity.clone();
        strip_annotations(&mut stored.properties);
        stored.etag = Some(self.shared.next_etag());
        stored.timestamp = Some(Utc::now());
        rows.insert(key, stored.clone());
        Ok(stored)
    }

    async fn merge(&self, entity: &TableEntity, if_match: IfMatch) -> Result<String, StorageError> {
        self.calls.merge.fetch_add(1, Ordering::SeqCst);
        FaultSwitches::check(&self.faults.writes, "merge")?;
        let key = (entity.partition_key.clone(), entity.row_key.clone());
        let mut rows = self.shared.write()?;
        let stored = rows.get_mut(&key).ok_or(StorageError::NotFound)?;
        if let IfMatch::Etag(expected) = &if_match
            && stored.etag.as_deref() != Some(expected.as_str())
        {
            return Err(StorageError::PreconditionFailed);
        }
        let mut incoming = entity.properties.clone();
        strip_annotations(&mut incoming);
        stored.properties.extend(incoming);
        let etag = self.shared.next_etag();
        stored.etag = Some(etag.clone());
        stored.timestamp = Some(Utc::now());
        Ok(etag)
    }

    async fn delete(
        &self,
        partition_key: &str,
        row_key: &str,
        if_match: IfMatch,
    ) -> Result<(), StorageError> {
        self.calls.delete.fetch_add(1, Ordering::SeqCst);
        FaultSwitches::check(&self.faults.writes, "delete")?;
        let key = (partition_key.to_owned(), row_key.to_owned());
        let mut rows = self.shared.write()?;
        let stored = rows.get(&key).ok_or(StorageError::NotFound)?;
        if let IfMatch::Etag(expected) = &if_match
            && stored.etag.as_deref() != Some(expected.as_str())
        {
            return Err(StorageError::PreconditionFailed);
        }
        rows.remove(&key);
        Ok(())
    }
}

/// Read-all view over a [`MemoryTable`].
#[derive(Debug, Clone)]
pub struct MemorySnapshot {
    shared: Arc<Shared>,
    unavailable: Arc<AtomicBool>,
}

impl MemorySnapshot {
    /// Make `fetch_all` fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl TableSnapshot for MemorySnapshot {
    async fn fetch_all(&self) -> Result<Vec<TableEntity>, StorageError> {
        FaultSwitches::check(&self.unavailable, "snapshot")?;
        Ok(self.shared.read()?.values().cloned().collect())
    }
}

/// Parse the subset of OData `$filter` this service emits:
/// `Prop eq 'value'` clauses joined by `and`.
fn parse_filter(filter: &str) -> Result<Vec<(String, String)>, StorageError> {
    let unsupported = || StorageError::Api {
        status: 400,
        message: format!("unsupported filter: {filter}"),
    };

    let mut clauses = Vec::new();
    let mut rest = filter.trim();
    while !rest.is_empty() {
        let (prop, after_prop) = rest.split_once(" eq ").ok_or_else(unsupported)?;
        let literal = after_prop.trim_start();
        let body = literal.strip_prefix('\'').ok_or_else(unsupported)?;

        // Find the closing quote, skipping doubled quotes.
        let mut value = String::new();
        let mut chars = body.char_indices().peekable();
        let mut end = None;
        while let Some((i, c)) = chars.next() {
            if c == '\'' {
                if chars.peek().is_some_and(|&(_, next)| next == '\'') {
                    value.push('\'');
                    chars.next();
                } else {
                    end = Some(i + 1);
                    break;
                }
            } else {
                value.push(c);
            }
        }
        let end = end.ok_or_else(unsupported)?;
        clauses.push((prop.trim().to_owned(), value));

        rest = body.get(end..).unwrap_or_default().trim_start();
        if !rest.is_empty() {
            rest = rest.strip_prefix("and ").ok_or_else(unsupported)?.trim_start();
        }
    }
    Ok(clauses)
}

fn matches_clause(row: &TableEntity, prop: &str, value: &str) -> bool {
    match prop {
        "PartitionKey" => row.partition_key == value,
        "RowKey" => row.row_key == value,
        other => row.get_str(other) == Some(value),
    }
}
