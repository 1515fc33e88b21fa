//! Read path: find a record by row key even when its partition key drifted.
//!
//! Steps run in order and stop at the first hit:
//!
//! 1. point lookup under the canonical partition key
//! 2. point lookups under each alias spelling
//! 3. query on `RowKey` alone
//! 4. read-all through the snapshot path and scan for the row key
//!
//! A failing step is logged and the chain moves on. Nothing is cached.

use serde::Serialize;
use tracing::{debug, instrument, warn};

use super::record::{TableRecord, partition_aliases};
use crate::storage::{StorageError, TableEntity, TableHandle, row_key_filter};

/// Which step produced a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", content = "partition_key", rename_all = "snake_case")]
pub enum ResolveStep {
    Canonical,
    Alias(String),
    RowKeyScan,
    Snapshot,
}

impl ResolveStep {
    /// Position in the chain, starting at 1.
    #[must_use]
    pub const fn number(&self) -> u8 {
        match self {
            Self::Canonical => 1,
            Self::Alias(_) => 2,
            Self::RowKeyScan => 3,
            Self::Snapshot => 4,
        }
    }
}

impl std::fmt::Display for ResolveStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Canonical => f.write_str("canonical partition key"),
            Self::Alias(pk) => write!(f, "partition key alias '{pk}'"),
            Self::RowKeyScan => f.write_str("row key scan"),
            Self::Snapshot => f.write_str("snapshot scan"),
        }
    }
}

/// A record and the step that found it.
#[derive(Debug, Clone)]
pub struct Resolved<T> {
    pub record: T,
    pub step: ResolveStep,
}

/// Result of probing one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "detail", rename_all = "snake_case")]
pub enum ProbeOutcome {
    /// Found a row; carries its partition key.
    Hit(String),
    Miss,
    Error(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct Probe {
    #[serde(flatten)]
    pub step: ResolveStep,
    pub outcome: ProbeOutcome,
}

/// Every step's result for one id.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnosis {
    pub kind: &'static str,
    pub id: String,
    pub probes: Vec<Probe>,
    /// First step that hit, i.e. the one `resolve` would use.
    pub resolved_by: Option<ResolveStep>,
}

enum StepResult<T> {
    Hit(T),
    Miss,
    Error(String),
}

impl<T> StepResult<T> {
    fn probe_outcome(&self, partition_key: impl FnOnce(&T) -> String) -> ProbeOutcome {
        match self {
            Self::Hit(record) => ProbeOutcome::Hit(partition_key(record)),
            Self::Miss => ProbeOutcome::Miss,
            Self::Error(message) => ProbeOutcome::Error(message.clone()),
        }
    }
}

fn decode<T: TableRecord>(found: Result<Option<TableEntity>, StorageError>) -> StepResult<T> {
    match found {
        Ok(Some(entity)) => match T::from_entity(entity) {
            Ok(record) => StepResult::Hit(record),
            Err(e) => StepResult::Error(e.to_string()),
        },
        Ok(None) => StepResult::Miss,
        Err(e) => StepResult::Error(e.to_string()),
    }
}

async fn run_step<T: TableRecord>(table: &TableHandle, id: &str, step: &ResolveStep) -> StepResult<T> {
    let store = &table.store;
    match step {
        ResolveStep::Canonical => decode(store.get_entity(T::PARTITION_KEY, id).await),
        ResolveStep::Alias(pk) => decode(store.get_entity(pk, id).await),
        ResolveStep::RowKeyScan => {
            let filter = row_key_filter(id);
            decode(
                store
                    .query(Some(&filter))
                    .await
                    .map(|rows| rows.into_iter().next()),
            )
        }
        ResolveStep::Snapshot => match &table.snapshot {
            Some(snapshot) => decode(
                snapshot
                    .fetch_all()
                    .await
                    .map(|rows| rows.into_iter().find(|row| row.row_key == id)),
            ),
            None => StepResult::Error("no snapshot path configured".to_owned()),
        },
    }
}

fn steps<T: TableRecord>() -> Vec<ResolveStep> {
    let mut steps = vec![ResolveStep::Canonical];
    steps.extend(partition_aliases(T::PARTITION_KEY).into_iter().map(ResolveStep::Alias));
    steps.push(ResolveStep::RowKeyScan);
    steps.push(ResolveStep::Snapshot);
    steps
}

/// Find a record by row key. `None` only when every step missed or failed.
#[instrument(skip(table), fields(kind = T::KIND, table = table.store.table_name()))]
pub async fn resolve<T: TableRecord>(table: &TableHandle, id: &str) -> Option<Resolved<T>> {
    if id.is_empty() {
        return None;
    }
    for step in steps::<T>() {
        match run_step::<T>(table, id, &step).await {
            StepResult::Hit(record) => {
                debug!(step = %step, partition_key = record.partition_key(), "Resolved");
                return Some(Resolved { record, step });
            }
            StepResult::Miss => debug!(step = %step, "Miss"),
            StepResult::Error(error) => warn!(step = %step, %error, "Resolve step failed"),
        }
    }
    debug!("Not found after every step");
    None
}

/// Run every step without stopping at the first hit.
#[instrument(skip(table), fields(kind = T::KIND, table = table.store.table_name()))]
pub async fn diagnose<T: TableRecord>(table: &TableHandle, id: &str) -> Diagnosis {
    let mut probes = Vec::new();
    for step in steps::<T>() {
        let result = run_step::<T>(table, id, &step).await;
        let outcome = result.probe_outcome(|record| record.partition_key().to_owned());
        probes.push(Probe { step, outcome });
    }
    let resolved_by = probes
        .iter()
        .find(|p| matches!(p.outcome, ProbeOutcome::Hit(_)))
        .map(|p| p.step.clone());
    Diagnosis {
        kind: T::KIND,
        id: id.to_owned(),
        probes,
        resolved_by,
    }
}

/// Every record in the table, newest first.
///
/// Reads through the primary store and falls back to the snapshot path.
/// Degrades to an empty list when both fail. Rows that do not decode are
/// skipped.
#[instrument(skip(table), fields(kind = T::KIND, table = table.store.table_name()))]
pub async fn list_all<T: TableRecord>(table: &TableHandle) -> Vec<T> {
    let rows = match table.store.query(None).await {
        Ok(rows) => rows,
        Err(error) => {
            warn!(%error, "Table query failed, trying snapshot");
            match &table.snapshot {
                Some(snapshot) => match snapshot.fetch_all().await {
                    Ok(rows) => rows,
                    Err(error) => {
                        tracing::error!(%error, "Snapshot read failed");
                        return Vec::new();
                    }
                },
                None => return Vec::new(),
            }
        }
    };

    let mut records: Vec<T> = rows
        .into_iter()
        .filter_map(|row| {
            T::from_entity(row)
                .map_err(|error| warn!(%error, "Skipping undecodable row"))
                .ok()
        })
        .collect();
    records.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));
    records
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::Ordering;

    use abc_retail_core::{Customer, Price, Product};

    use super::*;
    use crate::storage::{MemoryTable, TableStore};

    fn setup() -> (MemoryTable, TableHandle) {
        let table = MemoryTable::new("Customers");
        let handle = TableHandle::memory(&table);
        (table, handle)
    }

    #[tokio::test]
    async fn test_canonical_row_resolves_in_one_read() {
        let (table, handle) = setup();
        let customer = Customer::new("Ayanda", "Dlamini", "ayanda@example.com");
        table.insert(&customer.to_entity()).await.unwrap();
        table.calls().reset();

        let resolved = resolve::<Customer>(&handle, customer.id.as_str()).await.unwrap();
        assert_eq!(resolved.step, ResolveStep::Canonical);
        assert_eq!(resolved.record.email, "ayanda@example.com");
        assert_eq!(table.calls().reads(), 1);
        assert_eq!(table.calls().query.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_alias_partition_resolves() {
        let (table, handle) = setup();
        let mut customer = Customer::new("Sipho", "Nkosi", "sipho@example.com");
        customer.partition_key = "customers".into();
        table.seed_row(customer.to_entity()).unwrap();

        let resolved = resolve::<Customer>(&handle, customer.id.as_str()).await.unwrap();
        assert_eq!(resolved.step, ResolveStep::Alias("customers".into()));
        assert_eq!(resolved.record.partition_key, "customers");
        assert!(resolved.record.etag.is_some());
    }

    #[tokio::test]
    async fn test_unknown_partition_found_by_row_key_scan() {
        let (table, handle) = setup();
        let mut customer = Customer::new("Zanele", "Khumalo", "zanele@example.com");
        customer.partition_key = "CUSTOMER".into();
        table.seed_row(customer.to_entity()).unwrap();

        let resolved = resolve::<Customer>(&handle, customer.id.as_str()).await.unwrap();
        assert_eq!(resolved.step, ResolveStep::RowKeyScan);
    }

    #[tokio::test]
    async fn test_snapshot_used_when_primary_down() {
        let (table, handle) = setup();
        let product = Product::new("Widget", Price::from_cents(999), 5);
        table.insert(&product.to_entity()).await.unwrap();
        table.faults().fail_all();

        let resolved = resolve::<Product>(&handle, product.id.as_str()).await.unwrap();
        assert_eq!(resolved.step, ResolveStep::Snapshot);
        assert_eq!(resolved.record.price, Price::from_cents(999));
    }

    #[tokio::test]
    async fn test_missing_row_is_none() {
        let (_table, handle) = setup();
        assert!(resolve::<Customer>(&handle, "nope").await.is_none());
        assert!(resolve::<Customer>(&handle, "").await.is_none());
    }

    #[tokio::test]
    async fn test_diagnose_reports_every_step() {
        let (table, handle) = setup();
        let mut customer = Customer::new("Lindiwe", "Mahlangu", "lindiwe@example.com");
        customer.partition_key = "Customers".into();
        table.seed_row(customer.to_entity()).unwrap();
        table.faults().point_lookups.store(true, Ordering::SeqCst);

        let diagnosis = diagnose::<Customer>(&handle, customer.id.as_str()).await;
        // canonical + 3 aliases + scan + snapshot
        assert_eq!(diagnosis.probes.len(), 6);
        assert!(matches!(diagnosis.probes[0].outcome, ProbeOutcome::Error(_)));
        assert_eq!(
            diagnosis.probes[4].outcome,
            ProbeOutcome::Hit("Customers".into())
        );
        assert_eq!(diagnosis.resolved_by, Some(ResolveStep::RowKeyScan));
    }

    #[tokio::test]
    async fn test_list_all_newest_first_with_snapshot_fallback() {
        let (table, handle) = setup();
        let mut older = Customer::new("A", "A", "a@example.com");
        older.created_date -= chrono::Duration::days(1);
        let newer = Customer::new("B", "B", "b@example.com");
        table.insert(&older.to_entity()).await.unwrap();
        table.insert(&newer.to_entity()).await.unwrap();

        let listed = list_all::<Customer>(&handle).await;
        assert_eq!(listed[0].id, newer.id);

        table.faults().queries.store(true, Ordering::SeqCst);
        assert_eq!(list_all::<Customer>(&handle).await.len(), 2);

        let bare = TableHandle::new(std::sync::Arc::new(table.clone()), None);
        assert!(list_all::<Customer>(&bare).await.is_empty());
    }
}
