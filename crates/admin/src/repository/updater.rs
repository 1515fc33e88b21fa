//! Write path: persist an edited record through a chain of strategies.
//!
//! 1. merge under the canonical partition key, conditioned on the caller's
//!    version tag
//! 2. re-resolve the row, overlay the caller's fields onto the fresh copy and
//!    merge conditioned on the fresh tag
//! 3. delete and re-insert under the canonical key (only when the policy
//!    allows it, since it drops concurrent changes)

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::record::TableRecord;
use super::resolver::resolve;
use crate::storage::{IfMatch, StorageError, TableHandle};

/// Which strategies the updater may use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdatePolicy {
    /// Enable the lossy delete+recreate strategy.
    pub allow_recreate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStrategy {
    ConditionalMerge,
    Refresh,
    Recreate,
}

impl std::fmt::Display for UpdateStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::ConditionalMerge => "conditional merge",
            Self::Refresh => "refresh and merge",
            Self::Recreate => "delete and recreate",
        })
    }
}

/// A strategy that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attempt {
    pub strategy: UpdateStrategy,
    pub error: String,
}

impl Attempt {
    fn new(strategy: UpdateStrategy, error: impl ToString) -> Self {
        Self {
            strategy,
            error: error.to_string(),
        }
    }
}

/// A successful update.
#[derive(Debug, Clone)]
pub struct UpdateOutcome<T> {
    /// The record as written, with its new version tag.
    pub record: T,
    pub strategy: UpdateStrategy,
    /// Strategies tried before the one that worked.
    pub failed: Vec<Attempt>,
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("could not update {kind} '{id}': {}", join_attempts(.attempts))]
    Exhausted {
        kind: &'static str,
        id: String,
        attempts: Vec<Attempt>,
    },
}

fn join_attempts(attempts: &[Attempt]) -> String {
    attempts
        .iter()
        .map(|a| format!("{} failed: {}", a.strategy, a.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Persist `record`, trying each enabled strategy in turn.
///
/// # Errors
///
/// Returns `UpdateError::Exhausted` listing every attempt when no strategy
/// succeeds.
#[instrument(skip(table, record), fields(kind = T::KIND, id = record.row_key()))]
pub async fn update<T: TableRecord>(
    table: &TableHandle,
    record: T,
    policy: UpdatePolicy,
) -> Result<UpdateOutcome<T>, UpdateError> {
    let mut record = record;
    record.touch();
    let mut attempts = Vec::new();

    let merged = match record.etag().filter(|tag| !tag.is_empty()) {
        Some(etag) => conditional_merge(table, &record, etag.to_owned())
            .await
            .map_err(|e| e.to_string()),
        None => Err("no version tag supplied".to_owned()),
    };
    match merged {
        Ok(etag) => {
            record.set_partition_key(T::PARTITION_KEY.to_owned());
            record.set_etag(Some(etag));
            debug!("Updated with caller's version tag");
            return Ok(UpdateOutcome {
                record,
                strategy: UpdateStrategy::ConditionalMerge,
                failed: attempts,
            });
        }
        Err(error) => {
            debug!(%error, "Conditional merge failed");
            attempts.push(Attempt::new(UpdateStrategy::ConditionalMerge, error));
        }
    }

    let resolved_partition = match resolve::<T>(table, record.row_key()).await {
        Some(resolved) => {
            let mut fresh = resolved.record;
            record.overlay_onto(&mut fresh);
            let if_match = IfMatch::from_optional(fresh.etag());
            match table.store.merge(&fresh.to_entity(), if_match).await {
                Ok(etag) => {
                    fresh.set_etag(Some(etag));
                    debug!(step = %resolved.step, "Updated after refresh");
                    return Ok(UpdateOutcome {
                        record: fresh,
                        strategy: UpdateStrategy::Refresh,
                        failed: attempts,
                    });
                }
                Err(error) => {
                    warn!(%error, "Merge after refresh failed");
                    attempts.push(Attempt::new(UpdateStrategy::Refresh, error));
                    Some(fresh.partition_key().to_owned())
                }
            }
        }
        None => {
            attempts.push(Attempt::new(
                UpdateStrategy::Refresh,
                "record could not be re-fetched",
            ));
            None
        }
    };

    if policy.allow_recreate {
        let partition_key = resolved_partition.unwrap_or_else(|| T::PARTITION_KEY.to_owned());
        warn!(
            %partition_key,
            "Falling back to delete and recreate; concurrent changes are lost"
        );
        match recreate(table, &mut record, &partition_key).await {
            Ok(()) => {
                return Ok(UpdateOutcome {
                    record,
                    strategy: UpdateStrategy::Recreate,
                    failed: attempts,
                });
            }
            Err(error) => attempts.push(Attempt::new(UpdateStrategy::Recreate, error)),
        }
    }

    Err(UpdateError::Exhausted {
        kind: T::KIND,
        id: record.row_key().to_owned(),
        attempts,
    })
}

async fn conditional_merge<T: TableRecord>(
    table: &TableHandle,
    record: &T,
    etag: String,
) -> Result<String, StorageError> {
    let mut entity = record.to_entity();
    entity.partition_key = T::PARTITION_KEY.to_owned();
    table
        .store
        .merge(&entity, IfMatch::Etag(etag))
        .await
}

async fn recreate<T: TableRecord>(
    table: &TableHandle,
    record: &mut T,
    old_partition_key: &str,
) -> Result<(), StorageError> {
    match table
        .store
        .delete(old_partition_key, record.row_key(), IfMatch::Any)
        .await
    {
        Ok(()) | Err(StorageError::NotFound) => {}
        Err(error) => return Err(error),
    }
    record.set_partition_key(T::PARTITION_KEY.to_owned());
    record.set_etag(None);
    let inserted = table.store.insert(&record.to_entity()).await?;
    record.set_etag(inserted.etag);
    Ok(())
}
