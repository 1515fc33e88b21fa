//! CLI subcommands.

pub mod diagnose;
pub mod queue;
pub mod seed;

use std::io::Write;

use abc_retail_admin::config::{BackendConfig, ConfigError};
use abc_retail_admin::services::SeedError;
use abc_retail_admin::state::Stores;
use abc_retail_admin::storage::{BackendError, QueueError};
use serde::Serialize;
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Seeding failed: {0}")]
    Seed(#[from] SeedError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Could not read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid seed file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Output failed: {0}")]
    Output(String),
}

/// Record kinds that can be diagnosed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RecordKind {
    Customer,
    Product,
    Order,
}

/// Build repositories and the queue service from the environment.
///
/// # Errors
///
/// Returns an error if configuration is invalid or a backend cannot be built.
pub fn open_stores() -> Result<Stores, CommandError> {
    let config = BackendConfig::from_env()?;
    if config.storage.is_none() {
        tracing::warn!("No table storage configured; commands will run against empty in-memory tables");
    }
    Ok(Stores::from_config(&config)?)
}

/// Write `value` to stdout as pretty JSON.
fn print_json<T: Serialize>(value: &T) -> Result<(), CommandError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| CommandError::Output(e.to_string()))?;
    writeln!(std::io::stdout().lock(), "{json}").map_err(|e| CommandError::Output(e.to_string()))
}
