//! ABC Retail CLI - Seeding, diagnostics and queue inspection.
//!
//! # Usage
//!
//! ```bash
//! # Seed demo data into empty tables and an empty queue
//! abc-cli seed
//!
//! # Seed from a YAML file instead
//! abc-cli seed --file demo.yaml
//!
//! # Show what every resolver step sees for a row key
//! abc-cli diagnose customer 0b7c5f0e-0c4e-4d0e-9a57-1f0e8f3b2c11
//!
//! # Inspect the inventory queue
//! abc-cli queue peek --max 10
//! abc-cli queue length
//! abc-cli queue clear
//! ```
//!
//! Storage is configured with the same environment variables as the server.
//! `ADMIN_API_KEY` is not needed.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

use commands::{CommandError, RecordKind};

#[derive(Parser)]
#[command(name = "abc-cli")]
#[command(author, version, about = "ABC Retail CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed demo customers, products and queue messages into empty stores
    Seed {
        /// YAML file with `customers`, `products` and `messages` lists
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Probe every resolver step for one record
    Diagnose {
        /// Record kind
        #[arg(value_enum)]
        kind: RecordKind,

        /// Row key
        id: String,
    },
    /// Inspect or clear the inventory queue
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
}

#[derive(Subcommand)]
enum QueueAction {
    /// Show messages without hiding them
    Peek {
        /// Number of messages (1-32)
        #[arg(short, long, default_value_t = 32)]
        max: u8,
    },
    /// Show the approximate message count
    Length,
    /// Delete every message
    Clear,
}

#[tokio::main]
async fn main() {
    // Load .env before reading RUST_LOG
    let _ = dotenvy::dotenv();

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "abc_retail_cli=info,abc_retail_admin=warn".into());
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CommandError> {
    let stores = commands::open_stores()?;
    match cli.command {
        Commands::Seed { file } => commands::seed::run(&stores, file.as_deref()).await,
        Commands::Diagnose { kind, id } => commands::diagnose::run(&stores, kind, &id).await,
        Commands::Queue { action } => match action {
            QueueAction::Peek { max } => commands::queue::peek(&stores, max).await,
            QueueAction::Length => commands::queue::length(&stores).await,
            QueueAction::Clear => commands::queue::clear(&stores).await,
        },
    }
}
