//! ABC Retail Core - Shared domain types.
//!
//! This crate provides the types used across all ABC Retail components:
//! - `admin` - Retail management service (table storage + inventory queue)
//! - `cli` - Command-line tools for seeding and diagnostics
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no storage clients,
//! no HTTP. Mapping to and from table rows lives in the admin crate.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for row-key IDs, prices, emails, and queue enumerants
//! - [`models`] - Customer, product, order and inventory message records

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod models;
pub mod types;

pub use models::*;
pub use types::*;
