//! ABC Retail admin library.
//!
//! This crate provides the retail service as a library so the binary, the
//! CLI and the integration tests share one implementation.
//!
//! # Layers
//!
//! - [`storage`] - Table and queue backends (Azure REST and in-memory)
//! - [`repository`] - Record mapping, the resolver chain and the updater chain
//! - [`services`] - Inventory queue producer/monitor and demo seeding
//! - [`routes`] - JSON API behind a shared API key

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod error;
pub mod middleware;
pub mod repository;
pub mod routes;
pub mod services;
pub mod state;
pub mod storage;
