//! Business logic services.
//!
//! - `inventory_queue` - Inventory notifications: send, peek, receive, delete with retry, dashboard
//! - `seeder` - Demo data for empty tables and queue

pub mod inventory_queue;
pub mod seeder;

pub use inventory_queue::{
    Dashboard, InventoryQueueService, RetryPolicy, StatusCounts, decode_message, encode_message,
};
pub use seeder::{SeedData, SeedError, SeedReport, seed};
