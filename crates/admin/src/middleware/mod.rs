//! HTTP middleware for the service.
//!
//! - `auth` - shared-secret `x-api-key` check for `/api` routes

pub mod auth;

pub use auth::{API_KEY_HEADER, RequireApiKey, require_api_key};
