//! Integration tests for ABC Retail.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p abc-retail-integration-tests
//! ```
//!
//! Every test runs against the in-memory table and queue backends, so no
//! storage account is needed. HTTP tests drive the real router with
//! `tower::ServiceExt::oneshot`.
//!
//! # Test Categories
//!
//! - `resolver_chain` - Read fallback chain and diagnostics
//! - `updater_chain` - Write fallback chain
//! - `inventory_queue` - Queue semantics through the service
//! - `api` - End-to-end flows over HTTP

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use abc_retail_admin::middleware::API_KEY_HEADER;
use abc_retail_admin::repository::UpdatePolicy;
use abc_retail_admin::routes;
use abc_retail_admin::state::AppState;
use abc_retail_admin::storage::MemoryBackends;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use secrecy::SecretString;
use serde_json::Value;
use tower::ServiceExt;

/// API key every [`TestApp`] is configured with.
pub const API_KEY: &str = "integration-key-5f2c9a71d3e84b06";

/// The service wired to in-memory backends. The backends stay reachable so
/// tests can plant rows, read counters and inject faults.
pub struct TestApp {
    pub memory: MemoryBackends,
    pub state: AppState,
}

impl TestApp {
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(UpdatePolicy::default())
    }

    #[must_use]
    pub fn with_policy(policy: UpdatePolicy) -> Self {
        let memory = MemoryBackends::new();
        let state = AppState::new(memory.backends(), SecretString::from(API_KEY), policy);
        Self { memory, state }
    }

    /// Send an authenticated request and decode the JSON body
    /// (`Value::Null` when empty).
    pub async fn request(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.send(method, uri, Some(API_KEY), body).await
    }

    /// Send a request with an explicit key, or none.
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        api_key: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(key) = api_key {
            builder = builder.header(API_KEY_HEADER, key);
        }
        let request = builder
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .unwrap();

        let response = routes::router(self.state.clone())
            .oneshot(request)
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}
