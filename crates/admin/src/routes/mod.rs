//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                          - Liveness check
//! GET    /health/ready                    - Table backends reachable
//!
//! # Everything below requires the x-api-key header
//!
//! GET    /api/customers                   - Paged listing
//! POST   /api/customers                   - Create
//! GET    /api/customers/{id}              - Resolve one
//! PUT    /api/customers/{id}              - Update through the fallback chain
//! DELETE /api/customers/{id}              - Delete wherever it lives
//! GET    /api/customers/{id}/diagnose     - Probe every resolver step
//!
//! /api/products                           - Same as customers, plus stock notifications
//!
//! GET    /api/orders                      - Paged listing
//! POST   /api/orders                      - Create from customer and product ids
//! GET    /api/orders/{id}                 - Resolve one
//! DELETE /api/orders/{id}                 - Delete
//!
//! GET    /api/inventory-queue             - Dashboard
//! POST   /api/inventory-queue             - Send a message
//! DELETE /api/inventory-queue             - Clear the queue
//! POST   /api/inventory-queue/receive     - Receive with a visibility timeout
//! DELETE /api/inventory-queue/messages/{id}?pop_receipt=  - Delete a received message
//! GET    /api/inventory-queue/length      - Approximate length
//! ```

pub mod customers;
pub mod inventory;
pub mod orders;
pub mod products;

use axum::{Router, extract::State, http::StatusCode, routing::get};
use serde::{Deserialize, Serialize};

use crate::middleware::require_api_key;
use crate::repository::{Attempt, DEFAULT_PAGE_SIZE, UpdateOutcome, UpdateStrategy};
use crate::state::AppState;

/// Build the full application router with state applied.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(customers::router())
        .merge(products::router())
        .merge(orders::router())
        .merge(inventory::router())
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .nest("/api", api)
        .with_state(state)
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if any table backend is unreachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    let (customers, products, orders) = tokio::join!(
        state.customers().ping(),
        state.products().ping(),
        state.orders().ping(),
    );
    match customers.and(products).and(orders) {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Pagination query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

impl PageQuery {
    #[must_use]
    pub fn page(&self) -> usize {
        self.page.unwrap_or(1)
    }

    #[must_use]
    pub fn page_size_or(&self, default: usize) -> usize {
        self.page_size.unwrap_or(default)
    }

    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size_or(DEFAULT_PAGE_SIZE)
    }
}

/// Body returned by a successful update.
#[derive(Debug, Serialize)]
pub struct UpdateResponse<T> {
    /// Strategy that persisted the record.
    pub strategy: UpdateStrategy,
    /// Strategies that were tried first and failed.
    pub failed_attempts: Vec<Attempt>,
    pub record: T,
}

impl<T> From<UpdateOutcome<T>> for UpdateResponse<T> {
    fn from(outcome: UpdateOutcome<T>) -> Self {
        Self {
            strategy: outcome.strategy,
            failed_attempts: outcome.failed,
            record: outcome.record,
        }
    }
}

/// Treat a blank optional string as absent.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use secrecy::SecretString;
    use tower::ServiceExt;

    use super::*;
    use crate::middleware::API_KEY_HEADER;
    use crate::repository::UpdatePolicy;
    use crate::storage::MemoryBackends;

    const KEY: &str = "route-test-key-0123456789abcdef";

    fn app(memory: &MemoryBackends) -> Router {
        router(AppState::new(
            memory.backends(),
            SecretString::from(KEY),
            UpdatePolicy::default(),
        ))
    }

    #[tokio::test]
    async fn test_health_needs_no_key() {
        let memory = MemoryBackends::new();
        let response = app(&memory)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_readiness_reports_table_outage() {
        let memory = MemoryBackends::new();
        let ready = app(&memory)
            .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(ready.status(), StatusCode::OK);

        memory.orders.faults().fail_all();
        let down = app(&memory)
            .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(down.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_api_rejects_missing_and_wrong_key() {
        let memory = MemoryBackends::new();
        let missing = app(&memory)
            .oneshot(Request::get("/api/customers").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let wrong = app(&memory)
            .oneshot(
                Request::get("/api/customers")
                    .header(API_KEY_HEADER, "not-the-key")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

        let ok = app(&memory)
            .oneshot(
                Request::get("/api/customers")
                    .header(API_KEY_HEADER, KEY)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
    }

    #[test]
    fn test_page_query_defaults() {
        let query = PageQuery::default();
        assert_eq!(query.page(), 1);
        assert_eq!(query.page_size(), DEFAULT_PAGE_SIZE);
        assert_eq!(query.page_size_or(5), 5);
    }
}
