//! Integration tests for the write fallback chain.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::atomic::Ordering;

use abc_retail_admin::repository::{TableRecord, UpdateError, UpdatePolicy, UpdateStrategy};
use abc_retail_admin::storage::{IfMatch, TableStore};
use abc_retail_core::Customer;
use abc_retail_integration_tests::TestApp;
use axum::http::StatusCode;
use serde_json::json;

async fn stored_customer(app: &TestApp) -> Customer {
    app.state
        .customers()
        .create(Customer::new("Thandiwe", "Mthembu", "thandiwe@example.com"))
        .await
        .unwrap()
}

// ============================================================================
// Version tags
// ============================================================================

#[tokio::test]
async fn test_stale_etag_recovers_through_refresh() {
    let app = TestApp::new();
    let original = stored_customer(&app).await;
    let stale_etag = original.etag.clone().unwrap();

    // Someone else edits the row, moving its version tag on.
    let mut concurrent = original.clone();
    concurrent.phone = "082 555 0199".into();
    let concurrent = app.state.customers().update(concurrent).await.unwrap();
    assert_ne!(concurrent.record.etag.as_deref(), Some(stale_etag.as_str()));

    let uri = format!("/api/customers/{}", original.id);
    let (status, body) = app
        .request(
            "PUT",
            &uri,
            Some(json!({"etag": stale_etag, "email": "thandiwe.m@example.com"})),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["strategy"], "refresh");
    assert_eq!(body["failed_attempts"][0]["strategy"], "conditional_merge");
    assert_eq!(body["record"]["email"], "thandiwe.m@example.com");

    let stored = app.state.customers().get(original.id.as_str()).await.unwrap();
    assert_eq!(stored.email, "thandiwe.m@example.com");
    assert_eq!(stored.phone, "082 555 0199");
    assert_eq!(body["record"]["etag"], stored.etag.unwrap());
}

#[tokio::test]
async fn test_current_etag_merges_directly() {
    let app = TestApp::new();
    let mut customer = stored_customer(&app).await;
    customer.city = "Durban".into();

    let outcome = app.state.customers().update(customer).await.unwrap();

    assert_eq!(outcome.strategy, UpdateStrategy::ConditionalMerge);
    assert!(outcome.failed.is_empty());
    assert_eq!(app.memory.customers.calls().merge.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Exhaustion and recreate
// ============================================================================

#[tokio::test]
async fn test_exhausted_update_reports_every_attempt() {
    let app = TestApp::new();
    let customer = stored_customer(&app).await;
    app.memory.customers.faults().writes.store(true, Ordering::SeqCst);

    let uri = format!("/api/customers/{}", customer.id);
    let (status, body) = app
        .request("PUT", &uri, Some(json!({"city": "Pretoria"})))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let attempts = body["attempts"].as_array().unwrap();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0]["strategy"], "conditional_merge");
    assert_eq!(attempts[1]["strategy"], "refresh");
    assert_eq!(app.memory.customers.calls().insert.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_recreate_runs_only_when_enabled() {
    let app = TestApp::with_policy(UpdatePolicy {
        allow_recreate: true,
    });
    let customer = stored_customer(&app).await;
    app.memory.customers.faults().writes.store(true, Ordering::SeqCst);

    let err = app.state.customers().update(customer).await.unwrap_err();
    let UpdateError::Exhausted { attempts, .. } = err;
    let strategies: Vec<_> = attempts.iter().map(|a| a.strategy).collect();
    assert_eq!(
        strategies,
        vec![
            UpdateStrategy::ConditionalMerge,
            UpdateStrategy::Refresh,
            UpdateStrategy::Recreate,
        ]
    );
}

#[tokio::test]
async fn test_vanished_row_is_recreated_under_canonical_key() {
    let app = TestApp::with_policy(UpdatePolicy {
        allow_recreate: true,
    });
    let mut customer = stored_customer(&app).await;
    app.memory
        .customers
        .delete(Customer::PARTITION_KEY, customer.id.as_str(), IfMatch::Any)
        .await
        .unwrap();
    customer.last_name = "Mthembu-Dlamini".into();

    let outcome = app.state.customers().update(customer.clone()).await.unwrap();

    assert_eq!(outcome.strategy, UpdateStrategy::Recreate);
    assert_eq!(outcome.failed.len(), 2);
    let resolved = app.state.customers().resolve(customer.row_key()).await.unwrap();
    assert_eq!(resolved.record.partition_key, Customer::PARTITION_KEY);
    assert_eq!(resolved.record.last_name, "Mthembu-Dlamini");
}
