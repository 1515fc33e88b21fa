//! Integration tests for the read fallback chain.
//!
//! Rows are planted straight into the in-memory tables so partition keys can
//! drift the way they do when other tools write to the same account.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;
use std::sync::atomic::Ordering;

use abc_retail_admin::repository::{
    ProbeOutcome, Repository, ResolveStep, TableRecord, UpdatePolicy,
};
use abc_retail_admin::storage::{MemoryTable, TableHandle};
use abc_retail_core::{Customer, Price, Product};
use abc_retail_integration_tests::TestApp;

// ============================================================================
// Step selection
// ============================================================================

#[tokio::test]
async fn test_canonical_row_resolves_in_one_lookup() {
    let app = TestApp::new();
    let created = app
        .state
        .customers()
        .create(Customer::new("Naledi", "Mokoena", "naledi@example.com"))
        .await
        .unwrap();
    app.memory.customers.calls().reset();

    let resolved = app.state.customers().resolve(created.id.as_str()).await.unwrap();

    assert_eq!(resolved.step, ResolveStep::Canonical);
    let calls = app.memory.customers.calls();
    assert_eq!(calls.get_entity.load(Ordering::SeqCst), 1);
    assert_eq!(calls.query.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_plural_alias_resolves_before_scan() {
    let app = TestApp::new();
    let mut product = Product::new("Widget", Price::from_cents(999), 5);
    product.partition_key = "Products".into();
    app.memory.products.seed_row(product.to_entity()).unwrap();

    let resolved = app.state.products().resolve(product.id.as_str()).await.unwrap();

    assert_eq!(resolved.step, ResolveStep::Alias("Products".into()));
    assert_eq!(resolved.record.partition_key, "Products");
    assert_eq!(app.memory.products.calls().get_entity.load(Ordering::SeqCst), 2);
    assert_eq!(app.memory.products.calls().query.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unknown_partition_found_by_row_key_scan() {
    let app = TestApp::new();
    let mut customer = Customer::new("Pieter", "van Wyk", "pieter@example.com");
    customer.partition_key = "legacy-import-2019".into();
    app.memory.customers.seed_row(customer.to_entity()).unwrap();

    let resolved = app.state.customers().resolve(customer.id.as_str()).await.unwrap();

    assert_eq!(resolved.step, ResolveStep::RowKeyScan);
    assert_eq!(resolved.record.email, "pieter@example.com");
    // canonical + three aliases, then one query
    assert_eq!(app.memory.customers.calls().get_entity.load(Ordering::SeqCst), 4);
    assert_eq!(app.memory.customers.calls().query.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_snapshot_finds_record_when_primary_is_down() {
    let app = TestApp::new();
    let created = app
        .state
        .products()
        .create(Product::new("Coffee Maker", Price::from_cents(8_999), 25))
        .await
        .unwrap();
    app.memory.products.faults().fail_all();

    let resolved = app.state.products().resolve(created.id.as_str()).await.unwrap();
    assert_eq!(resolved.step, ResolveStep::Snapshot);
    assert_eq!(resolved.record.name, "Coffee Maker");

    let listed = app.state.products().all().await;
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn test_everything_down_degrades_to_not_found() {
    let table = MemoryTable::new("Customers");
    let snapshot = table.snapshot();
    let repo: Repository<Customer> = Repository::new(
        TableHandle::new(Arc::new(table.clone()), Some(Arc::new(snapshot.clone()))),
        UpdatePolicy::default(),
    );
    let created = repo
        .create(Customer::new("Anele", "Khumalo", "anele@example.com"))
        .await
        .unwrap();

    table.faults().fail_all();
    snapshot.set_unavailable(true);

    assert!(repo.get(created.id.as_str()).await.is_none());
    assert!(repo.all().await.is_empty());

    snapshot.set_unavailable(false);
    assert!(repo.get(created.id.as_str()).await.is_some());
}

// ============================================================================
// Diagnostics
// ============================================================================

#[tokio::test]
async fn test_diagnose_reports_every_step() {
    let app = TestApp::new();
    let mut customer = Customer::new("Zanele", "Ndlovu", "zanele@example.com");
    customer.partition_key = "customer".into();
    app.memory.customers.seed_row(customer.to_entity()).unwrap();
    app.memory.customers.faults().queries.store(true, Ordering::SeqCst);

    let diagnosis = app.state.customers().diagnose(customer.id.as_str()).await;

    assert_eq!(diagnosis.probes.len(), 6);
    assert_eq!(diagnosis.resolved_by, Some(ResolveStep::Alias("customer".into())));
    let outcomes: Vec<_> = diagnosis.probes.iter().map(|p| &p.outcome).collect();
    assert!(matches!(outcomes[0], ProbeOutcome::Miss));
    assert!(matches!(outcomes[1], ProbeOutcome::Miss));
    assert_eq!(outcomes[2], &ProbeOutcome::Hit("customer".into()));
    assert!(matches!(outcomes[4], ProbeOutcome::Error(_)));
    assert_eq!(outcomes[5], &ProbeOutcome::Hit("customer".into()));
}
