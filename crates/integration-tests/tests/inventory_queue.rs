//! Integration tests for inventory notifications, from product edits through
//! to a consumer receiving and deleting them.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use abc_retail_integration_tests::TestApp;
use axum::http::StatusCode;
use serde_json::{Value, json};

async fn create_product(app: &TestApp, name: &str, stock: i32) -> String {
    let (status, body) = app
        .request(
            "POST",
            "/api/products",
            Some(json!({"name": name, "price": "19.99", "stock_quantity": stock})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_owned()
}

fn delete_uri(received: &Value) -> String {
    let delivery = &received["delivery"];
    format!(
        "/api/inventory-queue/messages/{}?pop_receipt={}",
        delivery["queue_message_id"].as_str().unwrap(),
        delivery["pop_receipt"].as_str().unwrap(),
    )
}

// ============================================================================
// Producer to consumer
// ============================================================================

#[tokio::test]
async fn test_stock_edit_reaches_consumer() {
    let app = TestApp::new();
    let id = create_product(&app, "Wireless Headphones", 50).await;

    let (status, _) = app
        .request("PUT", &format!("/api/products/{id}"), Some(json!({"stock_quantity": 0})))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, received) = app
        .request("POST", "/api/inventory-queue/receive", Some(json!({"max": 32})))
        .await;
    let received = received.as_array().unwrap();
    assert_eq!(received.len(), 1);
    let message = &received[0];
    assert_eq!(message["productId"], id.as_str());
    assert_eq!(message["action"], "update");
    assert_eq!(message["priority"], "high");
    assert_eq!(message["quantity"], 0);
    assert_eq!(message["delivery"]["dequeue_count"], 1);

    let (status, _) = app.request("DELETE", &delete_uri(message), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, dashboard) = app.request("GET", "/api/inventory-queue", None).await;
    assert_eq!(dashboard["queue_length"], 0);
    assert_eq!(dashboard["messages"]["total"], 0);
}

#[tokio::test]
async fn test_peek_leaves_messages_in_place() {
    let app = TestApp::new();
    for quantity in [5, 10, 15] {
        let (status, _) = app
            .request(
                "POST",
                "/api/inventory-queue",
                Some(json!({"type": "inventory_update", "productName": "Yoga Mat", "quantity": quantity, "action": "add"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, first) = app.request("GET", "/api/inventory-queue?page_size=10", None).await;
    let (_, second) = app.request("GET", "/api/inventory-queue?page_size=10", None).await;

    let ids = |dashboard: &Value| -> Vec<String> {
        dashboard["messages"]["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["id"].as_str().unwrap().to_owned())
            .collect()
    };
    assert_eq!(ids(&first).len(), 3);
    assert_eq!(ids(&first), ids(&second));
    assert_eq!(second["queue_length"], 3);
    assert_eq!(second["counts"]["pending"], 3);
}

#[tokio::test]
async fn test_received_message_is_hidden_until_deleted() {
    let app = TestApp::new();
    let id = create_product(&app, "Smart Watch", 30).await;
    app.request("PUT", &format!("/api/products/{id}"), Some(json!({"stock_quantity": 29})))
        .await;

    let (_, received) = app
        .request(
            "POST",
            "/api/inventory-queue/receive",
            Some(json!({"visibility_timeout_secs": 300})),
        )
        .await;
    let message = received[0].clone();

    // Invisible to peeks and other consumers, but still counted.
    let (_, dashboard) = app.request("GET", "/api/inventory-queue", None).await;
    assert_eq!(dashboard["messages"]["total"], 0);
    assert_eq!(dashboard["queue_length"], 1);
    let (_, again) = app.request("POST", "/api/inventory-queue/receive", None).await;
    assert_eq!(again, json!([]));

    let wrong = format!(
        "/api/inventory-queue/messages/{}?pop_receipt=not-the-receipt",
        message["delivery"]["queue_message_id"].as_str().unwrap()
    );
    let (status, _) = app.request("DELETE", &wrong, None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let (status, _) = app.request("DELETE", &delete_uri(&message), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, length) = app.request("GET", "/api/inventory-queue/length", None).await;
    assert_eq!(length["length"], 0);
}

#[tokio::test]
async fn test_clear_empties_queue() {
    let app = TestApp::new();
    let id = create_product(&app, "Coffee Maker", 25).await;
    let (status, _) = app.request("DELETE", &format!("/api/products/{id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, length) = app.request("GET", "/api/inventory-queue/length", None).await;
    assert_eq!(length, json!({"enabled": true, "length": 1}));

    let (status, _) = app.request("DELETE", "/api/inventory-queue", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, length) = app.request("GET", "/api/inventory-queue/length", None).await;
    assert_eq!(length["length"], 0);
}
