//! Inventory queue API handlers.

use std::time::Duration;

use abc_retail_core::{InventoryQueueMessage, ReceivedMessage};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::PageQuery;
use crate::error::AppError;
use crate::services::Dashboard;
use crate::services::inventory_queue::{DEFAULT_DASHBOARD_PAGE_SIZE, DEFAULT_VISIBILITY};
use crate::state::AppState;

/// Build the inventory queue router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/inventory-queue",
            get(dashboard).post(send).delete(clear),
        )
        .route("/inventory-queue/receive", post(receive))
        .route("/inventory-queue/messages/{id}", delete(remove))
        .route("/inventory-queue/length", get(length))
}

/// Peek a batch and show one page with status counts.
///
/// # Errors
///
/// Returns 502 if the queue backend fails.
pub async fn dashboard(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Dashboard>, AppError> {
    let dashboard = state
        .inventory()
        .dashboard(query.page(), query.page_size_or(DEFAULT_DASHBOARD_PAGE_SIZE))
        .await?;
    Ok(Json(dashboard))
}

/// Enqueue a message. Id, timestamp and status are assigned here.
///
/// # Errors
///
/// Returns 502 when the queue is not configured or the send fails.
#[instrument(skip_all)]
pub async fn send(
    State(state): State<AppState>,
    Json(message): Json<InventoryQueueMessage>,
) -> Result<(StatusCode, Json<InventoryQueueMessage>), AppError> {
    let sent = state.inventory().send(message).await?;
    Ok((StatusCode::CREATED, Json(sent)))
}

/// Remove every message.
///
/// # Errors
///
/// Returns 502 when the queue is not configured or the call fails.
#[instrument(skip_all)]
pub async fn clear(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.inventory().clear().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Receive options. Both fields are optional.
#[derive(Debug, Default, Deserialize)]
pub struct ReceiveRequest {
    pub max: Option<u8>,
    pub visibility_timeout_secs: Option<u64>,
}

/// Receive messages, hiding them until deleted or the timeout lapses.
///
/// # Errors
///
/// Returns 502 if the queue backend fails.
#[instrument(skip_all)]
pub async fn receive(
    State(state): State<AppState>,
    body: Option<Json<ReceiveRequest>>,
) -> Result<Json<Vec<ReceivedMessage>>, AppError> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let visibility = request
        .visibility_timeout_secs
        .map_or(DEFAULT_VISIBILITY, Duration::from_secs);
    let messages = state
        .inventory()
        .receive(request.max.unwrap_or(1), visibility)
        .await?;
    Ok(Json(messages))
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    pub pop_receipt: String,
}

/// Delete a received message by id and receipt.
///
/// # Errors
///
/// Returns 400 for a blank receipt, or 502 when the queue rejects the
/// receipt or fails.
#[instrument(skip(state, query))]
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> Result<StatusCode, AppError> {
    if query.pop_receipt.trim().is_empty() {
        return Err(AppError::BadRequest("pop_receipt is required".into()));
    }
    state.inventory().delete(&id, &query.pop_receipt).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct LengthResponse {
    pub enabled: bool,
    pub length: u64,
}

/// Approximate number of messages. 0 when the queue is disabled.
///
/// # Errors
///
/// Returns 502 if the queue backend fails.
pub async fn length(State(state): State<AppState>) -> Result<Json<LengthResponse>, AppError> {
    let inventory = state.inventory();
    Ok(Json(LengthResponse {
        enabled: inventory.is_enabled(),
        length: inventory.length().await?,
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use secrecy::SecretString;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::middleware::API_KEY_HEADER;
    use crate::repository::UpdatePolicy;
    use crate::routes;
    use crate::storage::{Backends, MemoryBackends};

    const KEY: &str = "queue-route-key-0123456789abc";

    async fn call(state: &AppState, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(API_KEY_HEADER, KEY)
            .header("content-type", "application/json")
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .unwrap();
        let response = routes::router(state.clone()).oneshot(request).await.unwrap();
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

    fn state(backends: Backends) -> AppState {
        AppState::new(backends, SecretString::from(KEY), UpdatePolicy::default())
    }

    #[tokio::test]
    async fn test_send_receive_delete() {
        let memory = MemoryBackends::new();
        let state = state(memory.backends());

        let (status, sent) = call(
            &state,
            "POST",
            "/api/inventory-queue",
            Some(json!({"type": "restock_request", "productName": "Desk Lamp", "quantity": 10, "status": "completed"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(sent["status"], "pending");

        let (_, dashboard) = call(&state, "GET", "/api/inventory-queue", None).await;
        assert_eq!(dashboard["queue_length"], 1);
        assert_eq!(dashboard["counts"]["pending"], 1);
        assert_eq!(dashboard["messages"]["page_size"], 5);

        let (status, received) = call(
            &state,
            "POST",
            "/api/inventory-queue/receive",
            Some(json!({"max": 5, "visibility_timeout_secs": 60})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let delivery = &received[0]["delivery"];
        let uri = format!(
            "/api/inventory-queue/messages/{}?pop_receipt={}",
            delivery["queue_message_id"].as_str().unwrap(),
            delivery["pop_receipt"].as_str().unwrap(),
        );

        let (status, _) = call(&state, "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, length) = call(&state, "GET", "/api/inventory-queue/length", None).await;
        assert_eq!(length["length"], 0);
    }

    #[tokio::test]
    async fn test_disabled_queue() {
        let memory = MemoryBackends::new();
        let state = state(Backends {
            queue: None,
            ..memory.backends()
        });

        let (status, length) = call(&state, "GET", "/api/inventory-queue/length", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(length, json!({"enabled": false, "length": 0}));

        let (status, _) = call(&state, "POST", "/api/inventory-queue", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }
}
