//! Order API handlers.

use abc_retail_core::{Order, OrderId, OrderItem, ProductId};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use serde::Deserialize;
use tracing::instrument;

use super::{PageQuery, non_blank};
use crate::error::AppError;
use crate::repository::Page;
use crate::state::AppState;

/// Build the orders router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list).post(create))
        .route("/orders/{id}", get(show).delete(remove))
}

/// One requested line. Name and unit price come from the product record.
#[derive(Debug, Deserialize)]
pub struct OrderLineRequest {
    pub product_id: String,
    pub quantity: u32,
}

/// Request for creating an order.
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    /// Optional caller-chosen row key.
    pub id: Option<String>,
    pub customer_id: String,
    pub items: Vec<OrderLineRequest>,
    pub status: Option<String>,
    #[serde(default)]
    pub shipping_address: String,
    #[serde(default)]
    pub notes: String,
}

/// List orders, newest first.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Json<Page<Order>> {
    Json(state.orders().list(query.page(), query.page_size()).await)
}

/// Create an order priced from the current product records.
///
/// # Errors
///
/// Returns 400 when the customer or a product cannot be resolved, when there
/// are no lines, or when a quantity is zero. Returns 409 if the id is taken.
#[instrument(skip_all)]
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    if body.items.is_empty() {
        return Err(AppError::BadRequest("an order needs at least one item".into()));
    }
    let customer = state
        .customers()
        .get(&body.customer_id)
        .await
        .ok_or_else(|| AppError::BadRequest(format!("unknown customer '{}'", body.customer_id)))?;

    let mut items = Vec::with_capacity(body.items.len());
    for line in body.items {
        if line.quantity == 0 {
            return Err(AppError::BadRequest(format!(
                "quantity for product '{}' must be positive",
                line.product_id
            )));
        }
        let product = state
            .products()
            .get(&line.product_id)
            .await
            .ok_or_else(|| AppError::BadRequest(format!("unknown product '{}'", line.product_id)))?;
        items.push(OrderItem {
            product_id: ProductId::new(line.product_id),
            product_name: product.name,
            quantity: line.quantity,
            unit_price: product.price,
        });
    }

    let mut order = Order {
        customer_name: customer.full_name(),
        shipping_address: body.shipping_address,
        notes: body.notes,
        ..Order::new(customer.id, items).map_err(|e| AppError::BadRequest(e.to_string()))?
    };
    if let Some(status) = non_blank(body.status) {
        order.status = status;
    }
    if let Some(id) = non_blank(body.id) {
        order.id = OrderId::new(id);
    }

    let created = state.orders().create(order).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Resolve one order.
///
/// # Errors
///
/// Returns 404 if no resolver step finds it.
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Order>, AppError> {
    state
        .orders()
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("order '{id}'")))
}

/// Delete an order wherever it lives.
///
/// # Errors
///
/// Returns 404 if it was not found, or the storage error.
#[instrument(skip(state))]
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.orders().delete(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("order '{id}'")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use abc_retail_core::{Customer, Price, Product};
    use axum::body::Body;
    use axum::http::Request;
    use secrecy::SecretString;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::middleware::API_KEY_HEADER;
    use crate::repository::UpdatePolicy;
    use crate::routes;
    use crate::storage::MemoryBackends;

    const KEY: &str = "order-route-key-0123456789ab";

    async fn post_order(state: &AppState, body: Value) -> (StatusCode, Value) {
        let request = Request::post("/api/orders")
            .header(API_KEY_HEADER, KEY)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = routes::router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_create_prices_lines_from_products() {
        let memory = MemoryBackends::new();
        let state = AppState::new(memory.backends(), SecretString::from(KEY), UpdatePolicy::default());
        let customer = state
            .customers()
            .create(Customer::new("Sipho", "Nkosi", "sipho@example.com"))
            .await
            .unwrap();
        let mug = state
            .products()
            .create(Product::new("Mug", Price::from_cents(1_250), 40))
            .await
            .unwrap();

        let (status, order) = post_order(
            &state,
            json!({
                "customer_id": customer.id,
                "items": [{"product_id": mug.id, "quantity": 4}],
                "shipping_address": "12 Long Street, Cape Town"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(order["customer_name"], "Sipho Nkosi");
        assert_eq!(order["status"], Order::DEFAULT_STATUS);
        assert_eq!(order["items"][0]["product_name"], "Mug");

        let stored = state.orders().get(order["id"].as_str().unwrap()).await.unwrap();
        assert_eq!(stored.total_amount, Price::from_cents(5_000));
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_product() {
        let memory = MemoryBackends::new();
        let state = AppState::new(memory.backends(), SecretString::from(KEY), UpdatePolicy::default());
        let customer = state
            .customers()
            .create(Customer::new("Sipho", "Nkosi", "sipho@example.com"))
            .await
            .unwrap();

        let (status, body) = post_order(
            &state,
            json!({"customer_id": customer.id, "items": [{"product_id": "missing", "quantity": 1}]}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("missing"));
        assert!(memory.orders.is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_overflowing_total() {
        let memory = MemoryBackends::new();
        let state = AppState::new(memory.backends(), SecretString::from(KEY), UpdatePolicy::default());
        let customer = state
            .customers()
            .create(Customer::new("Sipho", "Nkosi", "sipho@example.com"))
            .await
            .unwrap();
        let price = Price::new("50000000000000000000000000000".parse().unwrap()).unwrap();
        let yacht = state
            .products()
            .create(Product::new("Yacht", price, 1))
            .await
            .unwrap();

        let (status, body) = post_order(
            &state,
            json!({"customer_id": customer.id, "items": [{"product_id": yacht.id, "quantity": 2}]}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("overflow"));
        assert!(memory.orders.is_empty());
    }
}
