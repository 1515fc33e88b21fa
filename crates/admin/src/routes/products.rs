//! Product API handlers.
//!
//! Stock changes and removals are announced on the inventory queue. The
//! notification is sent after the table write and never undoes it.

use abc_retail_core::{InventoryQueueMessage, Price, Product, ProductId};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use super::{PageQuery, UpdateResponse, non_blank};
use crate::error::AppError;
use crate::repository::{Diagnosis, Page};
use crate::services::inventory_queue::{product_removed, stock_updated};
use crate::state::AppState;

/// User id recorded on notifications raised through the API.
const API_USER: &str = "api";

/// Build the products router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/products", get(list).post(create))
        .route("/products/{id}", get(show).put(update).delete(remove))
        .route("/products/{id}/diagnose", get(diagnose))
}

/// Request for creating a product.
#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    /// Optional caller-chosen row key.
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Price,
    pub stock_quantity: i32,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub image_url: String,
}

/// Partial update. Absent fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProductRequest {
    /// Version tag the caller last saw.
    pub etag: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Price>,
    pub stock_quantity: Option<i32>,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub image_url: Option<String>,
    pub is_active: Option<bool>,
}

impl UpdateProductRequest {
    fn apply(self, product: &mut Product) -> Result<(), AppError> {
        if let Some(stock) = self.stock_quantity {
            product.stock_quantity = check_stock(stock)?;
        }
        if let Some(name) = non_blank(self.name) {
            product.name = name;
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        let optional = [
            (self.description, &mut product.description),
            (self.category, &mut product.category),
            (self.brand, &mut product.brand),
            (self.image_url, &mut product.image_url),
        ];
        for (value, field) in optional {
            if let Some(value) = value {
                *field = value;
            }
        }
        if let Some(is_active) = self.is_active {
            product.is_active = is_active;
        }
        if let Some(etag) = non_blank(self.etag) {
            product.etag = Some(etag);
        }
        Ok(())
    }
}

fn check_stock(stock: i32) -> Result<i32, AppError> {
    if stock < 0 {
        return Err(AppError::BadRequest(
            "stock quantity cannot be negative".into(),
        ));
    }
    Ok(stock)
}

/// Update result plus the stock notification, if one was sent.
#[derive(Debug, Serialize)]
pub struct ProductUpdateResponse {
    #[serde(flatten)]
    pub update: UpdateResponse<Product>,
    pub notification: Option<InventoryQueueMessage>,
}

/// Send a notification, logging instead of failing.
async fn notify(state: &AppState, message: InventoryQueueMessage) -> Option<InventoryQueueMessage> {
    let inventory = state.inventory();
    if !inventory.is_enabled() {
        return None;
    }
    match inventory.send(message).await {
        Ok(sent) => Some(sent),
        Err(error) => {
            warn!(%error, "Inventory notification failed; table write kept");
            None
        }
    }
}

/// List products, newest first.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Json<Page<Product>> {
    Json(state.products().list(query.page(), query.page_size()).await)
}

/// Create a product under the canonical partition.
///
/// # Errors
///
/// Returns 400 for a blank name or negative stock, 409 if the id is taken.
#[instrument(skip(state, body))]
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    if body.name.trim().is_empty() {
        return Err(AppError::BadRequest("product name is required".into()));
    }
    let stock = check_stock(body.stock_quantity)?;

    let mut product = Product {
        description: body.description,
        category: body.category,
        brand: body.brand,
        image_url: body.image_url,
        ..Product::new(body.name.trim(), body.price, stock)
    };
    if let Some(id) = non_blank(body.id) {
        product.id = ProductId::new(id);
    }

    let created = state.products().create(product).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Resolve one product.
///
/// # Errors
///
/// Returns 404 if no resolver step finds it.
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Product>, AppError> {
    state
        .products()
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("product '{id}'")))
}

/// Apply a partial update, then announce a stock change.
///
/// # Errors
///
/// Returns 404 if the product cannot be resolved, 400 for negative stock,
/// or 500 with every attempt when all strategies fail.
#[instrument(skip(state, body))]
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateProductRequest>,
) -> Result<Json<ProductUpdateResponse>, AppError> {
    let mut product = state
        .products()
        .get(&id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("product '{id}'")))?;
    let previous_stock = product.stock_quantity;
    body.apply(&mut product)?;

    let outcome = state.products().update(product).await?;
    let notification = if outcome.record.stock_quantity == previous_stock {
        None
    } else {
        notify(&state, stock_updated(&outcome.record, API_USER)).await
    };

    Ok(Json(ProductUpdateResponse {
        update: outcome.into(),
        notification,
    }))
}

/// Delete a product wherever it lives and announce the removal.
///
/// # Errors
///
/// Returns 404 if it was not found, or the storage error.
#[instrument(skip(state))]
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let not_found = || AppError::NotFound(format!("product '{id}'"));
    let product = state.products().get(&id).await.ok_or_else(not_found)?;
    if !state.products().delete(&id).await? {
        return Err(not_found());
    }
    notify(&state, product_removed(&product, API_USER)).await;
    Ok(StatusCode::NO_CONTENT)
}

/// Report what each resolver step sees for this id.
pub async fn diagnose(State(state): State<AppState>, Path(id): Path<String>) -> Json<Diagnosis> {
    Json(state.products().diagnose(&id).await)
}
