//! Customer API handlers.

use abc_retail_core::{Customer, CustomerId, Email};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use serde::Deserialize;
use tracing::instrument;

use super::{PageQuery, UpdateResponse, non_blank};
use crate::error::AppError;
use crate::repository::{Diagnosis, Page};
use crate::state::AppState;

/// Build the customers router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/customers", get(list).post(create))
        .route("/customers/{id}", get(show).put(update).delete(remove))
        .route("/customers/{id}/diagnose", get(diagnose))
}

/// Request for creating a customer.
#[derive(Debug, Deserialize)]
pub struct CreateCustomerRequest {
    /// Optional caller-chosen row key.
    pub id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip_code: String,
}

/// Partial update. Absent fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateCustomerRequest {
    /// Version tag the caller last saw.
    pub etag: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub is_active: Option<bool>,
}

impl UpdateCustomerRequest {
    fn apply(self, customer: &mut Customer) -> Result<(), AppError> {
        if let Some(email) = self.email {
            customer.email = parse_email(&email)?;
        }
        if let Some(first_name) = non_blank(self.first_name) {
            customer.first_name = first_name;
        }
        if let Some(last_name) = non_blank(self.last_name) {
            customer.last_name = last_name;
        }
        let optional = [
            (self.phone, &mut customer.phone),
            (self.address, &mut customer.address),
            (self.city, &mut customer.city),
            (self.state, &mut customer.state),
            (self.zip_code, &mut customer.zip_code),
        ];
        for (value, field) in optional {
            if let Some(value) = value {
                *field = value;
            }
        }
        if let Some(is_active) = self.is_active {
            customer.is_active = is_active;
        }
        if let Some(etag) = non_blank(self.etag) {
            customer.etag = Some(etag);
        }
        Ok(())
    }
}

fn parse_email(raw: &str) -> Result<String, AppError> {
    Email::parse(raw)
        .map(Email::into_inner)
        .map_err(|e| AppError::BadRequest(e.to_string()))
}

/// List customers, newest first.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Json<Page<Customer>> {
    Json(
        state
            .customers()
            .list(query.page(), query.page_size())
            .await,
    )
}

/// Create a customer under the canonical partition.
///
/// # Errors
///
/// Returns 400 for a blank name or malformed email, 409 if the id is taken.
#[instrument(skip(state, body))]
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateCustomerRequest>,
) -> Result<(StatusCode, Json<Customer>), AppError> {
    if body.first_name.trim().is_empty() || body.last_name.trim().is_empty() {
        return Err(AppError::BadRequest("first and last name are required".into()));
    }
    let email = parse_email(&body.email)?;

    let mut customer = Customer {
        phone: body.phone,
        address: body.address,
        city: body.city,
        state: body.state,
        zip_code: body.zip_code,
        ..Customer::new(body.first_name.trim(), body.last_name.trim(), email)
    };
    if let Some(id) = non_blank(body.id) {
        customer.id = CustomerId::new(id);
    }

    let created = state.customers().create(customer).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Resolve one customer.
///
/// # Errors
///
/// Returns 404 if no resolver step finds it.
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Customer>, AppError> {
    state
        .customers()
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("customer '{id}'")))
}

/// Apply a partial update through the updater chain.
///
/// # Errors
///
/// Returns 404 if the customer cannot be resolved, 400 for a malformed
/// email, or 500 with every attempt when all strategies fail.
#[instrument(skip(state, body))]
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateCustomerRequest>,
) -> Result<Json<UpdateResponse<Customer>>, AppError> {
    let mut customer = state
        .customers()
        .get(&id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("customer '{id}'")))?;
    body.apply(&mut customer)?;

    let outcome = state.customers().update(customer).await?;
    Ok(Json(outcome.into()))
}

/// Delete a customer wherever it lives.
///
/// # Errors
///
/// Returns 404 if it was not found, or the storage error.
#[instrument(skip(state))]
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.customers().delete(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("customer '{id}'")))
    }
}

/// Report what each resolver step sees for this id.
pub async fn diagnose(State(state): State<AppState>, Path(id): Path<String>) -> Json<Diagnosis> {
    Json(state.customers().diagnose(&id).await)
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
    use crate::repository::{TableRecord, UpdatePolicy};
    use crate::routes;
    use crate::storage::MemoryBackends;

    const KEY: &str = "customer-route-key-0123456789";

    async fn call(memory: &MemoryBackends, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let app = routes::router(AppState::new(
            memory.backends(),
            SecretString::from(KEY),
            UpdatePolicy::default(),
        ));
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(API_KEY_HEADER, KEY)
            .header("content-type", "application/json")
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
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

    #[tokio::test]
    async fn test_create_rejects_bad_email() {
        let memory = MemoryBackends::new();
        let (status, body) = call(
            &memory,
            "POST",
            "/api/customers",
            Some(json!({"first_name": "Lerato", "last_name": "Dube", "email": "not-an-email"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("@"));
        assert!(memory.customers.is_empty());
    }

    #[tokio::test]
    async fn test_update_drifted_customer_through_api() {
        let memory = MemoryBackends::new();
        let mut customer = Customer::new("Lerato", "Dube", "lerato@example.com");
        customer.partition_key = "customers".into();
        memory.customers.seed_row(customer.to_entity()).unwrap();
        let uri = format!("/api/customers/{}", customer.id);

        let (status, body) = call(
            &memory,
            "PUT",
            &uri,
            Some(json!({"email": "lerato.dube@example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["record"]["email"], "lerato.dube@example.com");

        let (status, body) = call(&memory, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "lerato.dube@example.com");
    }

    #[tokio::test]
    async fn test_missing_customer_is_404() {
        let memory = MemoryBackends::new();
        let (status, _) = call(&memory, "GET", "/api/customers/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&memory, "DELETE", "/api/customers/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&memory, "PUT", "/api/customers/nope", Some(json!({}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_diagnose_lists_every_probe() {
        let memory = MemoryBackends::new();
        let (status, body) = call(&memory, "GET", "/api/customers/ghost/diagnose", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["probes"].as_array().unwrap().len(), 6);
        assert!(body["resolved_by"].is_null());
    }
}
