//! Table REST API backend.
//!
//! Talks OData JSON to the storage account's table endpoint. Reads ask for
//! minimal metadata so that rows in a query response carry `odata.etag`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{ACCEPT, CONTENT_TYPE, ETAG, HeaderMap, HeaderValue, IF_MATCH};
use reqwest::{Client, Method, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use super::auth::{TableCredentials, ms_date, shared_key_lite};
use super::clip_error_body;
use super::table::{IfMatch, StorageError, TableEntity, TableSnapshot, TableStore, odata_literal};

const API_VERSION: &str = "2019-02-02";
const ACCEPT_JSON: &str = "application/json;odata=minimalmetadata";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const NEXT_PARTITION_KEY: &str = "x-ms-continuation-NextPartitionKey";
const NEXT_ROW_KEY: &str = "x-ms-continuation-NextRowKey";

#[derive(Debug, Deserialize)]
struct QueryPage {
    #[serde(default)]
    value: Vec<Value>,
}

/// Shared HTTP client for every table in one storage account.
#[derive(Debug, Clone)]
pub struct HttpTableService {
    client: Client,
    endpoint: Url,
    credentials: TableCredentials,
    snapshot_sas: Option<SecretString>,
}

impl HttpTableService {
    /// Create a service for `endpoint` (e.g. `https://acct.table.core.windows.net`).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoint: Url, credentials: TableCredentials) -> Result<Self, StorageError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint,
            credentials,
            snapshot_sas: None,
        })
    }

    /// SAS token for the snapshot path when the main credential is an
    /// account key.
    #[must_use]
    pub fn with_snapshot_sas(mut self, sas: SecretString) -> Self {
        self.snapshot_sas = Some(sas);
        self
    }

    /// A store bound to one table.
    #[must_use]
    pub fn table(&self, name: impl Into<String>) -> HttpTable {
        HttpTable {
            service: self.clone(),
            name: name.into(),
        }
    }

    /// A read-all snapshot reader for one table. Needs a SAS token, since the
    /// snapshot path is a plain pre-signed GET.
    #[must_use]
    pub fn snapshot(&self, name: impl Into<String>) -> Option<SasSnapshot> {
        let sas = self
            .snapshot_sas
            .as_ref()
            .map(|s| s.expose_secret().trim_start_matches('?'))
            .or_else(|| self.credentials.sas_query())?
            .to_owned();
        Some(SasSnapshot {
            client: self.client.clone(),
            endpoint: self.endpoint.clone(),
            table: name.into(),
            sas,
        })
    }

    /// Build the URL for `resource` plus query pairs and the SAS token.
    fn url(&self, resource: &str, query: &[(&str, &str)]) -> Result<Url, StorageError> {
        build_url(
            &self.endpoint,
            resource,
            query,
            self.credentials.sas_query(),
        )
    }

    async fn send(
        &self,
        method: Method,
        resource: &str,
        query: &[(&str, &str)],
        if_match: Option<&IfMatch>,
        body: Option<&Value>,
    ) -> Result<Response, StorageError> {
        let url = self.url(resource, query)?;
        let date = ms_date(Utc::now());

        let mut headers = HeaderMap::new();
        headers.insert("x-ms-version", HeaderValue::from_static(API_VERSION));
        headers.insert("DataServiceVersion", HeaderValue::from_static("3.0;NetFx"));
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_JSON));
        headers.insert("x-ms-date", header_value(&date)?);
        if let Some(if_match) = if_match {
            headers.insert(IF_MATCH, header_value(if_match.header_value())?);
        }
        if let TableCredentials::SharedKey { account, key } = &self.credentials {
            let resource_path = url.path().trim_start_matches('/');
            let auth = shared_key_lite(account, key, &date, resource_path)?;
            headers.insert(reqwest::header::AUTHORIZATION, header_value(&auth)?);
        }

        let mut request = self.client.request(method, url).headers(headers);
        if let Some(body) = body {
            request = request
                .header(CONTENT_TYPE, "application/json")
                .header("Prefer", "return-no-content")
                .json(body);
        }
        Ok(request.send().await?)
    }
}

/// [`TableStore`] over HTTP for a single table.
#[derive(Debug, Clone)]
pub struct HttpTable {
    service: HttpTableService,
    name: String,
}

impl HttpTable {
    fn entity_resource(&self, partition_key: &str, row_key: &str) -> String {
        format!(
            "{}(PartitionKey={},RowKey={})",
            self.name,
            odata_literal(partition_key),
            odata_literal(row_key)
        )
    }
}

#[async_trait]
impl TableStore for HttpTable {
    fn table_name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(table = %self.name))]
    async fn get_entity(
        &self,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<TableEntity>, StorageError> {
        let resource = self.entity_resource(partition_key, row_key);
        let response = self
            .service
            .send(Method::GET, &resource, &[], None, None)
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let etag = etag_header(&response);
                let body: Value = response
                    .json()
                    .await
                    .map_err(|e| StorageError::Decode(e.to_string()))?;
                TableEntity::from_json(body, etag).map(Some)
            }
            _ => Err(error_from_response(response).await),
        }
    }

    #[instrument(skip(self), fields(table = %self.name))]
    async fn query(&self, filter: Option<&str>) -> Result<Vec<TableEntity>, StorageError> {
        let resource = format!("{}()", self.name);
        let service = &self.service;
        fetch_pages(|continuation| {
            let resource = resource.clone();
            async move {
                let mut query: Vec<(&str, &str)> = Vec::new();
                if let Some(filter) = filter {
                    query.push(("$filter", filter));
                }
                if let Some((pk, rk)) = &continuation {
                    query.push(("NextPartitionKey", pk.as_str()));
                    query.push(("NextRowKey", rk.as_str()));
                }
                service.send(Method::GET, &resource, &query, None, None).await
            }
        })
        .await
    }

    #[instrument(skip(self, entity), fields(table = %self.name, row_key = %entity.row_key))]
    async fn insert(&self, entity: &TableEntity) -> Result<TableEntity, StorageError> {
        let body = entity.to_json();
        let response = self
            .service
            .send(Method::POST, &self.name, &[], None, Some(&body))
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        let mut stored = entity.clone();
        stored.etag = etag_header(&response);
        debug!("Inserted entity");
        Ok(stored)
    }

    #[instrument(skip(self, entity), fields(table = %self.name, row_key = %entity.row_key))]
    async fn merge(&self, entity: &TableEntity, if_match: IfMatch) -> Result<String, StorageError> {
        let method = Method::from_bytes(b"MERGE")
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        let resource = self.entity_resource(&entity.partition_key, &entity.row_key);
        let body = entity.to_json();
        let response = self
            .service
            .send(method, &resource, &[], Some(&if_match), Some(&body))
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        etag_header(&response)
            .ok_or_else(|| StorageError::Decode("merge response has no ETag".into()))
    }

    #[instrument(skip(self), fields(table = %self.name))]
    async fn delete(
        &self,
        partition_key: &str,
        row_key: &str,
        if_match: IfMatch,
    ) -> Result<(), StorageError> {
        let resource = self.entity_resource(partition_key, row_key);
        let response = self
            .service
            .send(Method::DELETE, &resource, &[], Some(&if_match), None)
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(error_from_response(response).await)
        }
    }
}

/// Read-all through a pre-signed URL, following continuation tokens.
#[derive(Debug, Clone)]
pub struct SasSnapshot {
    client: Client,
    endpoint: Url,
    table: String,
    sas: String,
}

#[async_trait]
impl TableSnapshot for SasSnapshot {
    #[instrument(skip(self), fields(table = %self.table))]
    async fn fetch_all(&self) -> Result<Vec<TableEntity>, StorageError> {
        let resource = format!("{}()", self.table);
        fetch_pages(|continuation| {
            let url = continuation
                .as_ref()
                .map_or_else(
                    || build_url(&self.endpoint, &resource, &[], Some(&self.sas)),
                    |(pk, rk)| {
                        build_url(
                            &self.endpoint,
                            &resource,
                            &[("NextPartitionKey", pk.as_str()), ("NextRowKey", rk.as_str())],
                            Some(&self.sas),
                        )
                    },
                );
            let client = self.client.clone();
            async move {
                Ok(client
                    .get(url?)
                    .header(ACCEPT, ACCEPT_JSON)
                    .header("x-ms-version", API_VERSION)
                    .send()
                    .await?)
            }
        })
        .await
    }
}

/// Drive a paged query: call `request` with the previous continuation until
/// the service stops returning one.
async fn fetch_pages<F, Fut>(mut request: F) -> Result<Vec<TableEntity>, StorageError>
where
    F: FnMut(Option<(String, String)>) -> Fut,
    Fut: Future<Output = Result<Response, StorageError>>,
{
    let mut rows = Vec::new();
    let mut continuation = None;
    loop {
        let response = request(continuation.take()).await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        let next = continuation_from(response.headers());
        let page: QueryPage = response
            .json()
            .await
            .map_err(|e| StorageError::Decode(e.to_string()))?;
        for row in page.value {
            rows.push(TableEntity::from_json(row, None)?);
        }
        match next {
            Some(token) => continuation = Some(token),
            None => break,
        }
    }
    Ok(rows)
}

fn continuation_from(headers: &HeaderMap) -> Option<(String, String)> {
    let pk = headers.get(NEXT_PARTITION_KEY)?.to_str().ok()?.to_owned();
    let rk = headers
        .get(NEXT_ROW_KEY)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    Some((pk, rk))
}

/// Append `resource` to `endpoint` and attach query pairs plus a raw SAS query.
fn build_url(
    endpoint: &Url,
    resource: &str,
    query: &[(&str, &str)],
    sas: Option<&str>,
) -> Result<Url, StorageError> {
    let mut url = endpoint.clone();
    url.path_segments_mut()
        .map_err(|()| StorageError::Unavailable(format!("endpoint cannot be a base: {endpoint}")))?
        .pop_if_empty()
        .push(resource);

    // form_urlencoded writes spaces as '+'; the table service wants %20.
    let mut encoded = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(query)
        .finish()
        .replace('+', "%20");
    if let Some(sas) = sas.filter(|s| !s.is_empty()) {
        if !encoded.is_empty() {
            encoded.push('&');
        }
        encoded.push_str(sas);
    }
    url.set_query((!encoded.is_empty()).then_some(encoded.as_str()));
    Ok(url)
}

fn header_value(value: &str) -> Result<HeaderValue, StorageError> {
    HeaderValue::from_str(value).map_err(|e| StorageError::Unavailable(e.to_string()))
}

fn etag_header(response: &Response) -> Option<String> {
    response
        .headers()
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

/// Map a non-success response onto a [`StorageError`].
async fn error_from_response(response: Response) -> StorageError {
    let status = response.status();
    match status {
        StatusCode::NOT_FOUND => StorageError::NotFound,
        StatusCode::CONFLICT => StorageError::Conflict,
        StatusCode::PRECONDITION_FAILED => StorageError::PreconditionFailed,
        _ => {
            StorageError::Api {
                status: status.as_u16(),
                message: clip_error_body(response.text().await.unwrap_or_default()),
            }
        }
    }
}
