//! Queue REST API backend addressed by a pre-signed queue URL.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, Response};
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use super::clip_error_body;
use super::queue::{MAX_BATCH, QueueError, QueueStore, RawQueueMessage, clamp_visibility};

const API_VERSION: &str = "2019-02-02";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MESSAGE_COUNT_HEADER: &str = "x-ms-approximate-messages-count";

#[derive(Debug, Default, Deserialize)]
struct QueueMessagesList {
    #[serde(rename = "QueueMessage", default)]
    messages: Vec<QueueMessageXml>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct QueueMessageXml {
    message_id: String,
    #[serde(default)]
    insertion_time: Option<String>,
    #[serde(default)]
    pop_receipt: Option<String>,
    #[serde(default)]
    dequeue_count: u32,
    #[serde(default)]
    message_text: String,
}

impl From<QueueMessageXml> for RawQueueMessage {
    fn from(xml: QueueMessageXml) -> Self {
        Self {
            message_id: xml.message_id,
            pop_receipt: xml.pop_receipt,
            dequeue_count: xml.dequeue_count,
            insertion_time: xml
                .insertion_time
                .and_then(|t| DateTime::parse_from_rfc2822(&t).ok())
                .map(|t| t.with_timezone(&Utc)),
            text: xml.message_text,
        }
    }
}

/// Parse a `QueueMessagesList` response body.
///
/// # Errors
///
/// Returns `QueueError::Xml` if the body is not a valid message list.
pub fn parse_message_list(xml: &str) -> Result<Vec<RawQueueMessage>, QueueError> {
    if xml.trim().is_empty() {
        return Ok(Vec::new());
    }
    let list: QueueMessagesList =
        quick_xml::de::from_str(xml).map_err(|e| QueueError::Xml(e.to_string()))?;
    Ok(list.messages.into_iter().map(RawQueueMessage::from).collect())
}

/// Map a non-success response onto a [`QueueError`].
async fn error_from_response(response: Response) -> QueueError {
    QueueError::Api {
        status: response.status().as_u16(),
        message: clip_error_body(response.text().await.unwrap_or_default()),
    }
}

/// Request body for a put-message call.
#[must_use]
pub fn message_body(text: &str) -> String {
    format!(
        "<QueueMessage><MessageText>{}</MessageText></QueueMessage>",
        quick_xml::escape::escape(text)
    )
}

/// [`QueueStore`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpQueue {
    client: Client,
    /// Queue URL without the query string.
    base: Url,
    /// SAS query string.
    sas: String,
}

impl HttpQueue {
    /// Create a client from a pre-signed queue URL
    /// (`https://acct.queue.core.windows.net/<queue>?sv=...&sig=...`).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(sas_url: &Url) -> Result<Self, QueueError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let mut base = sas_url.clone();
        let sas = base.query().unwrap_or_default().to_owned();
        base.set_query(None);
        Ok(Self { client, base, sas })
    }

    /// Name of the queue (last path segment).
    #[must_use]
    pub fn queue_name(&self) -> &str {
        self.base
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default()
    }

    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url, QueueError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| QueueError::Encoding(format!("queue URL cannot be a base: {}", self.base)))?
            .pop_if_empty()
            .extend(segments);
        let mut encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(query)
            .finish();
        if !self.sas.is_empty() {
            if !encoded.is_empty() {
                encoded.push('&');
            }
            encoded.push_str(&self.sas);
        }
        url.set_query((!encoded.is_empty()).then_some(encoded.as_str()));
        Ok(url)
    }

    async fn send_request(
        &self,
        method: Method,
        url: Url,
        body: Option<String>,
    ) -> Result<Response, QueueError> {
        let mut request = self
            .client
            .request(method, url)
            .header("x-ms-version", API_VERSION);
        if let Some(body) = body {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/xml")
                .body(body);
        }
        let response = request.send().await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_from_response(response).await)
        }
    }

    async fn get_messages(&self, query: &[(&str, &str)]) -> Result<Vec<RawQueueMessage>, QueueError> {
        let url = self.url(&["messages"], query)?;
        let body = self.send_request(Method::GET, url, None).await?.text().await?;
        parse_message_list(&body)
    }
}

#[async_trait]
impl QueueStore for HttpQueue {
    #[instrument(skip(self, text), fields(queue = %self.queue_name()))]
    async fn send(&self, text: &str) -> Result<(), QueueError> {
        let url = self.url(&["messages"], &[])?;
        self.send_request(Method::POST, url, Some(message_body(text)))
            .await?;
        debug!("Message enqueued");
        Ok(())
    }

    #[instrument(skip(self), fields(queue = %self.queue_name()))]
    async fn peek(&self, max: u8) -> Result<Vec<RawQueueMessage>, QueueError> {
        let count = max.clamp(1, MAX_BATCH).to_string();
        self.get_messages(&[("peekonly", "true"), ("numofmessages", &count)])
            .await
    }

    #[instrument(skip(self), fields(queue = %self.queue_name()))]
    async fn receive(
        &self,
        max: u8,
        visibility: Duration,
    ) -> Result<Vec<RawQueueMessage>, QueueError> {
        let count = max.clamp(1, MAX_BATCH).to_string();
        let timeout = clamp_visibility(visibility).as_secs().to_string();
        self.get_messages(&[("numofmessages", &count), ("visibilitytimeout", &timeout)])
            .await
    }

    #[instrument(skip(self, pop_receipt), fields(queue = %self.queue_name()))]
    async fn delete(&self, message_id: &str, pop_receipt: &str) -> Result<(), QueueError> {
        let url = self.url(&["messages", message_id], &[("popreceipt", pop_receipt)])?;
        self.send_request(Method::DELETE, url, None).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(queue = %self.queue_name()))]
    async fn clear(&self) -> Result<(), QueueError> {
        let url = self.url(&["messages"], &[])?;
        self.send_request(Method::DELETE, url, None).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(queue = %self.queue_name()))]
    async fn approximate_count(&self) -> Result<u64, QueueError> {
        let url = self.url(&[], &[("comp", "metadata")])?;
        let response = self.send_request(Method::GET, url, None).await?;
        response
            .headers()
            .get(MESSAGE_COUNT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| QueueError::Xml(format!("missing {MESSAGE_COUNT_HEADER} header")))
    }
}
