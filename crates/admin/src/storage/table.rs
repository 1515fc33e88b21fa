//! Partitioned table storage abstraction.
//!
//! A [`TableStore`] is bound to one table. Rows are [`TableEntity`] values:
//! the two keys, an optional version tag, and a flat bag of JSON properties.
//! Typed properties (`Edm.Double`, `Edm.DateTime`) carry an
//! `<name>@odata.type` annotation on the way out and have it stripped on the
//! way back in, so backends always hand out plain properties.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

/// Suffix used by OData for property type annotations.
const TYPE_ANNOTATION: &str = "@odata.type";

/// Errors returned by table backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Transport-level failure (connect, timeout, TLS).
    #[error("storage request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with an unexpected status.
    #[error("storage API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The addressed row does not exist.
    #[error("entity not found")]
    NotFound,

    /// An insert collided with an existing row.
    #[error("entity already exists")]
    Conflict,

    /// The `If-Match` version tag did not match the stored row.
    #[error("version tag mismatch")]
    PreconditionFailed,

    /// The response body could not be understood.
    #[error("could not decode storage response: {0}")]
    Decode(String),

    /// The backend refused to serve the request (also used for injected faults).
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Version precondition for merges and deletes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IfMatch {
    /// Write regardless of the stored version.
    Any,
    /// Write only if the stored version equals this tag.
    Etag(String),
}

impl IfMatch {
    /// Value for the `If-Match` header.
    #[must_use]
    pub fn header_value(&self) -> &str {
        match self {
            Self::Any => "*",
            Self::Etag(tag) => tag,
        }
    }

    /// `Etag` for a non-empty tag, `Any` otherwise.
    #[must_use]
    pub fn from_optional(etag: Option<&str>) -> Self {
        match etag {
            Some(tag) if !tag.is_empty() => Self::Etag(tag.to_owned()),
            _ => Self::Any,
        }
    }
}

/// One row of a table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableEntity {
    pub partition_key: String,
    pub row_key: String,
    pub etag: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub properties: Map<String, Value>,
}

impl TableEntity {
    #[must_use]
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            ..Self::default()
        }
    }

    /// Set an untyped property (string, bool, Int32).
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(name.to_owned(), value.into());
        self
    }

    /// Set a property stored as `Edm.Double`.
    #[must_use]
    pub fn with_double(mut self, name: &str, value: f64) -> Self {
        self.properties.insert(name.to_owned(), Value::from(value));
        self.properties
            .insert(format!("{name}{TYPE_ANNOTATION}"), "Edm.Double".into());
        self
    }

    /// Set a property stored as `Edm.DateTime`. `None` leaves it unset.
    #[must_use]
    pub fn with_datetime(mut self, name: &str, value: Option<DateTime<Utc>>) -> Self {
        if let Some(value) = value {
            self.properties.insert(
                name.to_owned(),
                value.to_rfc3339_opts(SecondsFormat::Millis, true).into(),
            );
            self.properties
                .insert(format!("{name}{TYPE_ANNOTATION}"), "Edm.DateTime".into());
        }
        self
    }

    /// String property, `None` if absent or not a string.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(Value::as_str)
    }

    /// String property or empty string.
    #[must_use]
    pub fn string_or_default(&self, name: &str) -> String {
        self.get_str(name).unwrap_or_default().to_owned()
    }

    /// Boolean property. Accepts `"true"`/`"false"` strings from loose writers.
    #[must_use]
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.properties.get(name)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Integer property. Accepts numeric strings (Int64 is sent as a string).
    #[must_use]
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.properties.get(name)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Floating point property. Accepts numeric strings.
    #[must_use]
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        match self.properties.get(name)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Date-time property parsed from RFC 3339.
    #[must_use]
    pub fn get_datetime(&self, name: &str) -> Option<DateTime<Utc>> {
        self.get_str(name)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Wire body: keys plus properties (with type annotations).
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut body = self.properties.clone();
        body.insert("PartitionKey".into(), self.partition_key.clone().into());
        body.insert("RowKey".into(), self.row_key.clone().into());
        Value::Object(body)
    }

    /// Build an entity from a row object as returned by a query or point read.
    ///
    /// `odata.*` metadata and type annotations are removed. The version tag is
    /// taken from `odata.etag` when present, `etag` otherwise.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Decode` if the value is not an object or lacks
    /// either key.
    pub fn from_json(value: Value, etag: Option<String>) -> Result<Self, StorageError> {
        let Value::Object(mut props) = value else {
            return Err(StorageError::Decode("row is not a JSON object".into()));
        };

        let partition_key = take_string(&mut props, "PartitionKey")
            .ok_or_else(|| StorageError::Decode("row has no PartitionKey".into()))?;
        let row_key = take_string(&mut props, "RowKey")
            .ok_or_else(|| StorageError::Decode("row has no RowKey".into()))?;
        let body_etag = take_string(&mut props, "odata.etag");
        let timestamp = take_string(&mut props, "Timestamp")
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        strip_annotations(&mut props);

        Ok(Self {
            partition_key,
            row_key,
            etag: body_etag.or(etag),
            timestamp,
            properties: props,
        })
    }
}

fn take_string(props: &mut Map<String, Value>, key: &str) -> Option<String> {
    match props.remove(key)? {
        Value::String(s) => Some(s),
        _ => None,
    }
}

/// Remove OData metadata and `@odata.type` annotations.
pub fn strip_annotations(props: &mut Map<String, Value>) {
    props.retain(|k, _| !k.starts_with("odata.") && !k.ends_with(TYPE_ANNOTATION));
}

/// Quote a string literal for an OData `$filter` expression.
///
/// ```
/// use abc_retail_admin::storage::odata_literal;
///
/// assert_eq!(odata_literal("O'Brien"), "'O''Brien'");
/// ```
#[must_use]
pub fn odata_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `$filter` expression matching one row key in any partition.
#[must_use]
pub fn row_key_filter(row_key: &str) -> String {
    format!("RowKey eq {}", odata_literal(row_key))
}

/// Access to a single table.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Name of the table this store is bound to.
    fn table_name(&self) -> &str;

    /// Point read. `Ok(None)` when the row does not exist.
    async fn get_entity(
        &self,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<TableEntity>, StorageError>;

    /// Query with an optional `$filter`, following continuation tokens.
    async fn query(&self, filter: Option<&str>) -> Result<Vec<TableEntity>, StorageError>;

    /// Insert a new row. Returns the row with its new version tag.
    async fn insert(&self, entity: &TableEntity) -> Result<TableEntity, StorageError>;

    /// Merge properties into an existing row. Returns the new version tag.
    async fn merge(&self, entity: &TableEntity, if_match: IfMatch) -> Result<String, StorageError>;

    /// Delete a row.
    async fn delete(
        &self,
        partition_key: &str,
        row_key: &str,
        if_match: IfMatch,
    ) -> Result<(), StorageError>;
}

/// Alternate read-everything path used when the primary store misbehaves.
#[async_trait]
pub trait TableSnapshot: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<TableEntity>, StorageError>;
}
