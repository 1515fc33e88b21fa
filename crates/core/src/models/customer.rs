//! Customer record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::CustomerId;

/// A retail customer.
///
/// `email` is kept as a plain string because rows written by other tools may
/// hold blank or malformed addresses; input validation happens at the API
/// boundary with [`Email`](crate::Email).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub partition_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
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
    pub is_active: bool,
    pub created_date: DateTime<Utc>,
}

impl Customer {
    /// Partition key every write uses.
    pub const PARTITION_KEY: &'static str = "Customer";

    /// Create an active customer with a fresh id under the canonical partition.
    #[must_use]
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
            ..Self::default()
        }
    }

    /// "First Last", trimmed when either part is blank.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_owned()
    }
}

impl Default for Customer {
    fn default() -> Self {
        Self {
            id: CustomerId::generate(),
            partition_key: Self::PARTITION_KEY.to_owned(),
            etag: None,
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            phone: String::new(),
            address: String::new(),
            city: String::new(),
            state: String::new(),
            zip_code: String::new(),
            is_active: true,
            created_date: Utc::now(),
        }
    }
}
