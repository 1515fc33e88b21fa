//! Request signing for the table REST API.
//!
//! Two credential kinds are supported: an account key (signed per request
//! with the SharedKeyLite scheme) or a SAS token appended to every URL.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use super::table::StorageError;

/// Credentials for the table endpoint.
#[derive(Clone)]
pub enum TableCredentials {
    /// Storage account name and base64 account key.
    SharedKey {
        account: String,
        key: SecretString,
    },
    /// SAS token (query string, with or without leading `?`).
    Sas(SecretString),
}

impl std::fmt::Debug for TableCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SharedKey { account, .. } => f
                .debug_struct("SharedKey")
                .field("account", account)
                .field("key", &"[REDACTED]")
                .finish(),
            Self::Sas(_) => f.debug_tuple("Sas").field(&"[REDACTED]").finish(),
        }
    }
}

impl TableCredentials {
    /// SAS query string without a leading `?`, if this is a SAS credential.
    #[must_use]
    pub fn sas_query(&self) -> Option<&str> {
        match self {
            Self::Sas(token) => Some(token.expose_secret().trim_start_matches('?')),
            Self::SharedKey { .. } => None,
        }
    }
}

/// Format a timestamp for the `x-ms-date` header (RFC 1123).
#[must_use]
pub fn ms_date(now: DateTime<Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// SharedKeyLite string-to-sign for the table service.
///
/// `resource_path` is the URL path without the leading slash, e.g.
/// `Customers(PartitionKey='Customer',RowKey='42')`.
#[must_use]
pub fn string_to_sign(date: &str, account: &str, resource_path: &str) -> String {
    format!("{date}\n/{account}/{resource_path}")
}

/// Compute the `Authorization` header value.
///
/// # Errors
///
/// Returns `StorageError::Unavailable` if the account key is not valid base64.
pub fn shared_key_lite(
    account: &str,
    key: &SecretString,
    date: &str,
    resource_path: &str,
) -> Result<String, StorageError> {
    let key_bytes = BASE64
        .decode(key.expose_secret())
        .map_err(|e| StorageError::Unavailable(format!("account key is not base64: {e}")))?;
    let mut mac = Hmac::<Sha256>::new_from_slice(&key_bytes)
        .map_err(|e| StorageError::Unavailable(format!("invalid account key: {e}")))?;
    mac.update(string_to_sign(date, account, resource_path).as_bytes());
    let signature = BASE64.encode(mac.finalize().into_bytes());
    Ok(format!("SharedKeyLite {account}:{signature}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_ms_date_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
        assert_eq!(ms_date(at), "Tue, 05 Mar 2024 14:07:09 GMT");
    }

    #[test]
    fn test_string_to_sign_layout() {
        let sts = string_to_sign("Tue, 05 Mar 2024 14:07:09 GMT", "abcretail", "Customers()");
        assert_eq!(sts, "Tue, 05 Mar 2024 14:07:09 GMT\n/abcretail/Customers()");
    }

    #[test]
    fn test_signature_is_deterministic() {
        let key = SecretString::from(BASE64.encode(b"not-a-real-account-key"));
        let date = "Tue, 05 Mar 2024 14:07:09 GMT";
        let a = shared_key_lite("abcretail", &key, date, "Products()").unwrap();
        let b = shared_key_lite("abcretail", &key, date, "Products()").unwrap();
        let other = shared_key_lite("abcretail", &key, date, "Customers()").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, other);
        assert!(a.starts_with("SharedKeyLite abcretail:"));
    }

    #[test]
    fn test_rejects_non_base64_key() {
        let key = SecretString::from("%%%".to_owned());
        assert!(shared_key_lite("a", &key, "d", "T()").is_err());
    }

    #[test]
    fn test_sas_query_strips_question_mark() {
        let creds = TableCredentials::Sas(SecretString::from("?sv=2022&sig=abc".to_owned()));
        assert_eq!(creds.sas_query(), Some("sv=2022&sig=abc"));
        assert!(!format!("{creds:?}").contains("sig=abc"));
    }
}
