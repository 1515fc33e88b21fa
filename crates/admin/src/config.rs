//! Admin configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `ADMIN_API_KEY` - Shared secret expected in the `x-api-key` header (min 24 chars, high entropy)
//!
//! ## Table storage (one of)
//! - `AZURE_STORAGE_CONNECTION_STRING` - Account connection string (account key or SAS)
//! - `AZURE_STORAGE_ACCOUNT` + `AZURE_TABLE_SAS_TOKEN` - Account name and table SAS token
//!
//! Without either, the service runs on in-memory tables.
//!
//! ## Optional
//! - `ADMIN_HOST` - Bind address (default: 127.0.0.1)
//! - `ADMIN_PORT` - Listen port (default: 3001)
//! - `AZURE_TABLE_ENDPOINT` - Override the table endpoint URL
//! - `AZURE_TABLE_SAS_TOKEN` - With an account-key connection string, enables the snapshot read path
//! - `AZURE_QUEUE_SAS_URL` - Pre-signed URL of the inventory queue (or of the queue service)
//! - `TABLE_CUSTOMERS` / `TABLE_PRODUCTS` / `TABLE_ORDERS` - Table names
//! - `QUEUE_INVENTORY` - Queue name when `AZURE_QUEUE_SAS_URL` points at the service root
//! - `ABC_ALLOW_LOSSY_RECREATE` - Allow delete+recreate as the last update strategy (default: false)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

use crate::storage::auth::TableCredentials;

const MIN_API_KEY_LENGTH: usize = 24;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";
const DEFAULT_QUEUE_NAME: &str = "inventory-queue";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Admin application configuration.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Shared secret for the `x-api-key` header
    pub api_key: SecretString,
    /// Tables and queue
    pub backends: BackendConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "staging", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate for performance monitoring (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
}

/// Where records and notifications live.
///
/// Loaded separately from [`AdminConfig`] so tools that only touch storage
/// do not need the API key.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Table storage account (None = in-memory tables)
    pub storage: Option<TableStorageConfig>,
    /// Inventory queue (None = queue disabled)
    pub queue: Option<QueueConfig>,
    /// Table names
    pub tables: TableNames,
    /// Queue name, appended when the queue URL points at the service root
    pub queue_name: String,
    /// Whether the updater may fall back to delete+recreate
    pub allow_lossy_recreate: bool,
}

/// Names of the tables backing each record kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub customers: String,
    pub products: String,
    pub orders: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            customers: "Customers".to_owned(),
            products: "Products".to_owned(),
            orders: "Orders".to_owned(),
        }
    }
}

/// Table service endpoint and credentials.
#[derive(Debug, Clone)]
pub struct TableStorageConfig {
    /// Table endpoint, e.g. `https://acct.table.core.windows.net`
    pub endpoint: Url,
    /// Account key or SAS token
    pub credentials: TableCredentials,
    /// SAS token for the snapshot path when `credentials` is an account key
    pub snapshot_sas: Option<SecretString>,
}

/// Inventory queue location.
///
/// Implements `Debug` manually since the URL embeds a signature.
#[derive(Clone)]
pub struct QueueConfig {
    /// Pre-signed queue URL
    pub sas_url: SecretString,
}

impl std::fmt::Debug for QueueConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueConfig")
            .field("sas_url", &"[REDACTED]")
            .finish()
    }
}

impl QueueConfig {
    /// Parse the pre-signed URL. When it points at the queue service root,
    /// `queue_name` is appended.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if the URL does not parse.
    pub fn queue_url(&self, queue_name: &str) -> Result<Url, ConfigError> {
        let mut url = Url::parse(self.sas_url.expose_secret()).map_err(|e| {
            ConfigError::InvalidEnvVar("AZURE_QUEUE_SAS_URL".to_string(), e.to_string())
        })?;
        let at_root = url.path().trim_matches('/').is_empty();
        if at_root {
            url.path_segments_mut()
                .map_err(|()| {
                    ConfigError::InvalidEnvVar(
                        "AZURE_QUEUE_SAS_URL".to_string(),
                        "URL cannot be a base".to_string(),
                    )
                })?
                .pop_if_empty()
                .push(queue_name);
        }
        Ok(url)
    }
}

impl AdminConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the API key fails validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = get_env_or_default("ADMIN_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("ADMIN_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("ADMIN_PORT", "3001")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("ADMIN_PORT".to_string(), e.to_string()))?;
        let api_key = get_validated_secret("ADMIN_API_KEY")?;
        validate_min_length(&api_key, "ADMIN_API_KEY", MIN_API_KEY_LENGTH)?;

        let backends = BackendConfig::from_env()?;

        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);

        Ok(Self {
            host,
            port,
            api_key,
            backends,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            storage: None,
            queue: None,
            tables: TableNames::default(),
            queue_name: DEFAULT_QUEUE_NAME.to_owned(),
            allow_lossy_recreate: false,
        }
    }
}

impl BackendConfig {
    /// Load table, queue and updater settings from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the storage variables are inconsistent or
    /// malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            storage: TableStorageConfig::from_env()?,
            queue: get_optional_env("AZURE_QUEUE_SAS_URL").map(|url| QueueConfig {
                sas_url: SecretString::from(url),
            }),
            tables: TableNames {
                customers: get_env_or_default("TABLE_CUSTOMERS", "Customers"),
                products: get_env_or_default("TABLE_PRODUCTS", "Products"),
                orders: get_env_or_default("TABLE_ORDERS", "Orders"),
            },
            queue_name: get_env_or_default("QUEUE_INVENTORY", DEFAULT_QUEUE_NAME),
            allow_lossy_recreate: parse_bool_env("ABC_ALLOW_LOSSY_RECREATE")?,
        })
    }
}

impl TableStorageConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let endpoint_override = get_optional_env("AZURE_TABLE_ENDPOINT");
        let table_sas = get_optional_env("AZURE_TABLE_SAS_TOKEN").map(SecretString::from);

        if let Some(conn) = get_optional_env("AZURE_STORAGE_CONNECTION_STRING") {
            let mut config = Self::from_connection_string(&conn)?;
            if let Some(endpoint) = endpoint_override {
                config.endpoint = parse_url("AZURE_TABLE_ENDPOINT", &endpoint)?;
            }
            if matches!(config.credentials, TableCredentials::SharedKey { .. }) {
                config.snapshot_sas = table_sas;
            }
            return Ok(Some(config));
        }

        match (get_optional_env("AZURE_STORAGE_ACCOUNT"), table_sas) {
            (Some(account), Some(sas)) => {
                let endpoint = match endpoint_override {
                    Some(endpoint) => parse_url("AZURE_TABLE_ENDPOINT", &endpoint)?,
                    None => default_table_endpoint("https", &account, DEFAULT_ENDPOINT_SUFFIX)?,
                };
                Ok(Some(Self {
                    endpoint,
                    credentials: TableCredentials::Sas(sas),
                    snapshot_sas: None,
                }))
            }
            (None, None) => Ok(None),
            _ => Err(ConfigError::InvalidEnvVar(
                "AZURE_STORAGE_ACCOUNT".to_string(),
                "AZURE_STORAGE_ACCOUNT and AZURE_TABLE_SAS_TOKEN must be set together".to_string(),
            )),
        }
    }

    /// Parse an account connection string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string has neither `AccountKey` nor
    /// `SharedAccessSignature`, or if no table endpoint can be derived.
    pub fn from_connection_string(conn: &str) -> Result<Self, ConfigError> {
        const VAR: &str = "AZURE_STORAGE_CONNECTION_STRING";
        let parts: HashMap<&str, &str> = conn
            .split(';')
            .filter_map(|part| part.split_once('='))
            .map(|(k, v)| (k.trim(), v.trim()))
            .collect();

        let account = parts.get("AccountName").copied();
        let endpoint = match (parts.get("TableEndpoint"), account) {
            (Some(endpoint), _) => parse_url(VAR, endpoint)?,
            (None, Some(account)) => default_table_endpoint(
                parts.get("DefaultEndpointsProtocol").copied().unwrap_or("https"),
                account,
                parts
                    .get("EndpointSuffix")
                    .copied()
                    .unwrap_or(DEFAULT_ENDPOINT_SUFFIX),
            )?,
            (None, None) => {
                return Err(ConfigError::InvalidEnvVar(
                    VAR.to_string(),
                    "needs AccountName or TableEndpoint".to_string(),
                ));
            }
        };

        let credentials = match (parts.get("AccountKey"), parts.get("SharedAccessSignature")) {
            (Some(key), _) => TableCredentials::SharedKey {
                account: account
                    .ok_or_else(|| {
                        ConfigError::InvalidEnvVar(
                            VAR.to_string(),
                            "AccountKey requires AccountName".to_string(),
                        )
                    })?
                    .to_owned(),
                key: SecretString::from(*key),
            },
            (None, Some(sas)) => TableCredentials::Sas(SecretString::from(*sas)),
            (None, None) => {
                return Err(ConfigError::InvalidEnvVar(
                    VAR.to_string(),
                    "needs AccountKey or SharedAccessSignature".to_string(),
                ));
            }
        };

        Ok(Self {
            endpoint,
            credentials,
            snapshot_sas: None,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable. Blank values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse a boolean flag (`true`/`false`/`1`/`0`, default false).
fn parse_bool_env(key: &str) -> Result<bool, ConfigError> {
    match get_optional_env(key).as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("false" | "0" | "no") => Ok(false),
        Some("true" | "1" | "yes") => Ok(true),
        Some(other) => Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("expected true or false, got '{other}'"),
        )),
    }
}

fn parse_url(var: &str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|e| ConfigError::InvalidEnvVar(var.to_string(), e.to_string()))
}

fn default_table_endpoint(protocol: &str, account: &str, suffix: &str) -> Result<Url, ConfigError> {
    parse_url(
        "AZURE_STORAGE_ACCOUNT",
        &format!("{protocol}://{account}.table.{suffix}"),
    )
}

/// Validate that a secret meets a minimum length.
fn validate_min_length(secret: &SecretString, var_name: &str, min: usize) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < min {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!("must be at least {min} characters (got {})", value.len()),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
