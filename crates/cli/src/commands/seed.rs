//! Seed empty tables and an empty queue with demo data.
//!
//! Without `--file` the built-in demo set is used. A seed file looks like:
//!
//! ```yaml
//! customers:
//!   - first_name: Jane
//!     last_name: Smith
//!     email: jane.smith@email.com
//! products:
//!   - name: Yoga Mat
//!     price: "39.99"
//!     stock_quantity: 100
//! messages:
//!   - type: restock_request
//!     productName: USB Keyboard
//!     quantity: 50
//!     action: restock_request
//! ```

use std::path::Path;

use abc_retail_admin::services::{SeedData, seed};
use abc_retail_admin::state::Stores;
use tracing::info;

use super::CommandError;

/// Load seed data from a YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub async fn load(path: &Path) -> Result<SeedData, CommandError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CommandError::Read {
            path: path.display().to_string(),
            source,
        })?;
    Ok(serde_yaml::from_str(&content)?)
}

/// Seed the stores, skipping any that already hold data.
///
/// # Errors
///
/// Returns an error if the seed file is invalid or a write fails.
pub async fn run(stores: &Stores, file: Option<&Path>) -> Result<(), CommandError> {
    let data = match file {
        Some(path) => {
            info!(path = %path.display(), "Loading seed data from file");
            load(path).await?
        }
        None => SeedData::demo(),
    };

    let report = seed(stores, &data).await?;

    info!("Seeding complete!");
    info!("  Customers inserted: {}", report.customers);
    info!("  Products inserted: {}", report.products);
    info!("  Queue messages sent: {}", report.messages);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use abc_retail_admin::repository::UpdatePolicy;
    use abc_retail_admin::storage::MemoryBackends;

    use super::*;

    #[tokio::test]
    async fn test_load_yaml_seed_file() {
        let path = std::env::temp_dir().join(format!("abc-seed-{}.yaml", std::process::id()));
        tokio::fs::write(
            &path,
            r#"
customers:
  - first_name: Ayanda
    last_name: Zulu
    email: ayanda@example.com
products:
  - name: Desk Lamp
    price: "24.50"
    stock_quantity: 4
messages:
  - type: restock_request
    productName: Desk Lamp
    quantity: 20
    action: restock_request
    priority: urgent
"#,
        )
        .await
        .unwrap();

        let data = load(&path).await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();
        assert_eq!(data.customers.len(), 1);
        assert_eq!(data.products[0].stock_quantity, 4);
        assert_eq!(data.messages[0].priority.as_str(), "urgent");

        let memory = MemoryBackends::new();
        let stores = Stores::new(memory.backends(), UpdatePolicy::default());
        let report = seed(&stores, &data).await.unwrap();
        assert_eq!((report.customers, report.products, report.messages), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_missing_file_names_path() {
        let err = load(Path::new("/nonexistent/seed.yaml")).await.unwrap_err();
        assert!(err.to_string().contains("/nonexistent/seed.yaml"));
    }
}
