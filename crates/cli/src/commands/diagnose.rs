//! Probe every resolver step for one row key.

use abc_retail_admin::repository::{Diagnosis, ProbeOutcome};
use abc_retail_admin::state::Stores;
use tracing::{info, warn};

use super::{CommandError, RecordKind, print_json};

async fn diagnosis(stores: &Stores, kind: RecordKind, id: &str) -> Diagnosis {
    match kind {
        RecordKind::Customer => stores.customers.diagnose(id).await,
        RecordKind::Product => stores.products.diagnose(id).await,
        RecordKind::Order => stores.orders.diagnose(id).await,
    }
}

/// Print the diagnosis as JSON and summarize it in the log.
///
/// # Errors
///
/// Returns an error only if writing to stdout fails.
pub async fn run(stores: &Stores, kind: RecordKind, id: &str) -> Result<(), CommandError> {
    let diagnosis = diagnosis(stores, kind, id).await;

    for probe in &diagnosis.probes {
        match &probe.outcome {
            ProbeOutcome::Hit(partition_key) => info!(step = %probe.step, %partition_key, "hit"),
            ProbeOutcome::Miss => info!(step = %probe.step, "miss"),
            ProbeOutcome::Error(error) => warn!(step = %probe.step, %error, "error"),
        }
    }
    match &diagnosis.resolved_by {
        Some(step) => info!(%step, "Resolver would use this step"),
        None => warn!(kind = diagnosis.kind, id, "No step found the record"),
    }

    print_json(&diagnosis)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use abc_retail_admin::repository::{ResolveStep, TableRecord, UpdatePolicy};
    use abc_retail_admin::storage::MemoryBackends;
    use abc_retail_core::{Price, Product};

    use super::*;

    #[tokio::test]
    async fn test_diagnosis_reports_alias_hit() {
        let memory = MemoryBackends::new();
        let mut product = Product::new("Yoga Mat", Price::from_cents(3_999), 100);
        product.partition_key = "Products".into();
        memory.products.seed_row(product.to_entity()).unwrap();
        let stores = Stores::new(memory.backends(), UpdatePolicy::default());

        let diagnosis = diagnosis(&stores, RecordKind::Product, product.id.as_str()).await;
        assert_eq!(
            diagnosis.resolved_by,
            Some(ResolveStep::Alias("Products".into()))
        );
        assert!(matches!(diagnosis.probes[0].outcome, ProbeOutcome::Miss));
    }
}
