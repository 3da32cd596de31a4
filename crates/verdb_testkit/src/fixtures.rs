//! Engine fixtures and store invariant checks.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use verdb_core::{
    Config, ResourceService, TransactionCoordinator, TransactionOutcome, TransactionRequest,
};
use verdb_store::{DocumentStatus, InMemoryStore, Item, ItemKey, ItemStore};

/// The parts of a stored version a rollback must restore exactly.
pub type VersionSnapshot = (String, u64, DocumentStatus, serde_json::Value);

/// A coordinator over a fresh in-memory store.
pub struct TestEngine {
    /// The backing store, shared with the coordinator.
    pub store: Arc<InMemoryStore>,
    /// Configuration the coordinator was built with.
    pub config: Config,
    /// The coordinator under test.
    pub coordinator: TransactionCoordinator,
}

impl TestEngine {
    /// Creates an engine with the default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates an engine with `config`.
    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let coordinator = TransactionCoordinator::new(store.clone(), &config);
        Self {
            store,
            config,
            coordinator,
        }
    }

    /// Returns the table transactions run against.
    pub fn table(&self) -> &str {
        &self.config.resource_table
    }

    /// Writes versions `1..=statuses.len()` of `id` with the given statuses.
    ///
    /// Leases are left expired.
    pub fn seed_history(&self, kind: &str, id: &str, statuses: &[DocumentStatus]) {
        for (version, status) in (1u64..).zip(statuses) {
            self.store
                .put_item(
                    self.table(),
                    Item {
                        id: id.to_string(),
                        version,
                        resource_kind: kind.to_string(),
                        payload: serde_json::json!({ "id": id, "version": version }),
                        last_modified: Utc::now(),
                        document_status: *status,
                        lock_expiry_ms: 0,
                    },
                )
                .expect("Failed to seed version");
        }
    }

    /// Writes a single available version of `id`.
    pub fn seed_available(&self, kind: &str, id: &str) {
        self.seed_history(kind, id, &[DocumentStatus::Available]);
    }

    /// Runs `requests` as one transaction started now.
    pub fn run(&self, requests: &[TransactionRequest]) -> TransactionOutcome {
        self.coordinator.transaction(requests, Instant::now())
    }

    /// Returns every stored version in key order.
    pub fn items(&self) -> Vec<Item> {
        self.store.items(self.table())
    }

    /// Returns the status of one version, if stored.
    pub fn status_of(&self, id: &str, version: u64) -> Option<DocumentStatus> {
        self.store
            .get_item(self.table(), &ItemKey::new(id, version))
            .expect("Failed to read version")
            .map(|item| item.document_status)
    }

    /// Returns the rollback-relevant state of every stored version.
    pub fn snapshot(&self) -> Vec<VersionSnapshot> {
        self.items()
            .into_iter()
            .map(|item| (item.id, item.version, item.document_status, item.payload))
            .collect()
    }

    /// Returns a resource service sharing this engine's store.
    pub fn service(&self) -> ResourceService {
        ResourceService::new(self.store.clone(), self.config.clone())
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a test with a fresh engine.
pub fn with_engine<F, R>(f: F) -> R
where
    F: FnOnce(&TestEngine) -> R,
{
    let engine = TestEngine::new();
    f(&engine)
}

/// Lists every way `items` breaks the resting-state invariants.
///
/// Outside a running transaction every version is `AVAILABLE` or `DELETED`,
/// and each id has at most one `AVAILABLE` version.
pub fn invariant_violations(items: &[Item]) -> Vec<String> {
    let mut violations = Vec::new();
    let mut available: HashMap<&str, usize> = HashMap::new();
    for item in items {
        if !item.document_status.is_terminal() {
            violations.push(format!(
                "{} is left {}",
                item.key(),
                item.document_status
            ));
        }
        if item.document_status == DocumentStatus::Available {
            *available.entry(item.id.as_str()).or_default() += 1;
        }
    }
    let mut crowded: Vec<_> = available.into_iter().filter(|(_, n)| *n > 1).collect();
    crowded.sort_unstable();
    for (id, count) in crowded {
        violations.push(format!("{id} has {count} available versions"));
    }
    violations
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates an engine holding `count` patients, each with one deleted
    /// and one available version.
    pub fn populated_engine(count: usize) -> TestEngine {
        let engine = TestEngine::new();
        for id in patient_ids(count) {
            engine.seed_history(
                "Patient",
                &id,
                &[DocumentStatus::Deleted, DocumentStatus::Available],
            );
        }
        engine
    }

    /// Returns the ids used by [`populated_engine`].
    pub fn patient_ids(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("patient-{i}")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_history_is_versioned_from_one() {
        with_engine(|engine| {
            engine.seed_history(
                "Patient",
                "p1",
                &[DocumentStatus::Deleted, DocumentStatus::Available],
            );
            assert_eq!(engine.status_of("p1", 1), Some(DocumentStatus::Deleted));
            assert_eq!(engine.status_of("p1", 2), Some(DocumentStatus::Available));
            assert_eq!(engine.status_of("p1", 3), None);
        });
    }

    #[test]
    fn detects_invariant_violations() {
        let engine = TestEngine::new();
        engine.seed_history(
            "Patient",
            "p1",
            &[DocumentStatus::Available, DocumentStatus::Available],
        );
        engine.seed_history("Patient", "p2", &[DocumentStatus::Pending]);

        let violations = invariant_violations(&engine.items());
        assert_eq!(violations.len(), 2);
        assert!(violations[0].contains("p2_1"));
        assert!(violations[1].contains("p1 has 2"));
    }

    #[test]
    fn populated_scenario_is_consistent() {
        let engine = scenarios::populated_engine(5);
        assert_eq!(engine.items().len(), 10);
        assert!(invariant_violations(&engine.items()).is_empty());
    }
}
