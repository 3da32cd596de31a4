//! Snapshot reads of the current version.

use crate::error::{CoreError, CoreResult};
use std::sync::Arc;
use verdb_store::{DocumentStatus, Item, ItemKey, ItemStore};

/// Picks the readable version out of the top two versions of an id.
///
/// `versions` must be ordered highest first. An in-flight `PENDING` write is
/// never visible; locked and pending-delete versions stay readable until
/// their transaction commits.
#[must_use]
pub fn select_readable(versions: &[Item]) -> Option<&Item> {
    let top = versions.first()?;
    match top.document_status {
        DocumentStatus::Deleted => None,
        DocumentStatus::Pending => versions.get(1).filter(|below| {
            !matches!(
                below.document_status,
                DocumentStatus::Deleted | DocumentStatus::Pending
            )
        }),
        DocumentStatus::Available | DocumentStatus::Locked | DocumentStatus::PendingDelete => {
            Some(top)
        }
    }
}

/// Reads versions of resources under the snapshot rule.
pub struct VersionReader {
    store: Arc<dyn ItemStore>,
}

impl VersionReader {
    /// Creates a reader over `store`.
    pub fn new(store: Arc<dyn ItemStore>) -> Self {
        Self { store }
    }

    /// Returns the currently readable version of `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the resource was never committed or
    /// is deleted.
    pub fn current_version(&self, table: &str, kind: &str, id: &str) -> CoreResult<Item> {
        let versions = self.store.query_versions(table, id, 2)?;
        select_readable(&versions)
            .cloned()
            .ok_or_else(|| CoreError::not_found(kind, id))
    }

    /// Returns one exact version of `id`, whatever its status.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::VersionNotFound`] if that version was never written.
    pub fn exact_version(&self, table: &str, kind: &str, id: &str, version: u64) -> CoreResult<Item> {
        self.store
            .get_item(table, &ItemKey::new(id, version))?
            .ok_or_else(|| CoreError::version_not_found(kind, id, version))
    }
}

impl std::fmt::Debug for VersionReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionReader").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use verdb_store::InMemoryStore;

    const TABLE: &str = "resources";

    fn item(version: u64, status: DocumentStatus) -> Item {
        Item {
            id: "a".into(),
            version,
            resource_kind: "Patient".into(),
            payload: serde_json::json!({ "v": version }),
            last_modified: Utc::now(),
            document_status: status,
            lock_expiry_ms: 0,
        }
    }

    fn reader_with(items: Vec<Item>) -> VersionReader {
        let store = InMemoryStore::new();
        for item in items {
            store.put_item(TABLE, item).unwrap();
        }
        VersionReader::new(Arc::new(store))
    }

    #[test]
    fn no_versions_is_not_found() {
        let reader = reader_with(vec![]);
        let err = reader.current_version(TABLE, "Patient", "a").unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[test]
    fn deleted_top_is_not_found() {
        let reader = reader_with(vec![
            item(1, DocumentStatus::Deleted),
            item(2, DocumentStatus::Deleted),
        ]);
        assert!(reader.current_version(TABLE, "Patient", "a").is_err());
    }

    #[test]
    fn pending_top_falls_back_to_committed_version() {
        let reader = reader_with(vec![
            item(1, DocumentStatus::Locked),
            item(2, DocumentStatus::Pending),
        ]);
        let current = reader.current_version(TABLE, "Patient", "a").unwrap();
        assert_eq!(current.version, 1);
    }

    #[test]
    fn pending_over_deleted_stays_deleted() {
        let reader = reader_with(vec![
            item(1, DocumentStatus::Deleted),
            item(2, DocumentStatus::Pending),
        ]);
        assert!(reader.current_version(TABLE, "Patient", "a").is_err());
    }

    #[test]
    fn pending_only_is_not_yet_visible() {
        let reader = reader_with(vec![item(1, DocumentStatus::Pending)]);
        assert!(reader.current_version(TABLE, "Patient", "a").is_err());
    }

    #[test]
    fn locked_and_pending_delete_remain_readable() {
        for status in [
            DocumentStatus::Available,
            DocumentStatus::Locked,
            DocumentStatus::PendingDelete,
        ] {
            let reader = reader_with(vec![item(1, DocumentStatus::Deleted), item(2, status)]);
            let current = reader.current_version(TABLE, "Patient", "a").unwrap();
            assert_eq!(current.version, 2, "{status}");
        }
    }

    #[test]
    fn repeated_reads_are_identical() {
        let reader = reader_with(vec![
            item(1, DocumentStatus::Deleted),
            item(2, DocumentStatus::Available),
        ]);
        let first = reader.current_version(TABLE, "Patient", "a").unwrap();
        let second = reader.current_version(TABLE, "Patient", "a").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn exact_version_lookup() {
        let reader = reader_with(vec![item(1, DocumentStatus::Deleted)]);
        assert_eq!(reader.exact_version(TABLE, "Patient", "a", 1).unwrap().version, 1);
        let err = reader.exact_version(TABLE, "Patient", "a", 2).unwrap_err();
        assert!(matches!(err, CoreError::VersionNotFound { version: 2, .. }));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn status() -> impl Strategy<Value = DocumentStatus> {
            prop_oneof![
                Just(DocumentStatus::Pending),
                Just(DocumentStatus::Available),
                Just(DocumentStatus::Locked),
                Just(DocumentStatus::PendingDelete),
                Just(DocumentStatus::Deleted),
            ]
        }

        proptest! {
            #[test]
            fn pending_and_deleted_versions_are_never_readable(
                statuses in prop::collection::vec(status(), 0..3)
            ) {
                // Newest first, as the store returns them.
                let versions: Vec<Item> = statuses
                    .iter()
                    .enumerate()
                    .map(|(i, s)| item((statuses.len() - i) as u64, *s))
                    .collect();
                if let Some(readable) = select_readable(&versions) {
                    prop_assert_ne!(readable.document_status, DocumentStatus::Pending);
                    prop_assert_ne!(readable.document_status, DocumentStatus::Deleted);
                }
            }
        }
    }
}
