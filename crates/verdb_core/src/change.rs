//! Projection of committed store changes onto a search index.
//!
//! Only final resting states are projected. `AVAILABLE` and `DELETED`
//! versions are upserted (deleted ones as tombstones); rows physically
//! removed from the store are deleted from the index.

use serde::{Deserialize, Serialize};
use tracing::debug;
use verdb_store::{DocumentStatus, Item};

/// Resource kind whose payloads live in object storage and are never indexed.
pub const BINARY_KIND: &str = "Binary";

/// A row change observed on the item store.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// A row was inserted or modified; carries the new image.
    Upserted(Item),
    /// A row was removed; carries the old image.
    Removed(Item),
}

impl ChangeEvent {
    /// Returns the image carried by the event.
    #[must_use]
    pub fn image(&self) -> &Item {
        match self {
            Self::Upserted(item) | Self::Removed(item) => item,
        }
    }
}

/// One write against the search index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum IndexAction {
    /// Insert or replace a document.
    Upsert {
        /// Index name: the lowercased resource kind.
        index: String,
        /// Composite `{id}_{version}` document id.
        doc_id: String,
        /// The full item image.
        document: Item,
    },
    /// Remove a document.
    Delete {
        /// Index name: the lowercased resource kind.
        index: String,
        /// Composite `{id}_{version}` document id.
        doc_id: String,
    },
}

impl IndexAction {
    /// Returns the composite document id.
    #[must_use]
    pub fn doc_id(&self) -> &str {
        match self {
            Self::Upsert { doc_id, .. } | Self::Delete { doc_id, .. } => doc_id,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Upsert { document, .. } if document.document_status == DocumentStatus::Available => 0,
            Self::Upsert { .. } => 1,
            Self::Delete { .. } => 2,
        }
    }
}

/// Returns the index document id of a version.
#[must_use]
pub fn composite_id(id: &str, version: u64) -> String {
    format!("{id}_{version}")
}

/// Maps one change event to its index action, if it has one.
#[must_use]
pub fn index_action(event: &ChangeEvent) -> Option<IndexAction> {
    let image = event.image();
    if image.resource_kind == BINARY_KIND {
        return None;
    }
    let index = image.resource_kind.to_lowercase();
    let doc_id = composite_id(&image.id, image.version);
    match event {
        ChangeEvent::Removed(_) => Some(IndexAction::Delete { index, doc_id }),
        ChangeEvent::Upserted(item) => match item.document_status {
            DocumentStatus::Available | DocumentStatus::Deleted => Some(IndexAction::Upsert {
                index,
                doc_id,
                document: item.clone(),
            }),
            status => {
                debug!(%doc_id, %status, "skipping non-final image");
                None
            }
        },
    }
}

/// Maps a batch of change events to index actions.
///
/// Actions are ordered available upserts, deleted upserts, deletes; within
/// each group the event order is kept.
#[must_use]
pub fn plan_index_actions(events: &[ChangeEvent]) -> Vec<IndexAction> {
    let mut actions: Vec<IndexAction> = events.iter().filter_map(index_action).collect();
    actions.sort_by_key(IndexAction::rank);
    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn image(kind: &str, version: u64, status: DocumentStatus) -> Item {
        Item {
            id: "abc".into(),
            version,
            resource_kind: kind.into(),
            payload: serde_json::json!({}),
            last_modified: Utc::now(),
            document_status: status,
            lock_expiry_ms: 0,
        }
    }

    #[test]
    fn final_images_are_upserted() {
        for status in [DocumentStatus::Available, DocumentStatus::Deleted] {
            let action = index_action(&ChangeEvent::Upserted(image("Patient", 2, status))).unwrap();
            match action {
                IndexAction::Upsert { index, doc_id, document } => {
                    assert_eq!(index, "patient");
                    assert_eq!(doc_id, "abc_2");
                    assert_eq!(document.document_status, status);
                }
                other => panic!("expected upsert, got {other:?}"),
            }
        }
    }

    #[test]
    fn transient_images_are_ignored() {
        for status in [
            DocumentStatus::Pending,
            DocumentStatus::Locked,
            DocumentStatus::PendingDelete,
        ] {
            assert!(index_action(&ChangeEvent::Upserted(image("Patient", 1, status))).is_none());
        }
    }

    #[test]
    fn removed_rows_are_deleted() {
        let action = index_action(&ChangeEvent::Removed(image("Observation", 3, DocumentStatus::Pending)));
        assert_eq!(
            action,
            Some(IndexAction::Delete {
                index: "observation".into(),
                doc_id: "abc_3".into(),
            })
        );
    }

    #[test]
    fn binaries_are_never_indexed() {
        let event = ChangeEvent::Upserted(image(BINARY_KIND, 1, DocumentStatus::Available));
        assert!(index_action(&event).is_none());
    }

    #[test]
    fn batch_applies_creates_before_deletes() {
        let actions = plan_index_actions(&[
            ChangeEvent::Removed(image("Patient", 1, DocumentStatus::Available)),
            ChangeEvent::Upserted(image("Patient", 2, DocumentStatus::Deleted)),
            ChangeEvent::Upserted(image("Patient", 3, DocumentStatus::Available)),
            ChangeEvent::Upserted(image("Patient", 4, DocumentStatus::Locked)),
        ]);
        let ids: Vec<_> = actions.iter().map(IndexAction::doc_id).collect();
        assert_eq!(ids, vec!["abc_3", "abc_2", "abc_1"]);
    }
}
