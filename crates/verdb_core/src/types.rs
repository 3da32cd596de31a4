//! Core type definitions for VerDB.

use crate::error::{CoreError, CoreResult, TransactionErrorKind};
use crate::status::{next_status, StatusEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use verdb_store::{DocumentStatus, Item, ItemKey};

/// Operation requested on one resource inside a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Write version 1 of a new resource.
    Create,
    /// Read the current version under a lock.
    Read,
    /// Write the next version of an existing resource.
    Update,
    /// Soft-delete an existing resource.
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// One entry of a transaction bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    /// What to do.
    pub operation: Operation,
    /// Kind of the resource.
    pub resource_kind: String,
    /// Logical id; optional for `create`, required otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Domain object for `create` and `update`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl TransactionRequest {
    /// Creates a `create` entry with a generated id.
    pub fn create(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            operation: Operation::Create,
            resource_kind: kind.into(),
            id: None,
            payload: Some(payload),
        }
    }

    /// Creates an `update` entry.
    pub fn update(kind: impl Into<String>, id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            operation: Operation::Update,
            resource_kind: kind.into(),
            id: Some(id.into()),
            payload: Some(payload),
        }
    }

    /// Creates a `delete` entry.
    pub fn delete(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            operation: Operation::Delete,
            resource_kind: kind.into(),
            id: Some(id.into()),
            payload: None,
        }
    }

    /// Creates a `read` entry.
    pub fn read(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            operation: Operation::Read,
            resource_kind: kind.into(),
            id: Some(id.into()),
            payload: None,
        }
    }

    /// Sets the logical id (for `create` entries that bring their own).
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Returns the `kind/id` label used in messages.
    #[must_use]
    pub fn label(&self) -> String {
        format!(
            "{}/{}",
            self.resource_kind,
            self.id.as_deref().unwrap_or("<unassigned>")
        )
    }
}

/// A version this transaction holds exclusively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    /// Logical id.
    pub id: String,
    /// Locked version.
    pub version: u64,
    /// Resource kind.
    pub resource_kind: String,
    /// Operation that took the lock.
    pub operation: Operation,
    /// True only for the pre-update version being retired.
    pub is_superseded_original: bool,
    /// Status this transaction last moved the version to.
    pub held_status: DocumentStatus,
}

impl LockRecord {
    /// Record for an existing version locked during the lock phase.
    pub fn locked(item: &Item, operation: Operation) -> Self {
        Self {
            id: item.id.clone(),
            version: item.version,
            resource_kind: item.resource_kind.clone(),
            operation,
            is_superseded_original: operation == Operation::Update,
            held_status: DocumentStatus::Locked,
        }
    }

    /// Record for a version written by the stager.
    pub fn staged(id: impl Into<String>, version: u64, kind: impl Into<String>, operation: Operation) -> Self {
        Self {
            id: id.into(),
            version,
            resource_kind: kind.into(),
            operation,
            is_superseded_original: false,
            held_status: DocumentStatus::Pending,
        }
    }

    /// Returns the key of the held version.
    #[must_use]
    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.id.clone(), self.version)
    }

    /// Returns the status releasing this lock moves the version to.
    ///
    /// `None` means the version must not be touched: a rolled-back version
    /// written by this transaction is removed instead.
    #[must_use]
    pub fn release_status(&self, rollback: bool) -> Option<DocumentStatus> {
        let event = if rollback {
            StatusEvent::Rollback
        } else {
            StatusEvent::Commit {
                retire: self.operation == Operation::Delete || self.is_superseded_original,
            }
        };
        next_status(self.held_status, event)
    }
}

/// Lock records of one transaction, keyed by `(id, version)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockSet {
    records: BTreeMap<ItemKey, LockRecord>,
}

impl LockSet {
    /// Creates an empty lock set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record, replacing any record for the same version.
    pub fn insert(&mut self, record: LockRecord) {
        self.records.insert(record.key(), record);
    }

    /// Removes and returns the record for `key`.
    pub fn remove(&mut self, key: &ItemKey) -> Option<LockRecord> {
        self.records.remove(key)
    }

    /// Returns the record for `key`.
    #[must_use]
    pub fn get(&self, key: &ItemKey) -> Option<&LockRecord> {
        self.records.get(key)
    }

    /// Returns a mutable reference to the record for `key`.
    pub fn get_mut(&mut self, key: &ItemKey) -> Option<&mut LockRecord> {
        self.records.get_mut(key)
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no version is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates over the records in key order.
    pub fn iter(&self) -> impl Iterator<Item = &LockRecord> {
        self.records.values()
    }

    /// Returns the locked version of `id` taken during the lock phase.
    #[must_use]
    pub fn locked_version(&self, id: &str) -> Option<u64> {
        self.records
            .values()
            .find(|r| r.id == id && r.held_status != DocumentStatus::Pending)
            .map(|r| r.version)
    }
}

impl FromIterator<LockRecord> for LockSet {
    fn from_iter<I: IntoIterator<Item = LockRecord>>(iter: I) -> Self {
        let mut set = Self::new();
        for record in iter {
            set.insert(record);
        }
        set
    }
}

impl Extend<LockRecord> for LockSet {
    fn extend<I: IntoIterator<Item = LockRecord>>(&mut self, iter: I) {
        for record in iter {
            self.insert(record);
        }
    }
}

impl IntoIterator for LockSet {
    type Item = LockRecord;
    type IntoIter = std::collections::btree_map::IntoValues<ItemKey, LockRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_values()
    }
}

/// Outcome of one bundle entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagingResult {
    /// Logical id.
    pub id: String,
    /// Version written, deleted or read.
    pub version: u64,
    /// Operation performed.
    pub operation: Operation,
    /// Resource kind.
    pub resource_kind: String,
    /// Timestamp of the version, once known.
    pub last_modified: Option<DateTime<Utc>>,
    /// Written or fetched payload; empty for deletes.
    pub payload: Option<serde_json::Value>,
}

impl StagingResult {
    /// Returns the key of the version this result refers to.
    #[must_use]
    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.id.clone(), self.version)
    }

    /// Returns true if this entry wrote a new version.
    #[must_use]
    pub fn wrote_version(&self) -> bool {
        matches!(self.operation, Operation::Create | Operation::Update)
    }
}

/// Result of a whole transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionOutcome {
    /// True once every entry committed.
    pub success: bool,
    /// Human-readable summary.
    pub message: String,
    /// One result per request entry, in request order; empty on failure.
    pub staging_results: Vec<StagingResult>,
    /// Set on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<TransactionErrorKind>,
}

impl TransactionOutcome {
    /// A committed transaction.
    pub fn committed(message: impl Into<String>, staging_results: Vec<StagingResult>) -> Self {
        Self {
            success: true,
            message: message.into(),
            staging_results,
            error_type: None,
        }
    }

    /// A rolled-back transaction.
    pub fn failed(kind: TransactionErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            staging_results: Vec::new(),
            error_type: Some(kind),
        }
    }

    /// Converts the outcome into its staging results or a typed error.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Transaction`] if the transaction did not commit.
    pub fn into_result(self) -> CoreResult<Vec<StagingResult>> {
        if self.success {
            return Ok(self.staging_results);
        }
        Err(CoreError::Transaction {
            kind: self.error_type.unwrap_or(TransactionErrorKind::System),
            message: self.message,
        })
    }
}

/// A resource as returned to callers, without bookkeeping fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Logical id.
    pub id: String,
    /// Resource kind.
    pub resource_kind: String,
    /// Version number.
    pub version: u64,
    /// When this version was written.
    pub last_modified: DateTime<Utc>,
    /// Domain object.
    pub payload: serde_json::Value,
}

impl From<Item> for Resource {
    fn from(item: Item) -> Self {
        Self {
            id: item.id,
            resource_kind: item.resource_kind,
            version: item.version,
            last_modified: item.last_modified,
            payload: item.payload,
        }
    }
}

/// Response of a single-resource service call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceResponse {
    /// True if the call succeeded.
    pub success: bool,
    /// Human-readable summary.
    pub message: String,
    /// The affected resource, when there is one to return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Resource>,
}

impl ServiceResponse {
    /// A successful response carrying a resource.
    pub fn with_resource(message: impl Into<String>, resource: Resource) -> Self {
        Self {
            success: true,
            message: message.into(),
            resource: Some(resource),
        }
    }

    /// A successful response without a resource.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            resource: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(operation: Operation, held: DocumentStatus, superseded: bool) -> LockRecord {
        LockRecord {
            id: "a".into(),
            version: 3,
            resource_kind: "Patient".into(),
            operation,
            is_superseded_original: superseded,
            held_status: held,
        }
    }

    #[test]
    fn commit_retires_deleted_and_superseded_versions() {
        let delete = record(Operation::Delete, DocumentStatus::PendingDelete, false);
        assert_eq!(delete.release_status(false), Some(DocumentStatus::Deleted));

        let original = record(Operation::Update, DocumentStatus::Locked, true);
        assert_eq!(original.release_status(false), Some(DocumentStatus::Deleted));

        let read = record(Operation::Read, DocumentStatus::Locked, false);
        assert_eq!(read.release_status(false), Some(DocumentStatus::Available));

        let written = record(Operation::Update, DocumentStatus::Pending, false);
        assert_eq!(written.release_status(false), Some(DocumentStatus::Available));
    }

    #[test]
    fn rollback_restores_everything_but_written_versions() {
        let original = record(Operation::Update, DocumentStatus::Locked, true);
        assert_eq!(original.release_status(true), Some(DocumentStatus::Available));

        let delete = record(Operation::Delete, DocumentStatus::PendingDelete, false);
        assert_eq!(delete.release_status(true), Some(DocumentStatus::Available));

        let created = record(Operation::Create, DocumentStatus::Pending, false);
        assert_eq!(created.release_status(true), None);
    }

    #[test]
    fn lock_set_is_keyed_by_id_and_version() {
        let mut set = LockSet::new();
        set.insert(record(Operation::Read, DocumentStatus::Locked, false));
        set.insert(record(Operation::Read, DocumentStatus::Locked, false));
        set.insert(LockRecord::staged("a", 4, "Patient", Operation::Update));
        assert_eq!(set.len(), 2);
        assert_eq!(set.locked_version("a"), Some(3));

        assert!(set.remove(&ItemKey::new("a", 4)).is_some());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn request_wire_format() {
        let json = serde_json::json!({
            "operation": "update",
            "resourceKind": "Patient",
            "id": "x",
            "payload": { "active": true }
        });
        let request: TransactionRequest = serde_json::from_value(json).unwrap();
        assert_eq!(request.operation, Operation::Update);
        assert_eq!(request.label(), "Patient/x");
    }

    #[test]
    fn failed_outcome_converts_to_typed_error() {
        let outcome = TransactionOutcome::failed(TransactionErrorKind::User, "too slow");
        match outcome.into_result() {
            Err(CoreError::Transaction { kind, message }) => {
                assert_eq!(kind, TransactionErrorKind::User);
                assert_eq!(message, "too slow");
            }
            other => panic!("expected transaction error, got {other:?}"),
        }
    }
}
