//! Item, key and write-operation types understood by every store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of one stored version.
///
/// The store only compares statuses; which transitions are legal is decided
/// by the layer above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    /// Written by an in-flight transaction, not yet visible.
    Pending,
    /// Committed and readable.
    Available,
    /// Held by a transaction's lease.
    Locked,
    /// Marked for deletion by an in-flight transaction.
    PendingDelete,
    /// Soft-deleted or superseded.
    Deleted,
}

impl DocumentStatus {
    /// Returns the persisted name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Available => "AVAILABLE",
            Self::Locked => "LOCKED",
            Self::PendingDelete => "PENDING_DELETE",
            Self::Deleted => "DELETED",
        }
    }

    /// Returns true for statuses a committed item may rest in.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Available | Self::Deleted)
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primary key of a stored version: `(logical id, version)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    /// Logical id, stable across versions.
    pub id: String,
    /// Version number, starting at 1.
    pub version: u64,
}

impl ItemKey {
    /// Creates a new key.
    pub fn new(id: impl Into<String>, version: u64) -> Self {
        Self {
            id: id.into(),
            version,
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.id, self.version)
    }
}

/// One immutable snapshot of a logical resource.
///
/// Only `document_status` and `lock_expiry_ms` change after the item has been
/// written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Logical id.
    pub id: String,
    /// Version number.
    pub version: u64,
    /// Kind of resource held in the payload.
    pub resource_kind: String,
    /// Domain object.
    pub payload: serde_json::Value,
    /// When this version was written.
    pub last_modified: DateTime<Utc>,
    /// Lifecycle status.
    pub document_status: DocumentStatus,
    /// Lease expiry in epoch milliseconds.
    #[serde(rename = "lockLeaseExpiry")]
    pub lock_expiry_ms: i64,
}

impl Item {
    /// Returns the primary key of this item.
    #[must_use]
    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.id.clone(), self.version)
    }
}

/// A condition evaluated by the store against the current item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// The item exists with this status.
    StatusIs(DocumentStatus),
    /// No item exists under the key.
    Missing,
    /// The item's lease ended before `now_ms` and its status is one of `statuses`.
    LeaseExpired {
        /// Evaluation time in epoch milliseconds.
        now_ms: i64,
        /// Statuses the steal is allowed from.
        statuses: Vec<DocumentStatus>,
    },
    /// At least one of the inner conditions holds.
    AnyOf(Vec<Condition>),
}

impl Condition {
    /// Evaluates the condition against the current item (if any).
    #[must_use]
    pub fn holds(&self, current: Option<&Item>) -> bool {
        match self {
            Self::StatusIs(status) => current.is_some_and(|item| item.document_status == *status),
            Self::Missing => current.is_none(),
            Self::LeaseExpired { now_ms, statuses } => current.is_some_and(|item| {
                item.lock_expiry_ms < *now_ms && statuses.contains(&item.document_status)
            }),
            Self::AnyOf(conditions) => conditions.iter().any(|c| c.holds(current)),
        }
    }
}

/// Sets the status and lease of an existing item, optionally conditioned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    /// Item to update.
    pub key: ItemKey,
    /// New status.
    pub status: DocumentStatus,
    /// New lease expiry in epoch milliseconds.
    pub lock_expiry_ms: i64,
    /// Guard evaluated before applying; `None` applies unconditionally.
    pub condition: Option<Condition>,
}

/// One operation inside a multi-item conditional write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Write a whole item, replacing any existing one the guard allows.
    Put {
        /// Item to write.
        item: Item,
        /// Guard evaluated against the item currently under the same key.
        condition: Option<Condition>,
    },
    /// Change the status of an existing item.
    Update(StatusUpdate),
    /// Remove an item.
    Delete {
        /// Item to remove.
        key: ItemKey,
        /// Guard evaluated before applying.
        condition: Option<Condition>,
    },
}

impl WriteOp {
    /// Returns the key this operation touches.
    #[must_use]
    pub fn key(&self) -> ItemKey {
        match self {
            Self::Put { item, .. } => item.key(),
            Self::Update(update) => update.key.clone(),
            Self::Delete { key, .. } => key.clone(),
        }
    }
}
