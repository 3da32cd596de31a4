//! Document status state machine.
//!
//! Every status change the engine makes is looked up here:
//!
//! ```text
//! AVAILABLE      --lock-------------------> LOCKED
//! LOCKED         --stage delete-----------> PENDING_DELETE
//! LOCKED         --commit (retire)--------> DELETED
//! LOCKED         --commit-----------------> AVAILABLE
//! LOCKED         --rollback---------------> AVAILABLE
//! PENDING        --commit-----------------> AVAILABLE
//! PENDING_DELETE --commit-----------------> DELETED
//! PENDING_DELETE --rollback---------------> AVAILABLE
//! ```
//!
//! `AVAILABLE` and `DELETED` are terminal. A rolled-back `PENDING` version has
//! no target status; it is removed instead.

use verdb_store::DocumentStatus;

/// Statuses a lock may be stolen from once its lease has expired.
pub const LEASE_STEALABLE: [DocumentStatus; 3] = [
    DocumentStatus::Locked,
    DocumentStatus::Pending,
    DocumentStatus::PendingDelete,
];

/// Something that happens to a held version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    /// The lock phase takes the version.
    Lock,
    /// The stager marks a locked version for deletion.
    StageDelete,
    /// The transaction commits; `retire` is set for deleted and superseded versions.
    Commit {
        /// Whether the version stops being readable.
        retire: bool,
    },
    /// The transaction aborts.
    Rollback,
}

/// Returns the status `event` moves a version in `from` to, if the move is legal.
#[must_use]
pub const fn next_status(from: DocumentStatus, event: StatusEvent) -> Option<DocumentStatus> {
    use DocumentStatus::{Available, Deleted, Locked, Pending, PendingDelete};
    match (from, event) {
        (Available, StatusEvent::Lock) => Some(Locked),
        (Locked, StatusEvent::StageDelete) => Some(PendingDelete),
        (Locked, StatusEvent::Commit { retire: true }) => Some(Deleted),
        (Locked, StatusEvent::Commit { retire: false }) => Some(Available),
        (Locked, StatusEvent::Rollback) => Some(Available),
        (Pending, StatusEvent::Commit { .. }) => Some(Available),
        (PendingDelete, StatusEvent::Commit { .. }) => Some(Deleted),
        (PendingDelete, StatusEvent::Rollback) => Some(Available),
        _ => None,
    }
}
