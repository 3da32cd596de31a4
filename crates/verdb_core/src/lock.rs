//! Lease-bounded locks on the current version of each resource.

use crate::error::{CoreError, CoreResult, TransactionErrorKind};
use crate::keys::{now_millis, KeyBuilder};
use crate::reader::VersionReader;
use crate::types::{LockRecord, LockSet, Operation, TransactionRequest};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use verdb_store::{DocumentStatus, Item, ItemStore, StoreError, WriteOp};

/// Result of a lock phase.
#[derive(Debug, Clone, PartialEq)]
pub struct LockOutcome {
    /// Versions now held by the transaction.
    pub locked: LockSet,
    /// True if every requested version was locked.
    pub successful: bool,
    /// Set on failure.
    pub error_type: Option<TransactionErrorKind>,
    /// Set on failure.
    pub message: Option<String>,
}

impl LockOutcome {
    fn success(locked: LockSet) -> Self {
        Self {
            locked,
            successful: true,
            error_type: None,
            message: None,
        }
    }

    fn failure(kind: TransactionErrorKind, message: impl Into<String>) -> Self {
        Self {
            locked: LockSet::new(),
            successful: false,
            error_type: Some(kind),
            message: Some(message.into()),
        }
    }
}

/// Result of releasing locks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnlockOutcome {
    /// True if every lock was released.
    pub successful: bool,
    /// Locks left in place; they free themselves when their lease runs out.
    pub locks_failed_to_release: Vec<LockRecord>,
}

/// Acquires and releases version locks.
pub struct LockManager {
    store: Arc<dyn ItemStore>,
    reader: VersionReader,
    keys: KeyBuilder,
    max_items: usize,
}

impl LockManager {
    /// Creates a lock manager over `store`.
    pub fn new(store: Arc<dyn ItemStore>, keys: KeyBuilder, max_items: usize) -> Self {
        Self {
            reader: VersionReader::new(Arc::clone(&store)),
            store,
            keys,
            max_items,
        }
    }

    /// Locks the current version of every non-create request.
    ///
    /// The locks are taken in one multi-item conditional write, so either all
    /// of them are held afterwards or none is.
    pub fn lock_items(&self, table: &str, requests: &[TransactionRequest]) -> LockOutcome {
        let targets: Vec<&TransactionRequest> = requests
            .iter()
            .filter(|r| r.operation != Operation::Create)
            .collect();
        if targets.is_empty() {
            return LockOutcome::success(LockSet::new());
        }
        if targets.len() > self.max_items {
            let message = format!("Cannot lock more than {} items", self.max_items);
            error!(count = targets.len(), "{message}");
            return LockOutcome::failure(TransactionErrorKind::System, message);
        }

        info!(count = targets.len(), "locking begins");
        let mut current = Vec::with_capacity(targets.len());
        let mut missing = Vec::new();
        for (request, read) in targets.iter().zip(self.read_current(table, &targets)) {
            match read {
                Ok(item) => current.push((item, request.operation)),
                Err(e) if e.is_not_found() => missing.push(request.label()),
                Err(e) => {
                    error!(error = %e, resource = %request.label(), "failed to read resource to lock");
                    return LockOutcome::failure(
                        TransactionErrorKind::System,
                        format!("Failed to read resources for transaction: {e}"),
                    );
                }
            }
        }
        if !missing.is_empty() {
            return LockOutcome::failure(
                TransactionErrorKind::User,
                format!("Failed to find resources: {}", missing.join(", ")),
            );
        }

        let now_ms = now_millis();
        let mut ops = Vec::with_capacity(current.len());
        let mut records = LockSet::new();
        for (item, operation) in &current {
            let update = match self.keys.status_update(
                Some(DocumentStatus::Available),
                DocumentStatus::Locked,
                &item.id,
                item.version,
                now_ms,
            ) {
                Ok(update) => update,
                Err(e) => return LockOutcome::failure(TransactionErrorKind::System, e.to_string()),
            };
            ops.push(WriteOp::Update(update));
            records.insert(LockRecord::locked(item, *operation));
        }

        match self.store.transact_write(table, &ops) {
            Ok(()) => {
                info!(count = records.len(), "finished locking");
                LockOutcome::success(records)
            }
            Err(e) => {
                error!(error = %e, "failed to lock");
                LockOutcome::failure(
                    TransactionErrorKind::System,
                    format!(
                        "Failed to lock resources for transaction. Please try again after {} seconds.",
                        self.keys.lease_ms() / 1000
                    ),
                )
            }
        }
    }

    /// Releases every lock in `locked`, committing or rolling back.
    ///
    /// Updates are sent in chunks no larger than the per-call ceiling. A
    /// failed chunk is logged and it and every later chunk are reported in
    /// `locks_failed_to_release`; the caller is never failed for it.
    pub fn unlock_items(&self, table: &str, locked: &LockSet, rollback: bool) -> UnlockOutcome {
        if locked.is_empty() {
            return UnlockOutcome {
                successful: true,
                locks_failed_to_release: Vec::new(),
            };
        }
        info!(count = locked.len(), rollback, "unlocking begins");

        let now_ms = now_millis();
        let mut failed = Vec::new();
        let mut planned = Vec::with_capacity(locked.len());
        for record in locked.iter() {
            let Some(target) = record.release_status(rollback) else {
                debug!(id = %record.id, version = record.version, "skipping version removed by rollback");
                continue;
            };
            match self
                .keys
                .status_update(None, target, &record.id, record.version, now_ms)
            {
                Ok(update) => planned.push((record, WriteOp::Update(update))),
                Err(e) => {
                    warn!(error = %e, id = %record.id, "cannot build release update");
                    failed.push(record.clone());
                }
            }
        }

        let chunks: Vec<_> = planned.chunks(self.max_items.max(1)).collect();
        for (index, chunk) in chunks.iter().enumerate() {
            let ops: Vec<WriteOp> = chunk.iter().map(|(_, op)| op.clone()).collect();
            if let Err(e) = self.store.transact_write(table, &ops) {
                error!(error = %e, chunk = index, "failed to unlock items");
                failed.extend(
                    chunks[index..]
                        .iter()
                        .flat_map(|c| c.iter().map(|(record, _)| (*record).clone())),
                );
                break;
            }
        }

        if failed.is_empty() {
            info!("finished unlocking");
        }
        UnlockOutcome {
            successful: failed.is_empty(),
            locks_failed_to_release: failed,
        }
    }

    /// Reads the current version of every target, concurrently when there is
    /// more than one.
    fn read_current(&self, table: &str, targets: &[&TransactionRequest]) -> Vec<CoreResult<Item>> {
        let read = |request: &TransactionRequest| match request.id.as_deref() {
            Some(id) => self
                .reader
                .current_version(table, &request.resource_kind, id),
            None => Err(CoreError::not_found(&request.resource_kind, "")),
        };
        if let [only] = targets {
            return vec![read(only)];
        }
        std::thread::scope(|scope| {
            let handles: Vec<_> = targets
                .iter()
                .map(|request| scope.spawn(move || read(request)))
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        Err(StoreError::Unavailable("version read panicked".to_string()).into())
                    })
                })
                .collect()
        })
    }
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("max_items", &self.max_items)
            .field("lease_ms", &self.keys.lease_ms())
            .finish_non_exhaustive()
    }
}
