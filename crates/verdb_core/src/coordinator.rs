//! Transaction coordinator.
//!
//! Drives a bundle through three phases:
//!
//! 1. lock the current version of every existing resource,
//! 2. stage new versions, deletions and reads,
//! 3. release the locks, which commits.
//!
//! A failure or an exhausted time budget before phase 3 rolls back: versions
//! written in phase 2 are deleted and every lock is released to `AVAILABLE`.

use crate::config::Config;
use crate::error::TransactionErrorKind;
use crate::keys::KeyBuilder;
use crate::lock::LockManager;
use crate::stage::{rollback_ops, Stager};
use crate::types::{LockSet, StagingResult, TransactionOutcome, TransactionRequest};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use verdb_store::ItemStore;

/// Message returned when a bundle runs past the execution budget.
pub const TIME_BUDGET_EXCEEDED: &str = "Transaction time is greater than max allowed code execution time. Please reduce your bundle size by sending fewer Bundle entries.";

/// Message returned for a committed bundle.
pub const COMMITTED: &str = "Successfully committed requests to DB";

/// Message returned for an empty bundle.
pub const NOTHING_TO_PROCESS: &str = "No requests to process";

/// Counters of finished transactions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    /// Transactions that committed.
    pub committed: u64,
    /// Transactions that were rolled back.
    pub rolled_back: u64,
}

/// Runs transactions against one item store.
pub struct TransactionCoordinator {
    store: Arc<dyn ItemStore>,
    table: String,
    keys: KeyBuilder,
    locks: LockManager,
    stager: Stager,
    max_execution_time: Duration,
    max_items: usize,
    committed: AtomicU64,
    rolled_back: AtomicU64,
}

impl TransactionCoordinator {
    /// Creates a coordinator over `store`.
    pub fn new(store: Arc<dyn ItemStore>, config: &Config) -> Self {
        let keys = KeyBuilder::new(config.lease_duration);
        Self {
            locks: LockManager::new(Arc::clone(&store), keys, config.max_transaction_items),
            stager: Stager::new(Arc::clone(&store), keys),
            store,
            table: config.resource_table.clone(),
            keys,
            max_execution_time: config.max_execution_time,
            max_items: config.max_transaction_items.max(1),
            committed: AtomicU64::new(0),
            rolled_back: AtomicU64::new(0),
        }
    }

    /// Returns the table used by [`transaction`](Self::transaction).
    #[must_use]
    pub fn default_table(&self) -> &str {
        &self.table
    }

    /// Returns counters of finished transactions.
    #[must_use]
    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            committed: self.committed.load(Ordering::Relaxed),
            rolled_back: self.rolled_back.load(Ordering::Relaxed),
        }
    }

    /// Runs `requests` as one transaction on the default table.
    ///
    /// `start` is when the caller began handling the bundle; the execution
    /// budget is measured from it.
    pub fn transaction(&self, requests: &[TransactionRequest], start: Instant) -> TransactionOutcome {
        self.transaction_in(&self.table, requests, start)
    }

    /// Runs `requests` as one transaction on `table`.
    pub fn transaction_in(
        &self,
        table: &str,
        requests: &[TransactionRequest],
        start: Instant,
    ) -> TransactionOutcome {
        if requests.is_empty() {
            return TransactionOutcome::committed(NOTHING_TO_PROCESS, Vec::new());
        }
        info!(count = requests.len(), table, "transaction begins");

        let lock = self.locks.lock_items(table, requests);
        if self.over_budget(start) {
            warn!(elapsed_ms = elapsed_ms(start), "execution budget exhausted after locking");
            self.locks.unlock_items(table, &lock.locked, true);
            return self.abort(TransactionErrorKind::User, TIME_BUDGET_EXCEEDED);
        }
        if !lock.successful {
            self.locks.unlock_items(table, &lock.locked, true);
            return self.abort(
                lock.error_type.unwrap_or(TransactionErrorKind::System),
                lock.message.unwrap_or_default(),
            );
        }

        let staged = self.stager.stage_items(table, requests, lock.locked);
        let timed_out = self.over_budget(start);
        if timed_out || !staged.success {
            let (kind, message) = if timed_out {
                warn!(elapsed_ms = elapsed_ms(start), "execution budget exhausted after staging");
                (TransactionErrorKind::User, TIME_BUDGET_EXCEEDED.to_string())
            } else {
                (
                    staged.error_type.unwrap_or(TransactionErrorKind::System),
                    staged.message.unwrap_or_default(),
                )
            };
            self.roll_back(table, staged.locked, &staged.staging_results);
            return self.abort(kind, message);
        }

        let released = self.locks.unlock_items(table, &staged.locked, false);
        if !released.successful {
            warn!(
                count = released.locks_failed_to_release.len(),
                "locks left to expire after commit"
            );
        }
        self.committed.fetch_add(1, Ordering::Relaxed);
        info!(elapsed_ms = elapsed_ms(start), "transaction committed");
        TransactionOutcome::committed(COMMITTED, staged.staging_results)
    }

    /// Deletes the versions written by `results` and releases the rest.
    fn roll_back(&self, table: &str, mut locked: LockSet, results: &[StagingResult]) {
        match rollback_ops(&self.keys, results) {
            Ok(ops) => {
                for chunk in ops.chunks(self.max_items) {
                    if let Err(e) = self.store.transact_write(table, chunk) {
                        error!(error = %e, count = chunk.len(), "failed to delete staged versions");
                    }
                    for op in chunk {
                        locked.remove(&op.key());
                    }
                }
            }
            Err(e) => error!(error = %e, "cannot build rollback of staged versions"),
        }
        self.locks.unlock_items(table, &locked, true);
    }

    fn abort(&self, kind: TransactionErrorKind, message: impl Into<String>) -> TransactionOutcome {
        let message = message.into();
        self.rolled_back.fetch_add(1, Ordering::Relaxed);
        info!(error_type = %kind, %message, "transaction rolled back");
        TransactionOutcome::failed(kind, message)
    }

    fn over_budget(&self, start: Instant) -> bool {
        start.elapsed() > self.max_execution_time
    }
}

impl std::fmt::Debug for TransactionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionCoordinator")
            .field("table", &self.table)
            .field("max_execution_time", &self.max_execution_time)
            .field("max_items", &self.max_items)
            .finish_non_exhaustive()
    }
}

fn elapsed_ms(start: Instant) -> u128 {
    start.elapsed().as_millis()
}
