//! Staging: writing new versions, marking deletions and resolving reads.

use crate::error::{CoreError, CoreResult, TransactionErrorKind};
use crate::keys::KeyBuilder;
use crate::types::{LockRecord, LockSet, Operation, StagingResult, TransactionRequest};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;
use verdb_store::{DocumentStatus, ItemKey, ItemStore, WriteOp};

/// Result of the staging phase.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome {
    /// True if every write and read succeeded.
    pub success: bool,
    /// Staging results decided so far, in request order.
    pub staging_results: Vec<StagingResult>,
    /// Lock set including the versions this phase wrote.
    pub locked: LockSet,
    /// Set on failure.
    pub error_type: Option<TransactionErrorKind>,
    /// Set on failure.
    pub message: Option<String>,
}

impl StageOutcome {
    fn failed(
        locked: LockSet,
        staging_results: Vec<StagingResult>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            staging_results,
            locked,
            error_type: Some(TransactionErrorKind::System),
            message: Some(message.into()),
        }
    }
}

/// A write queued for the staging transaction.
struct PlannedWrite {
    op: WriteOp,
    lock: Option<LockRecord>,
}

/// Everything staging intends to do, decided before any store call.
#[derive(Default)]
struct StagePlan {
    deletes: Vec<PlannedWrite>,
    creates: Vec<PlannedWrite>,
    updates: Vec<PlannedWrite>,
    reads: Vec<(usize, ItemKey)>,
    results: Vec<StagingResult>,
}

/// Executes the writes and reads of a locked transaction.
pub struct Stager {
    store: Arc<dyn ItemStore>,
    keys: KeyBuilder,
}

impl Stager {
    /// Creates a stager over `store`.
    pub fn new(store: Arc<dyn ItemStore>, keys: KeyBuilder) -> Self {
        Self { store, keys }
    }

    /// Stages every request against the versions held in `locked`.
    ///
    /// Writes go out as one multi-item conditional write ordered deletes,
    /// creates, updates. Reads follow as one multi-item read. On failure the
    /// returned lock set and staging results cover exactly what was written,
    /// so the caller can compensate.
    pub fn stage_items(
        &self,
        table: &str,
        requests: &[TransactionRequest],
        mut locked: LockSet,
    ) -> StageOutcome {
        let now = Utc::now();
        let plan = match self.plan(requests, &locked, now) {
            Ok(plan) => plan,
            Err(e) => {
                error!(error = %e, "failed to plan staging");
                return StageOutcome::failed(locked, Vec::new(), e.to_string());
            }
        };
        let StagePlan {
            deletes,
            creates,
            updates,
            reads,
            mut results,
        } = plan;

        let writes: Vec<PlannedWrite> = deletes.into_iter().chain(creates).chain(updates).collect();
        info!(writes = writes.len(), reads = reads.len(), "staging begins");

        if !writes.is_empty() {
            let ops: Vec<WriteOp> = writes.iter().map(|w| w.op.clone()).collect();
            if let Err(e) = self.store.transact_write(table, &ops) {
                error!(error = %e, "failed to stage writes");
                return StageOutcome::failed(locked, Vec::new(), "Failed to stage resources for transaction");
            }
        }

        // Writes are durable from here on; whatever fails next must be compensated.
        for write in writes {
            match write.op {
                WriteOp::Update(update) => {
                    if let Some(record) = locked.get_mut(&update.key) {
                        record.held_status = update.status;
                    }
                }
                _ => {
                    if let Some(record) = write.lock {
                        locked.insert(record);
                    }
                }
            }
        }

        if !reads.is_empty() {
            let keys: Vec<ItemKey> = reads.iter().map(|(_, key)| key.clone()).collect();
            let items = match self.store.transact_get(table, &keys) {
                Ok(items) => items,
                Err(e) => {
                    error!(error = %e, "failed to read locked resources");
                    return StageOutcome::failed(locked, results, "Failed to stage resources for transaction");
                }
            };
            for ((index, key), item) in reads.iter().zip(items) {
                let Some(item) = item else {
                    error!(key = %key, "locked version vanished before it could be read");
                    return StageOutcome::failed(
                        locked,
                        results,
                        format!("Failed to read locked resource {key}"),
                    );
                };
                results[*index].last_modified = Some(item.last_modified);
                results[*index].payload = Some(item.payload);
            }
        }

        info!(count = results.len(), "finished staging");
        StageOutcome {
            success: true,
            staging_results: results,
            locked,
            error_type: None,
            message: None,
        }
    }

    fn plan(
        &self,
        requests: &[TransactionRequest],
        locked: &LockSet,
        now: DateTime<Utc>,
    ) -> CoreResult<StagePlan> {
        let mut plan = StagePlan::default();
        for request in requests {
            let index = plan.results.len();
            let kind = request.resource_kind.as_str();
            match request.operation {
                Operation::Create => {
                    let id = request
                        .id
                        .clone()
                        .unwrap_or_else(|| Uuid::new_v4().to_string());
                    let payload = request.payload.clone().unwrap_or(serde_json::Value::Null);
                    let op = self.keys.pending_put(kind, &id, 1, payload.clone(), now)?;
                    plan.creates.push(PlannedWrite {
                        op,
                        lock: Some(LockRecord::staged(&id, 1, kind, Operation::Create)),
                    });
                    plan.results.push(result(id, 1, request, Some(now), Some(payload)));
                }
                Operation::Update => {
                    let (id, current) = held_version(request, locked)?;
                    let version = current + 1;
                    let payload = request.payload.clone().unwrap_or(serde_json::Value::Null);
                    let op = self.keys.pending_put(kind, &id, version, payload.clone(), now)?;
                    plan.updates.push(PlannedWrite {
                        op,
                        lock: Some(LockRecord::staged(&id, version, kind, Operation::Update)),
                    });
                    plan.results.push(result(id, version, request, Some(now), Some(payload)));
                }
                Operation::Delete => {
                    let (id, current) = held_version(request, locked)?;
                    let update = self.keys.status_update(
                        Some(DocumentStatus::Locked),
                        DocumentStatus::PendingDelete,
                        &id,
                        current,
                        now.timestamp_millis(),
                    )?;
                    plan.deletes.push(PlannedWrite {
                        op: WriteOp::Update(update),
                        lock: None,
                    });
                    plan.results.push(result(id, current, request, Some(now), None));
                }
                Operation::Read => {
                    let (id, current) = held_version(request, locked)?;
                    plan.reads.push((index, self.keys.item_key(&id, current)?));
                    plan.results.push(result(id, current, request, None, None));
                }
            }
        }
        Ok(plan)
    }
}

impl std::fmt::Debug for Stager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stager")
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}

/// Builds the compensating deletes for versions written by `results`.
///
/// # Errors
///
/// Returns [`CoreError::InvalidArgument`] if a result carries an invalid key.
pub fn rollback_ops(keys: &KeyBuilder, results: &[StagingResult]) -> CoreResult<Vec<WriteOp>> {
    results
        .iter()
        .filter(|r| r.wrote_version())
        .map(|r| keys.rollback_delete(&r.id, r.version))
        .collect()
}

fn held_version(request: &TransactionRequest, locked: &LockSet) -> CoreResult<(String, u64)> {
    let id = request
        .id
        .clone()
        .ok_or_else(|| CoreError::invalid_argument(format!("{} requires an id", request.operation)))?;
    let version = locked.locked_version(&id).ok_or_else(|| {
        CoreError::system_error(format!("{} was not locked before staging", request.label()))
    })?;
    Ok((id, version))
}

fn result(
    id: String,
    version: u64,
    request: &TransactionRequest,
    last_modified: Option<DateTime<Utc>>,
    payload: Option<serde_json::Value>,
) -> StagingResult {
    StagingResult {
        id,
        version,
        operation: request.operation,
        resource_kind: request.resource_kind.clone(),
        last_modified,
        payload,
    }
}
