//! In-memory item store.

use crate::error::{StoreError, StoreResult};
use crate::item::{Item, ItemKey, StatusUpdate, WriteOp};
use crate::store::{ItemStore, MAX_TRANSACT_ITEMS};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};

type Table = BTreeMap<(String, u64), Item>;

/// Counts of calls made against an [`InMemoryStore`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// `get_item` calls.
    pub gets: usize,
    /// `put_item` calls.
    pub puts: usize,
    /// `update_status` calls.
    pub updates: usize,
    /// `query_versions` calls.
    pub queries: usize,
    /// `transact_write` calls, including rejected ones.
    pub transact_writes: usize,
    /// `transact_get` calls, including rejected ones.
    pub transact_gets: usize,
}

#[derive(Debug, Default)]
struct Faults {
    fail_writes: bool,
    fail_gets: bool,
    write_countdown: Option<usize>,
}

/// An in-memory item store.
///
/// This store keeps every table in memory and is suitable for:
/// - Unit and integration tests
/// - Single-process deployments that don't need persistence
///
/// Faults can be injected into the multi-item calls to simulate a store that
/// rejects a transaction.
///
/// # Example
///
/// ```rust
/// use verdb_store::{InMemoryStore, ItemStore};
///
/// let store = InMemoryStore::new();
/// assert!(store.query_versions("resources", "abc", 2).unwrap().is_empty());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<HashMap<String, Table>>,
    faults: Mutex<Faults>,
    stats: Mutex<StoreStats>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `transact_write` fail (or succeed again).
    pub fn fail_transact_writes(&self, fail: bool) {
        self.faults.lock().fail_writes = fail;
    }

    /// Makes every subsequent `transact_get` fail (or succeed again).
    pub fn fail_transact_gets(&self, fail: bool) {
        self.faults.lock().fail_gets = fail;
    }

    /// Makes the `n`-th `transact_write` from now fail, `1` being the next call.
    pub fn fail_transact_write_at(&self, n: usize) {
        self.faults.lock().write_countdown = Some(n.max(1));
    }

    /// Returns the call counters.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        *self.stats.lock()
    }

    /// Returns every item in a table, ordered by id then version.
    #[must_use]
    pub fn items(&self, table: &str) -> Vec<Item> {
        self.tables
            .read()
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the number of stored versions across all tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.read().values().map(BTreeMap::len).sum()
    }

    /// Returns true if no table holds any item.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take_write_fault(&self) -> bool {
        let mut faults = self.faults.lock();
        if faults.fail_writes {
            return true;
        }
        match faults.write_countdown {
            Some(1) => {
                faults.write_countdown = None;
                true
            }
            Some(n) => {
                faults.write_countdown = Some(n - 1);
                false
            }
            None => false,
        }
    }

    fn check_batch(keys: impl ExactSizeIterator<Item = ItemKey>) -> StoreResult<()> {
        let count = keys.len();
        if count > MAX_TRANSACT_ITEMS {
            return Err(StoreError::TooManyItems {
                count,
                max: MAX_TRANSACT_ITEMS,
            });
        }
        let mut seen = HashSet::with_capacity(count);
        for key in keys {
            if !seen.insert(key.clone()) {
                return Err(StoreError::DuplicateKey { key });
            }
        }
        Ok(())
    }
}

fn row_key(key: &ItemKey) -> (String, u64) {
    (key.id.clone(), key.version)
}

impl ItemStore for InMemoryStore {
    fn get_item(&self, table: &str, key: &ItemKey) -> StoreResult<Option<Item>> {
        self.stats.lock().gets += 1;
        Ok(self
            .tables
            .read()
            .get(table)
            .and_then(|rows| rows.get(&row_key(key)).cloned()))
    }

    fn put_item(&self, table: &str, item: Item) -> StoreResult<()> {
        self.stats.lock().puts += 1;
        let key = (item.id.clone(), item.version);
        self.tables
            .write()
            .entry(table.to_string())
            .or_default()
            .insert(key, item);
        Ok(())
    }

    fn update_status(&self, table: &str, update: &StatusUpdate) -> StoreResult<()> {
        self.stats.lock().updates += 1;
        let mut tables = self.tables.write();
        let current = tables
            .get_mut(table)
            .and_then(|rows| rows.get_mut(&row_key(&update.key)));
        let Some(item) = current else {
            return Err(StoreError::ConditionFailed {
                key: update.key.clone(),
            });
        };
        if let Some(condition) = &update.condition {
            if !condition.holds(Some(item)) {
                return Err(StoreError::ConditionFailed {
                    key: update.key.clone(),
                });
            }
        }
        item.document_status = update.status;
        item.lock_expiry_ms = update.lock_expiry_ms;
        Ok(())
    }

    fn query_versions(&self, table: &str, id: &str, limit: usize) -> StoreResult<Vec<Item>> {
        self.stats.lock().queries += 1;
        let tables = self.tables.read();
        let Some(rows) = tables.get(table) else {
            return Ok(Vec::new());
        };
        let start = (id.to_string(), 0);
        let end = (id.to_string(), u64::MAX);
        Ok(rows
            .range(start..=end)
            .rev()
            .take(limit)
            .map(|(_, item)| item.clone())
            .collect())
    }

    fn transact_write(&self, table: &str, ops: &[WriteOp]) -> StoreResult<()> {
        self.stats.lock().transact_writes += 1;
        if self.take_write_fault() {
            return Err(StoreError::canceled("injected fault"));
        }
        Self::check_batch(ops.iter().map(WriteOp::key))?;

        let mut tables = self.tables.write();
        let rows = tables.entry(table.to_string()).or_default();

        for op in ops {
            let satisfied = match op {
                WriteOp::Put { item, condition } => condition
                    .as_ref()
                    .map_or(true, |c| c.holds(rows.get(&(item.id.clone(), item.version)))),
                WriteOp::Update(update) => {
                    let current = rows.get(&row_key(&update.key));
                    current.is_some()
                        && update
                            .condition
                            .as_ref()
                            .map_or(true, |c| c.holds(current))
                }
                WriteOp::Delete { key, condition } => condition
                    .as_ref()
                    .map_or(true, |c| c.holds(rows.get(&row_key(key)))),
            };
            if !satisfied {
                return Err(StoreError::canceled(format!(
                    "conditional check failed for {}",
                    op.key()
                )));
            }
        }

        for op in ops {
            match op {
                WriteOp::Put { item, .. } => {
                    rows.insert((item.id.clone(), item.version), item.clone());
                }
                WriteOp::Update(update) => {
                    if let Some(item) = rows.get_mut(&row_key(&update.key)) {
                        item.document_status = update.status;
                        item.lock_expiry_ms = update.lock_expiry_ms;
                    }
                }
                WriteOp::Delete { key, .. } => {
                    rows.remove(&row_key(key));
                }
            }
        }
        Ok(())
    }

    fn transact_get(&self, table: &str, keys: &[ItemKey]) -> StoreResult<Vec<Option<Item>>> {
        self.stats.lock().transact_gets += 1;
        if self.faults.lock().fail_gets {
            return Err(StoreError::canceled("injected fault"));
        }
        Self::check_batch(keys.iter().cloned())?;

        let tables = self.tables.read();
        let rows = tables.get(table);
        Ok(keys
            .iter()
            .map(|key| rows.and_then(|r| r.get(&row_key(key)).cloned()))
            .collect())
    }
}
