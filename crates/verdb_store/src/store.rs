//! Item store trait definition.

use crate::error::StoreResult;
use crate::item::{Item, ItemKey, StatusUpdate, WriteOp};

/// Maximum number of items accepted by one multi-item call.
pub const MAX_TRANSACT_ITEMS: usize = 25;

/// A key-value store of versioned items.
///
/// Rows are addressed by `(table, id, version)`. The store offers single-item
/// conditional updates and a bounded all-or-nothing multi-item write; it has
/// no notion of long-running transactions, locks or rollback.
///
/// # Invariants
///
/// - `transact_write` either applies every operation or none of them
/// - every condition in a `transact_write` is evaluated before any operation
///   is applied
/// - multi-item calls with more than [`MAX_TRANSACT_ITEMS`] entries, or with
///   the same key twice, are rejected without touching any item
/// - `query_versions` returns items ordered by version, highest first
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing and single-process use
pub trait ItemStore: Send + Sync {
    /// Reads one exact version.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    fn get_item(&self, table: &str, key: &ItemKey) -> StoreResult<Option<Item>>;

    /// Writes an item unconditionally.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    fn put_item(&self, table: &str, item: Item) -> StoreResult<()>;

    /// Applies a single conditional status update.
    ///
    /// Updating a missing item always fails the condition.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::ConditionFailed`] if the guard does not hold.
    fn update_status(&self, table: &str, update: &StatusUpdate) -> StoreResult<()>;

    /// Returns up to `limit` versions of `id`, highest version first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    fn query_versions(&self, table: &str, id: &str, limit: usize) -> StoreResult<Vec<Item>>;

    /// Applies all operations atomically.
    ///
    /// # Errors
    ///
    /// Returns an error, with nothing applied, if any condition fails, the
    /// call is too large, or a key repeats.
    fn transact_write(&self, table: &str, ops: &[WriteOp]) -> StoreResult<()>;

    /// Reads several exact versions in one consistent call.
    ///
    /// The result has one entry per key, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the call is too large or the store cannot be reached.
    fn transact_get(&self, table: &str, keys: &[ItemKey]) -> StoreResult<Vec<Option<Item>>>;
}
