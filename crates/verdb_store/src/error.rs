//! Error types for store operations.

use crate::item::ItemKey;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A conditional check failed on a single-item update.
    #[error("conditional check failed for {key}")]
    ConditionFailed {
        /// The item whose condition did not hold.
        key: ItemKey,
    },

    /// A multi-item write was canceled; nothing was applied.
    #[error("transaction canceled: {reason}")]
    TransactionCanceled {
        /// Why the store rejected the transaction.
        reason: String,
    },

    /// A multi-item call carried more items than the store accepts.
    #[error("too many items in one call: {count} (max {max})")]
    TooManyItems {
        /// Number of items submitted.
        count: usize,
        /// Per-call ceiling.
        max: usize,
    },

    /// The same key appeared twice in one multi-item call.
    #[error("multiple operations on {key} in one transaction")]
    DuplicateKey {
        /// The repeated key.
        key: ItemKey,
    },

    /// No binary object exists under the name.
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// The store could not be reached or refused the call.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Creates a transaction canceled error.
    pub fn canceled(reason: impl Into<String>) -> Self {
        Self::TransactionCanceled {
            reason: reason.into(),
        }
    }

    /// Returns true if retrying after contention clears may succeed.
    #[must_use]
    pub fn is_contention(&self) -> bool {
        matches!(
            self,
            Self::ConditionFailed { .. } | Self::TransactionCanceled { .. }
        )
    }
}
