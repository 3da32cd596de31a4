//! # VerDB Store
//!
//! Item store trait and implementations for VerDB.
//!
//! This crate provides the lowest-level storage abstraction for VerDB: a
//! key-value store of versioned items that offers exactly two write
//! primitives, a single-item conditional update and a bounded all-or-nothing
//! multi-item conditional write. Locking, staging and rollback are built on
//! top of these by `verdb_core`.
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral storage
//! - [`InMemoryObjectStorage`] - Binary objects with presigned URLs
//!
//! ## Example
//!
//! ```rust
//! use verdb_store::{DocumentStatus, InMemoryStore, Item, ItemKey, ItemStore};
//!
//! let store = InMemoryStore::new();
//! let item = Item {
//!     id: "abc".into(),
//!     version: 1,
//!     resource_kind: "Patient".into(),
//!     payload: serde_json::json!({"name": "Jane"}),
//!     last_modified: chrono::Utc::now(),
//!     document_status: DocumentStatus::Available,
//!     lock_expiry_ms: 0,
//! };
//! store.put_item("resources", item).unwrap();
//! assert!(store.get_item("resources", &ItemKey::new("abc", 1)).unwrap().is_some());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod item;
mod memory;
mod object;
mod store;

pub use error::{StoreError, StoreResult};
pub use item::{Condition, DocumentStatus, Item, ItemKey, StatusUpdate, WriteOp};
pub use memory::{InMemoryStore, StoreStats};
pub use object::{InMemoryObjectStorage, ObjectStorage};
pub use store::{ItemStore, MAX_TRANSACT_ITEMS};
