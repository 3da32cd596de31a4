//! # VerDB Core
//!
//! Transaction engine for VerDB.
//!
//! Every resource is stored as a sequence of immutable versions. A bundle of
//! create, read, update and delete requests commits atomically in three
//! phases:
//!
//! - **Lock**: the current version of every existing resource moves to
//!   `LOCKED` under a lease, in one all-or-nothing conditional write.
//! - **Stage**: new versions are written as `PENDING`, deletions move to
//!   `PENDING_DELETE`, reads are resolved.
//! - **Commit**: every held version moves to `AVAILABLE` or `DELETED`.
//!
//! A failure before commit rolls back. Readers never see a `PENDING`
//! version, and a lock abandoned by a crashed transaction can be taken over
//! once its lease expires.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Instant;
//! use verdb_core::{Config, TransactionCoordinator, TransactionRequest};
//! use verdb_store::InMemoryStore;
//!
//! let coordinator = TransactionCoordinator::new(Arc::new(InMemoryStore::new()), &Config::default());
//! let outcome = coordinator.transaction(
//!     &[TransactionRequest::create("Patient", serde_json::json!({"name": "Jane"}))],
//!     Instant::now(),
//! );
//! assert!(outcome.success);
//! assert_eq!(outcome.staging_results[0].version, 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod change;
mod config;
mod coordinator;
mod error;
pub mod export;
mod keys;
mod lock;
mod reader;
mod service;
mod stage;
pub mod status;
mod types;

pub use config::Config;
pub use coordinator::{
    CoordinatorStats, TransactionCoordinator, COMMITTED, NOTHING_TO_PROCESS, TIME_BUDGET_EXCEEDED,
};
pub use error::{CoreError, CoreResult, TransactionErrorKind};
pub use export::{
    ExportFile, ExportJob, ExportManager, ExportRequest, ExportStatus, ExportStatusReport,
    ExportType, ExportWorkflow,
};
pub use keys::{binary_object_name, binary_object_prefix, now_millis, KeyBuilder};
pub use lock::{LockManager, LockOutcome, UnlockOutcome};
pub use reader::{select_readable, VersionReader};
pub use service::{BinaryResponse, ResourceService};
pub use stage::{rollback_ops, StageOutcome, Stager};
pub use types::{
    LockRecord, LockSet, Operation, Resource, ServiceResponse, StagingResult, TransactionOutcome,
    TransactionRequest,
};

/// Version of the engine crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
