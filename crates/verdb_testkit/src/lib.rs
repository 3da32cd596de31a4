//! # VerDB Testkit
//!
//! Test utilities for VerDB.
//!
//! This crate provides:
//! - Engine fixtures over the in-memory store, with version seeding
//! - Store invariant checks
//! - Property-based test generators using proptest
//! - An in-memory export workflow
//! - Concurrent stress runs
//!
//! ## Usage
//!
//! ```rust
//! use verdb_testkit::prelude::*;
//! use verdb_store::DocumentStatus;
//!
//! with_engine(|engine| {
//!     engine.seed_history("Patient", "p1", &[DocumentStatus::Deleted, DocumentStatus::Available]);
//!     assert!(invariant_violations(&engine.items()).is_empty());
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod export;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::export::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use export::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;
