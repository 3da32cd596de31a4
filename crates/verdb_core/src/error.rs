//! Error types for VerDB core.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use verdb_store::StoreError;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Who can fix a failed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionErrorKind {
    /// Caller-correctable: the bundle is too slow or references a missing id.
    #[serde(rename = "USER_ERROR")]
    User,
    /// Transient or internal: the store rejected a write, or a ceiling was hit.
    #[serde(rename = "SYSTEM_ERROR")]
    System,
}

impl fmt::Display for TransactionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("USER_ERROR"),
            Self::System => f.write_str("SYSTEM_ERROR"),
        }
    }
}

/// Errors that can occur in VerDB core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// No readable version exists for the id.
    #[error("resource not found: {kind}/{id}")]
    NotFound {
        /// Resource kind.
        kind: String,
        /// Logical id.
        id: String,
    },

    /// A create named an id that already has versions.
    #[error("resource already exists: {kind}/{id}")]
    AlreadyExists {
        /// Resource kind.
        kind: String,
        /// Logical id.
        id: String,
    },

    /// The requested version does not exist.
    #[error("version not found: {kind}/{id}/_history/{version}")]
    VersionNotFound {
        /// Resource kind.
        kind: String,
        /// Logical id.
        id: String,
        /// Requested version.
        version: u64,
    },

    /// A transaction failed and was rolled back.
    #[error("{kind}: {message}")]
    Transaction {
        /// Who can fix the failure.
        kind: TransactionErrorKind,
        /// What went wrong.
        message: String,
    },

    /// An argument violated a precondition.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Which precondition was violated.
        message: String,
    },

    /// The operation needs semantics this engine does not have.
    #[error("{operation} is not implemented")]
    NotImplemented {
        /// Name of the operation.
        operation: &'static str,
    },

    /// The operation is deliberately unavailable.
    #[error("{operation} is not supported")]
    NotSupported {
        /// Name of the operation.
        operation: &'static str,
    },

    /// The export throttle rejected a new job.
    #[error("too many concurrent export requests")]
    TooManyConcurrentExports,

    /// The export job already finished.
    #[error("job cannot be canceled because it is already {status}")]
    ExportNotCancelable {
        /// The job's final status.
        status: String,
    },
}

impl CoreError {
    /// Creates a not found error.
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Creates a version not found error.
    pub fn version_not_found(kind: impl Into<String>, id: impl Into<String>, version: u64) -> Self {
        Self::VersionNotFound {
            kind: kind.into(),
            id: id.into(),
            version,
        }
    }

    /// Creates a user-correctable transaction error.
    pub fn user_error(message: impl Into<String>) -> Self {
        Self::Transaction {
            kind: TransactionErrorKind::User,
            message: message.into(),
        }
    }

    /// Creates a transient transaction error.
    pub fn system_error(message: impl Into<String>) -> Self {
        Self::Transaction {
            kind: TransactionErrorKind::System,
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Returns true for both kinds of not-found errors.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::VersionNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_renders_wire_names() {
        assert_eq!(TransactionErrorKind::User.to_string(), "USER_ERROR");
        assert_eq!(
            serde_json::to_string(&TransactionErrorKind::System).unwrap(),
            "\"SYSTEM_ERROR\""
        );
    }

    #[test]
    fn not_found_variants_are_distinct_from_failures() {
        assert!(CoreError::not_found("Patient", "a").is_not_found());
        assert!(CoreError::version_not_found("Patient", "a", 2).is_not_found());
        assert!(!CoreError::system_error("boom").is_not_found());
    }

    #[test]
    fn version_not_found_message() {
        let err = CoreError::version_not_found("Patient", "a", 2);
        assert_eq!(err.to_string(), "version not found: Patient/a/_history/2");
    }

    #[test]
    fn already_exists_is_not_a_not_found() {
        let err = CoreError::AlreadyExists {
            kind: "Patient".into(),
            id: "a".into(),
        };
        assert_eq!(err.to_string(), "resource already exists: Patient/a");
        assert!(!err.is_not_found());
    }
}
