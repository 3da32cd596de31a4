//! CLI command implementations.

pub mod index;
pub mod inspect;
pub mod run;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use verdb_core::Config;
use verdb_store::{InMemoryStore, Item, ItemStore, StoreError};

/// Errors raised while loading command input.
#[derive(Debug, Error)]
pub enum CliError {
    /// An input file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File being read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An input file is not valid JSON of the expected shape.
    #[error("invalid JSON in {path}: {source}")]
    Json {
        /// File being parsed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// Seeding the store failed.
    #[error("failed to seed store: {0}")]
    Store(#[from] StoreError),

    /// Output could not be rendered.
    #[error("failed to render output: {0}")]
    Render(#[from] serde_json::Error),

    /// Unknown `--format` value.
    #[error("unknown output format '{0}' (expected text or json)")]
    Format(String),
}

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Output format selected with `--format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
}

impl Format {
    pub fn parse(format: &str) -> CliResult<Self> {
        match format {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(CliError::Format(other.to_string())),
        }
    }
}

/// Reads a JSON file into `T`.
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> CliResult<T> {
    let text = fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Builds an in-memory store holding the versions in `seed`, if any.
pub fn load_store(seed: Option<&Path>, config: &Config) -> CliResult<Arc<InMemoryStore>> {
    let store = Arc::new(InMemoryStore::new());
    if let Some(path) = seed {
        let items: Vec<Item> = read_json(path)?;
        tracing::debug!(path = %path.display(), count = items.len(), "seeding store");
        for item in items {
            store.put_item(&config.resource_table, item)?;
        }
    }
    Ok(store)
}

/// Renders the version table of `items` as text.
pub fn version_table(items: &[Item]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<38} {:>7}  {:<16} {:<15} {}\n",
        "ID", "VERSION", "KIND", "STATUS", "LAST MODIFIED"
    ));
    for item in items {
        out.push_str(&format!(
            "{:<38} {:>7}  {:<16} {:<15} {}\n",
            item.id,
            item.version,
            item.resource_kind,
            item.document_status,
            item.last_modified.to_rfc3339()
        ));
    }
    out
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::Write;
    use tempfile::NamedTempFile;

    pub const SEED: &str = r#"[
        {"id": "p1", "version": 1, "resourceKind": "Patient", "payload": {"name": "old"},
         "lastModified": "2024-01-01T00:00:00Z", "documentStatus": "DELETED", "lockLeaseExpiry": 0},
        {"id": "p1", "version": 2, "resourceKind": "Patient", "payload": {"name": "new"},
         "lastModified": "2024-01-02T00:00:00Z", "documentStatus": "AVAILABLE", "lockLeaseExpiry": 0},
        {"id": "o1", "version": 1, "resourceKind": "Observation", "payload": {},
         "lastModified": "2024-01-02T00:00:00Z", "documentStatus": "AVAILABLE", "lockLeaseExpiry": 0}
    ]"#;

    pub fn json_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }
}
