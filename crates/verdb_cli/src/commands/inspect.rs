//! Inspect command implementation.

use super::{load_store, version_table, CliResult, Format};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use verdb_core::{select_readable, Config};
use verdb_store::{DocumentStatus, Item};

/// Store inspection result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectResult {
    /// Number of stored versions.
    pub version_count: usize,
    /// Number of logical ids.
    pub resource_count: usize,
    /// Versions per status.
    pub status_counts: BTreeMap<String, usize>,
    /// Readable version per logical id, `None` when deleted.
    pub readable: BTreeMap<String, Option<u64>>,
    /// Versions left in a non-final status.
    pub unsettled: Vec<String>,
    /// Stored versions, newest first within each id.
    pub versions: Vec<Item>,
}

/// Runs the inspect command.
pub fn run(seed: &Path, id: Option<&str>, format: &str) -> CliResult<String> {
    let format = Format::parse(format)?;
    let config = Config::default();
    let store = load_store(Some(seed), &config)?;
    let mut items = store.items(&config.resource_table);
    if let Some(id) = id {
        items.retain(|item| item.id == id);
    }
    let result = inspect(items);

    match format {
        Format::Json => Ok(format!("{}\n", serde_json::to_string_pretty(&result)?)),
        Format::Text => Ok(render_text(&result)),
    }
}

fn inspect(mut items: Vec<Item>) -> InspectResult {
    items.sort_by(|a, b| a.id.cmp(&b.id).then(b.version.cmp(&a.version)));

    let mut status_counts = BTreeMap::new();
    let mut by_id: BTreeMap<String, Vec<Item>> = BTreeMap::new();
    let mut unsettled = Vec::new();
    for item in &items {
        *status_counts
            .entry(item.document_status.to_string())
            .or_insert(0) += 1;
        if !item.document_status.is_terminal() {
            unsettled.push(item.key().to_string());
        }
        by_id.entry(item.id.clone()).or_default().push(item.clone());
    }

    let readable = by_id
        .iter()
        .map(|(id, versions)| (id.clone(), select_readable(versions).map(|item| item.version)))
        .collect();

    InspectResult {
        version_count: items.len(),
        resource_count: by_id.len(),
        status_counts,
        readable,
        unsettled,
        versions: items,
    }
}

fn render_text(result: &InspectResult) -> String {
    let mut out = String::new();
    out.push_str("VerDB Store Inspection\n");
    out.push_str("======================\n\n");
    out.push_str(&format!("Resources: {}\n", result.resource_count));
    out.push_str(&format!("Versions:  {}\n", result.version_count));
    for (status, count) in &result.status_counts {
        out.push_str(&format!("  {status:<15} {count}\n"));
    }

    out.push_str("\nReadable:\n");
    for (id, version) in &result.readable {
        match version {
            Some(version) => out.push_str(&format!("  {id} -> v{version}\n")),
            None => out.push_str(&format!("  {id} -> {}\n", DocumentStatus::Deleted)),
        }
    }

    if !result.unsettled.is_empty() {
        out.push_str("\nUnsettled versions:\n");
        for key in &result.unsettled {
            out.push_str(&format!("  {key}\n"));
        }
    }

    out.push('\n');
    out.push_str(&version_table(&result.versions));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::*;

    #[test]
    fn summarizes_seeded_versions() {
        let seed = json_file(SEED);
        let output = run(seed.path(), None, "json").unwrap();
        let result: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(result["versionCount"], 3);
        assert_eq!(result["resourceCount"], 2);
        assert_eq!(result["statusCounts"]["AVAILABLE"], 2);
        assert_eq!(result["readable"]["p1"], 2);
        assert!(result["unsettled"].as_array().unwrap().is_empty());
    }

    #[test]
    fn filters_by_id_and_flags_pending_versions() {
        let seed = json_file(
            r#"[{"id": "p1", "version": 1, "resourceKind": "Patient", "payload": {},
                 "lastModified": "2024-01-01T00:00:00Z", "documentStatus": "AVAILABLE", "lockLeaseExpiry": 0},
                {"id": "p1", "version": 2, "resourceKind": "Patient", "payload": {},
                 "lastModified": "2024-01-01T00:00:00Z", "documentStatus": "PENDING", "lockLeaseExpiry": 0},
                {"id": "p2", "version": 1, "resourceKind": "Patient", "payload": {},
                 "lastModified": "2024-01-01T00:00:00Z", "documentStatus": "AVAILABLE", "lockLeaseExpiry": 0}]"#,
        );
        let output = run(seed.path(), Some("p1"), "text").unwrap();
        assert!(output.contains("Resources: 1"));
        assert!(output.contains("p1 -> v1"));
        assert!(output.contains("Unsettled versions:\n  p1_2"));
        assert!(!output.contains("p2"));
    }
}
