//! Index command implementation.
//!
//! Replays every stored version as an upsert event and prints the resulting
//! search index actions.

use super::{load_store, CliResult, Format};
use std::path::Path;
use verdb_core::change::{plan_index_actions, ChangeEvent, IndexAction};
use verdb_core::Config;

/// Runs the index command.
pub fn run(seed: &Path, format: &str) -> CliResult<String> {
    let format = Format::parse(format)?;
    let config = Config::default();
    let store = load_store(Some(seed), &config)?;
    let events: Vec<ChangeEvent> = store
        .items(&config.resource_table)
        .into_iter()
        .map(ChangeEvent::Upserted)
        .collect();
    let actions = plan_index_actions(&events);
    tracing::debug!(events = events.len(), actions = actions.len(), "planned index actions");

    match format {
        Format::Json => Ok(format!("{}\n", serde_json::to_string_pretty(&actions)?)),
        Format::Text => Ok(actions.iter().map(render_action).collect()),
    }
}

fn render_action(action: &IndexAction) -> String {
    match action {
        IndexAction::Upsert {
            index,
            doc_id,
            document,
        } => format!("upsert {index}/{doc_id} ({})\n", document.document_status),
        IndexAction::Delete { index, doc_id } => format!("delete {index}/{doc_id}\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::*;

    #[test]
    fn available_versions_come_first() {
        let seed = json_file(SEED);
        let output = run(seed.path(), "text").unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(
            lines,
            vec![
                "upsert observation/o1_1 (AVAILABLE)",
                "upsert patient/p1_2 (AVAILABLE)",
                "upsert patient/p1_1 (DELETED)",
            ]
        );
    }

    #[test]
    fn binaries_are_not_indexed() {
        let seed = json_file(
            r#"[{"id": "b1", "version": 1, "resourceKind": "Binary", "payload": {},
                 "lastModified": "2024-01-01T00:00:00Z", "documentStatus": "AVAILABLE", "lockLeaseExpiry": 0}]"#,
        );
        let output = run(seed.path(), "json").unwrap();
        let actions: Vec<IndexAction> = serde_json::from_str(&output).unwrap();
        assert!(actions.is_empty());
    }
}
