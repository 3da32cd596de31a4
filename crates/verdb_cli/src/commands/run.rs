//! Run command implementation.

use super::{load_store, read_json, version_table, CliResult, Format};
use serde::Serialize;
use std::path::Path;
use std::time::{Duration, Instant};
use verdb_core::{Config, TransactionCoordinator, TransactionOutcome, TransactionRequest};
use verdb_store::Item;

/// Transaction outcome together with the store contents afterwards.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// Outcome returned by the coordinator.
    pub outcome: TransactionOutcome,
    /// Every stored version after the transaction.
    pub versions: Vec<Item>,
}

/// Runs the bundle in `bundle` against a store seeded from `seed`.
pub fn run(
    seed: Option<&Path>,
    bundle: &Path,
    budget_ms: Option<u64>,
    format: &str,
) -> CliResult<String> {
    let format = Format::parse(format)?;
    let mut config = Config::default();
    if let Some(ms) = budget_ms {
        config = config.max_execution_time(Duration::from_millis(ms));
    }

    let store = load_store(seed, &config)?;
    let requests: Vec<TransactionRequest> = read_json(bundle)?;
    let coordinator = TransactionCoordinator::new(store.clone(), &config);
    let outcome = coordinator.transaction(&requests, Instant::now());

    let report = RunReport {
        outcome,
        versions: store.items(&config.resource_table),
    };
    match format {
        Format::Json => Ok(format!("{}\n", serde_json::to_string_pretty(&report)?)),
        Format::Text => Ok(render_text(&report)),
    }
}

fn render_text(report: &RunReport) -> String {
    let outcome = &report.outcome;
    let mut out = String::new();
    match outcome.error_type {
        None => out.push_str(&format!("Committed: {}\n", outcome.message)),
        Some(kind) => out.push_str(&format!("Rolled back ({kind}): {}\n", outcome.message)),
    }
    if !outcome.staging_results.is_empty() {
        out.push_str("\nResults:\n");
        for result in &outcome.staging_results {
            out.push_str(&format!(
                "  {:<6} {}/{} v{}\n",
                result.operation, result.resource_kind, result.id, result.version
            ));
        }
    }
    out.push_str("\nVersions:\n");
    out.push_str(&version_table(&report.versions));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::*;

    #[test]
    fn commits_an_update() {
        let seed = json_file(SEED);
        let bundle = json_file(
            r#"[{"operation": "update", "resourceKind": "Patient", "id": "p1", "payload": {"name": "newer"}}]"#,
        );
        let output = run(Some(seed.path()), bundle.path(), None, "json").unwrap();
        let report: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(report["outcome"]["success"], true);
        assert_eq!(report["outcome"]["stagingResults"][0]["version"], 3);
        assert_eq!(report["versions"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn reports_a_missing_resource() {
        let bundle = json_file(r#"[{"operation": "read", "resourceKind": "Patient", "id": "nobody"}]"#);
        let output = run(None, bundle.path(), None, "text").unwrap();
        assert!(output.starts_with("Rolled back (USER_ERROR)"));
        assert!(output.contains("Patient/nobody"));
    }

    #[test]
    fn text_output_lists_results() {
        let seed = json_file(SEED);
        let bundle = json_file(
            r#"[{"operation": "delete", "resourceKind": "Observation", "id": "o1"}]"#,
        );
        let output = run(Some(seed.path()), bundle.path(), None, "text").unwrap();
        assert!(output.starts_with("Committed: "));
        assert!(output.contains("Observation/o1 v1"));
        assert!(output.contains("DELETED"));
    }
}
