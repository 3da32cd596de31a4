//! Stress runs for the transaction engine.
//!
//! These runs drive many transactions at a small set of ids from several
//! threads at once. Lock contention makes failures expected; the store must
//! still satisfy [`invariant_violations`](crate::invariant_violations) when a
//! run finishes.

use crate::fixtures::TestEngine;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use verdb_core::{TransactionErrorKind, TransactionRequest};

/// Result of a stress run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total transactions attempted.
    pub total_ops: usize,
    /// Transactions that committed.
    pub successful_ops: usize,
    /// Transactions that rolled back.
    pub failed_ops: usize,
    /// Rollbacks caused by a user error.
    pub user_errors: usize,
    /// Total duration.
    pub duration: Duration,
    /// Transactions per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    fn new(successful: usize, failed: usize, user_errors: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            user_errors,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {name} ===");
        println!("Total transactions: {}", self.total_ops);
        println!("Committed: {}", self.successful_ops);
        println!("Rolled back: {} ({} user errors)", self.failed_ops, self.user_errors);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} tx/sec", self.ops_per_second);
    }
}

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Transactions per thread.
    pub transactions: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Number of distinct ids the threads contend on.
    pub ids: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            transactions: 50,
            threads: 4,
            ids: 3,
        }
    }
}

#[derive(Default)]
struct Tally {
    successful: AtomicUsize,
    failed: AtomicUsize,
    user_errors: AtomicUsize,
}

impl Tally {
    fn record(&self, success: bool, error_type: Option<TransactionErrorKind>) {
        if success {
            self.successful.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
            if error_type == Some(TransactionErrorKind::User) {
                self.user_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn finish(self, duration: Duration) -> StressTestResult {
        StressTestResult::new(
            self.successful.into_inner(),
            self.failed.into_inner(),
            self.user_errors.into_inner(),
            duration,
        )
    }
}

fn stress_ids(config: &StressConfig) -> Vec<String> {
    (0..config.ids.max(1)).map(|i| format!("stress-{i}")).collect()
}

/// Seeds `config.ids` resources, then has every thread update them in turn.
pub fn stress_concurrent_updates(engine: &TestEngine, config: &StressConfig) -> StressTestResult {
    let ids = stress_ids(config);
    for id in &ids {
        engine.seed_available("Patient", id);
    }

    let tally = Tally::default();
    let start = Instant::now();
    thread::scope(|scope| {
        for t in 0..config.threads {
            let (ids, tally) = (&ids, &tally);
            scope.spawn(move || {
                for i in 0..config.transactions {
                    let id = &ids[(t + i) % ids.len()];
                    let outcome = engine.run(&[TransactionRequest::update(
                        "Patient",
                        id.as_str(),
                        json!({ "thread": t, "round": i }),
                    )]);
                    tally.record(outcome.success, outcome.error_type);
                }
            });
        }
    });
    tally.finish(start.elapsed())
}

/// Has every thread run bundles that update one id, read another and create
/// a fresh resource.
pub fn stress_mixed_bundles(engine: &TestEngine, config: &StressConfig) -> StressTestResult {
    let ids = stress_ids(config);
    for id in &ids {
        engine.seed_available("Patient", id);
    }

    let tally = Tally::default();
    let start = Instant::now();
    thread::scope(|scope| {
        for t in 0..config.threads {
            let (ids, tally) = (&ids, &tally);
            scope.spawn(move || {
                for i in 0..config.transactions {
                    let mut bundle = vec![
                        TransactionRequest::update(
                            "Patient",
                            ids[i % ids.len()].as_str(),
                            json!({ "thread": t }),
                        ),
                        TransactionRequest::create("Observation", json!({ "round": i })),
                    ];
                    if ids.len() > 1 {
                        bundle.push(TransactionRequest::read(
                            "Patient",
                            ids[(i + 1) % ids.len()].as_str(),
                        ));
                    }
                    let outcome = engine.run(&bundle);
                    tally.record(outcome.success, outcome.error_type);
                }
            });
        }
    });
    tally.finish(start.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::invariant_violations;

    fn small() -> StressConfig {
        StressConfig {
            transactions: 20,
            threads: 4,
            ids: 2,
        }
    }

    #[test]
    fn concurrent_updates_keep_invariants() {
        let engine = TestEngine::new();
        let result = stress_concurrent_updates(&engine, &small());
        assert_eq!(result.total_ops, 80);
        assert!(result.successful_ops > 0);
        assert_eq!(result.user_errors, 0);
        assert!(invariant_violations(&engine.items()).is_empty());
    }

    #[test]
    fn mixed_bundles_keep_invariants() {
        let engine = TestEngine::new();
        let result = stress_mixed_bundles(&engine, &small());
        assert_eq!(result.total_ops, 80);
        assert!(invariant_violations(&engine.items()).is_empty());
    }

    #[test]
    fn committed_versions_are_counted() {
        let engine = TestEngine::new();
        let config = StressConfig {
            transactions: 10,
            threads: 1,
            ids: 1,
        };
        let result = stress_concurrent_updates(&engine, &config);
        assert_eq!(result.successful_ops, 10);
        // The seeded version plus one per committed update.
        assert_eq!(engine.items().len(), 11);
    }
}
