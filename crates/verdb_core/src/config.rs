//! Engine configuration.

use std::time::Duration;

/// Configuration for the transaction engine and resource service.
#[derive(Debug, Clone)]
pub struct Config {
    /// Table holding versioned resources.
    pub resource_table: String,

    /// How long a lock stays exclusive before another transaction may steal it.
    pub lease_duration: Duration,

    /// Wall-clock budget for one transaction, measured from its start time.
    pub max_execution_time: Duration,

    /// Most items touched by one multi-item store call.
    pub max_transaction_items: usize,

    /// Most export jobs in progress or canceling across all users.
    pub max_concurrent_exports: usize,

    /// Most export jobs in progress or canceling for one user.
    pub max_concurrent_exports_per_user: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resource_table: "resource-db".to_string(),
            lease_duration: Duration::from_secs(35),
            max_execution_time: Duration::from_secs(26),
            max_transaction_items: verdb_store::MAX_TRANSACT_ITEMS,
            max_concurrent_exports: 2,
            max_concurrent_exports_per_user: 1,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the resource table name.
    #[must_use]
    pub fn resource_table(mut self, table: impl Into<String>) -> Self {
        self.resource_table = table.into();
        self
    }

    /// Sets the lock lease duration.
    #[must_use]
    pub const fn lease_duration(mut self, duration: Duration) -> Self {
        self.lease_duration = duration;
        self
    }

    /// Sets the per-transaction execution budget.
    #[must_use]
    pub const fn max_execution_time(mut self, duration: Duration) -> Self {
        self.max_execution_time = duration;
        self
    }

    /// Sets the per-call item ceiling.
    #[must_use]
    pub const fn max_transaction_items(mut self, count: usize) -> Self {
        self.max_transaction_items = count;
        self
    }

    /// Sets the export throttles.
    #[must_use]
    pub const fn export_limits(mut self, total: usize, per_user: usize) -> Self {
        self.max_concurrent_exports = total;
        self.max_concurrent_exports_per_user = per_user;
        self
    }

    /// Returns the table used for `tenant`, or the shared table if none.
    #[must_use]
    pub fn table_for(&self, tenant: Option<&str>) -> String {
        match tenant {
            Some(tenant) => format!("{}-{tenant}", self.resource_table),
            None => self.resource_table.clone(),
        }
    }
}
