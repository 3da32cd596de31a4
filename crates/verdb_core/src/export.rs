//! Bulk export jobs.
//!
//! The export itself runs in an external workflow behind [`ExportWorkflow`];
//! this module owns job creation, throttling, status reports and
//! cancellation.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Status of an export job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExportStatus {
    /// Running.
    InProgress,
    /// Cancel requested, workflow still stopping.
    Canceling,
    /// Stopped on request.
    Canceled,
    /// Finished with results.
    Completed,
    /// Finished with an error.
    Failed,
}

impl ExportStatus {
    /// Statuses that count against the concurrency limits.
    pub const ACTIVE: [Self; 2] = [Self::Canceling, Self::InProgress];

    /// Returns the wire name of this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in-progress",
            Self::Canceling => "canceling",
            Self::Canceled => "canceled",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::InProgress,
            Self::Canceling,
            Self::Canceled,
            Self::Completed,
            Self::Failed,
        ]
        .into_iter()
        .find(|status| status.as_str() == s)
        .ok_or_else(|| CoreError::invalid_argument(format!("Invalid status \"{s}\"")))
    }
}

/// Scope of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportType {
    /// Every resource.
    System,
    /// Members of one group.
    Group,
    /// Patient compartments.
    Patient,
}

/// A caller's request to start an export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    /// User starting the export.
    pub requester_user_id: String,
    /// Scope of the export.
    pub export_type: ExportType,
    /// Point in time the export reflects.
    pub transaction_time: DateTime<Utc>,
    /// Output format, `ndjson` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,
    /// Only resources modified after this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    /// Comma-separated resource kinds to include.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_types: Option<String>,
    /// Group to export, for group exports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

/// A persisted export job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportJob {
    /// Generated job id.
    pub job_id: String,
    /// User who started the job.
    pub job_owner_id: String,
    /// Scope of the export.
    pub export_type: ExportType,
    /// Group to export; empty when not a group export.
    pub group_id: String,
    /// Output format.
    pub output_format: String,
    /// Lower bound on modification time.
    pub since: DateTime<Utc>,
    /// Comma-separated resource kinds; empty for all.
    pub resource_types: String,
    /// Point in time the export reflects.
    pub transaction_time: DateTime<Utc>,
    /// Current status.
    pub job_status: ExportStatus,
    /// Failure reason; empty unless failed.
    pub job_failed_message: String,
}

impl ExportJob {
    /// Builds a new in-progress job from `request`.
    pub fn from_request(request: &ExportRequest) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            job_owner_id: request.requester_user_id.clone(),
            export_type: request.export_type,
            group_id: request.group_id.clone().unwrap_or_default(),
            output_format: request
                .output_format
                .clone()
                .unwrap_or_else(|| "ndjson".to_string()),
            since: request.since.unwrap_or_else(default_since),
            resource_types: request.resource_types.clone().unwrap_or_default(),
            transaction_time: request.transaction_time,
            job_status: ExportStatus::InProgress,
            job_failed_message: String::new(),
        }
    }
}

/// Export lower bound used when the request has none.
fn default_since() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(1800, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// One result file of a completed export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportFile {
    /// Resource kind contained in the file.
    #[serde(rename = "type")]
    pub resource_kind: String,
    /// Signed download URL.
    pub url: String,
}

/// Status report of an export job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportStatusReport {
    /// User who started the job.
    pub job_owner_id: String,
    /// Current status.
    pub job_status: ExportStatus,
    /// Result files; empty until completed.
    pub exported_file_urls: Vec<ExportFile>,
    /// Point in time the export reflects.
    pub transaction_time: DateTime<Utc>,
    /// Scope of the export.
    pub export_type: ExportType,
    /// Output format.
    pub output_format: String,
    /// Lower bound on modification time.
    pub since: DateTime<Utc>,
    /// Comma-separated resource kinds.
    pub resource_types: String,
    /// Group exported.
    pub group_id: String,
    /// Failure reason.
    pub error_message: String,
}

/// Parses the resource kind out of a result file name.
///
/// Result files are named `{job_id}/{Kind}-{n}.ndjson`.
///
/// # Errors
///
/// Returns [`CoreError::InvalidArgument`] for any other name.
pub fn result_file_kind(job_id: &str, name: &str) -> CoreResult<String> {
    let parse = || {
        let file = name.strip_prefix(job_id)?.strip_prefix('/')?;
        let (kind, part) = file.strip_suffix(".ndjson")?.split_once('-')?;
        let valid = !kind.is_empty()
            && kind.chars().all(|c| c.is_ascii_alphabetic())
            && !part.is_empty()
            && part.chars().all(|c| c.is_ascii_digit());
        valid.then(|| kind.to_string())
    };
    parse().ok_or_else(|| {
        CoreError::invalid_argument(format!(
            "Could not parse the name of bulk exports result file: {name}"
        ))
    })
}

/// External workflow running export jobs.
pub trait ExportWorkflow: Send + Sync {
    /// Persists `job` and starts running it.
    fn start(&self, job: ExportJob) -> CoreResult<()>;

    /// Returns every job currently in one of `statuses`.
    fn jobs_with_status(&self, statuses: &[ExportStatus]) -> CoreResult<Vec<ExportJob>>;

    /// Returns the job `job_id`, if it exists.
    fn get(&self, job_id: &str) -> CoreResult<Option<ExportJob>>;

    /// Moves the job `job_id` to `status`.
    fn set_status(&self, job_id: &str, status: ExportStatus) -> CoreResult<()>;

    /// Returns the result files of a completed job.
    fn results(&self, job_id: &str) -> CoreResult<Vec<ExportFile>>;
}

/// Starts, reports on and cancels export jobs.
pub struct ExportManager {
    workflow: Arc<dyn ExportWorkflow>,
    max_concurrent: usize,
    max_per_user: usize,
    /// Serializes the throttle check with the start it guards.
    admission: Mutex<()>,
}

impl ExportManager {
    /// Creates a manager using the export limits in `config`.
    pub fn new(workflow: Arc<dyn ExportWorkflow>, config: &Config) -> Self {
        Self {
            workflow,
            max_concurrent: config.max_concurrent_exports,
            max_per_user: config.max_concurrent_exports_per_user,
            admission: Mutex::new(()),
        }
    }

    /// Starts a new export and returns its job id.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TooManyConcurrentExports`] if the requester or the
    /// whole system already runs the maximum number of exports.
    pub fn initiate(&self, request: &ExportRequest) -> CoreResult<String> {
        let _admission = self.admission.lock();
        let active = self.workflow.jobs_with_status(&ExportStatus::ACTIVE)?;
        let owned = active
            .iter()
            .filter(|job| job.job_owner_id == request.requester_user_id)
            .count();
        if owned >= self.max_per_user || active.len() >= self.max_concurrent {
            info!(
                user = %request.requester_user_id,
                owned,
                active = active.len(),
                "export throttled"
            );
            return Err(CoreError::TooManyConcurrentExports);
        }

        let job = ExportJob::from_request(request);
        let job_id = job.job_id.clone();
        self.workflow.start(job)?;
        info!(job_id = %job_id, "export started");
        Ok(job_id)
    }

    /// Returns the status of `job_id`, with result files once completed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown job.
    pub fn status(&self, job_id: &str) -> CoreResult<ExportStatusReport> {
        let job = self.job(job_id)?;
        let exported_file_urls = if job.job_status == ExportStatus::Completed {
            self.workflow.results(job_id)?
        } else {
            Vec::new()
        };
        Ok(ExportStatusReport {
            job_owner_id: job.job_owner_id,
            job_status: job.job_status,
            exported_file_urls,
            transaction_time: job.transaction_time,
            export_type: job.export_type,
            output_format: job.output_format,
            since: job.since,
            resource_types: job.resource_types,
            group_id: job.group_id,
            error_message: job.job_failed_message,
        })
    }

    /// Requests cancellation of `job_id`.
    ///
    /// Jobs already canceled or canceling are left alone.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown job and
    /// [`CoreError::ExportNotCancelable`] for a finished one.
    pub fn cancel(&self, job_id: &str) -> CoreResult<()> {
        let job = self.job(job_id)?;
        match job.job_status {
            ExportStatus::Completed | ExportStatus::Failed => Err(CoreError::ExportNotCancelable {
                status: job.job_status.to_string(),
            }),
            ExportStatus::Canceled | ExportStatus::Canceling => Ok(()),
            ExportStatus::InProgress => {
                info!(job_id, "export canceling");
                self.workflow.set_status(job_id, ExportStatus::Canceling)
            }
        }
    }

    fn job(&self, job_id: &str) -> CoreResult<ExportJob> {
        self.workflow
            .get(job_id)?
            .ok_or_else(|| CoreError::not_found("$export", job_id))
    }
}

impl fmt::Debug for ExportManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportManager")
            .field("max_concurrent", &self.max_concurrent)
            .field("max_per_user", &self.max_per_user)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Jobs(Mutex<HashMap<String, ExportJob>>);

    impl ExportWorkflow for Jobs {
        fn start(&self, job: ExportJob) -> CoreResult<()> {
            self.0.lock().insert(job.job_id.clone(), job);
            Ok(())
        }

        fn jobs_with_status(&self, statuses: &[ExportStatus]) -> CoreResult<Vec<ExportJob>> {
            Ok(self
                .0
                .lock()
                .values()
                .filter(|job| statuses.contains(&job.job_status))
                .cloned()
                .collect())
        }

        fn get(&self, job_id: &str) -> CoreResult<Option<ExportJob>> {
            Ok(self.0.lock().get(job_id).cloned())
        }

        fn set_status(&self, job_id: &str, status: ExportStatus) -> CoreResult<()> {
            if let Some(job) = self.0.lock().get_mut(job_id) {
                job.job_status = status;
            }
            Ok(())
        }

        fn results(&self, job_id: &str) -> CoreResult<Vec<ExportFile>> {
            Ok(vec![ExportFile {
                resource_kind: "Patient".into(),
                url: format!("memory://exports/{job_id}/Patient-1.ndjson"),
            }])
        }
    }

    fn request(user: &str) -> ExportRequest {
        ExportRequest {
            requester_user_id: user.into(),
            export_type: ExportType::System,
            transaction_time: Utc::now(),
            output_format: None,
            since: None,
            resource_types: None,
            group_id: None,
        }
    }

    fn manager() -> (Arc<Jobs>, ExportManager) {
        let jobs = Arc::new(Jobs::default());
        let manager = ExportManager::new(jobs.clone(), &Config::default());
        (jobs, manager)
    }

    #[test]
    fn new_job_has_defaults() {
        let job = ExportJob::from_request(&request("alice"));
        assert_eq!(job.output_format, "ndjson");
        assert_eq!(job.since.to_rfc3339(), "1800-01-01T00:00:00+00:00");
        assert_eq!(job.job_status, ExportStatus::InProgress);
        assert!(job.group_id.is_empty());
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(
            serde_json::to_string(&ExportStatus::InProgress).unwrap(),
            "\"in-progress\""
        );
        assert_eq!("canceling".parse::<ExportStatus>().unwrap(), ExportStatus::Canceling);
        assert!("paused".parse::<ExportStatus>().is_err());
    }

    #[test]
    fn throttles_per_user_and_system_wide() {
        let (_, manager) = manager();
        manager.initiate(&request("alice")).unwrap();
        assert!(matches!(
            manager.initiate(&request("alice")),
            Err(CoreError::TooManyConcurrentExports)
        ));
        manager.initiate(&request("bob")).unwrap();
        assert!(matches!(
            manager.initiate(&request("carol")),
            Err(CoreError::TooManyConcurrentExports)
        ));
    }

    #[test]
    fn finished_jobs_free_their_slot() {
        let (jobs, manager) = manager();
        let id = manager.initiate(&request("alice")).unwrap();
        jobs.set_status(&id, ExportStatus::Completed).unwrap();
        assert!(manager.initiate(&request("alice")).is_ok());
    }

    #[test]
    fn cancel_rules() {
        let (jobs, manager) = manager();
        let id = manager.initiate(&request("alice")).unwrap();

        manager.cancel(&id).unwrap();
        assert_eq!(manager.status(&id).unwrap().job_status, ExportStatus::Canceling);
        manager.cancel(&id).unwrap();

        jobs.set_status(&id, ExportStatus::Failed).unwrap();
        assert!(matches!(
            manager.cancel(&id),
            Err(CoreError::ExportNotCancelable { .. })
        ));
        assert!(manager.cancel("missing").unwrap_err().is_not_found());
    }

    #[test]
    fn results_only_for_completed_jobs() {
        let (jobs, manager) = manager();
        let id = manager.initiate(&request("alice")).unwrap();
        assert!(manager.status(&id).unwrap().exported_file_urls.is_empty());

        jobs.set_status(&id, ExportStatus::Completed).unwrap();
        let report = manager.status(&id).unwrap();
        assert_eq!(report.exported_file_urls.len(), 1);
        assert_eq!(report.exported_file_urls[0].resource_kind, "Patient");
    }

    #[test]
    fn parses_result_file_names() {
        assert_eq!(result_file_kind("job1", "job1/Patient-12.ndjson").unwrap(), "Patient");
        assert!(result_file_kind("job1", "job2/Patient-1.ndjson").is_err());
        assert!(result_file_kind("job1", "job1/Patient.ndjson").is_err());
        assert!(result_file_kind("job1", "job1/Pat1ent-1.ndjson").is_err());
    }
}
