//! In-memory export workflow.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use verdb_core::export::result_file_kind;
use verdb_core::{CoreError, CoreResult, ExportFile, ExportJob, ExportStatus, ExportWorkflow};

#[derive(Debug, Default)]
struct WorkflowState {
    jobs: BTreeMap<String, ExportJob>,
    files: BTreeMap<String, Vec<String>>,
    started: usize,
}

/// Export workflow that keeps jobs in memory and finishes them on demand.
#[derive(Debug, Default)]
pub struct InMemoryExportWorkflow {
    state: RwLock<WorkflowState>,
}

impl InMemoryExportWorkflow {
    /// Creates an empty workflow.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `job_id` completed with result files named
    /// `{job_id}/{Kind}-{n}.ndjson`.
    pub fn complete(&self, job_id: &str, file_names: &[&str]) -> CoreResult<()> {
        for name in file_names {
            result_file_kind(job_id, name)?;
        }
        let mut state = self.state.write();
        state
            .files
            .insert(job_id.to_string(), file_names.iter().map(|n| n.to_string()).collect());
        let job = state
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| CoreError::not_found("$export", job_id))?;
        job.job_status = ExportStatus::Completed;
        Ok(())
    }

    /// Marks `job_id` failed with `message`.
    pub fn fail(&self, job_id: &str, message: &str) -> CoreResult<()> {
        let mut state = self.state.write();
        let job = state
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| CoreError::not_found("$export", job_id))?;
        job.job_status = ExportStatus::Failed;
        job.job_failed_message = message.to_string();
        Ok(())
    }

    /// Returns how many jobs were ever started.
    pub fn started(&self) -> usize {
        self.state.read().started
    }
}

impl ExportWorkflow for InMemoryExportWorkflow {
    fn start(&self, job: ExportJob) -> CoreResult<()> {
        let mut state = self.state.write();
        state.started += 1;
        state.jobs.insert(job.job_id.clone(), job);
        Ok(())
    }

    fn jobs_with_status(&self, statuses: &[ExportStatus]) -> CoreResult<Vec<ExportJob>> {
        Ok(self
            .state
            .read()
            .jobs
            .values()
            .filter(|job| statuses.contains(&job.job_status))
            .cloned()
            .collect())
    }

    fn get(&self, job_id: &str) -> CoreResult<Option<ExportJob>> {
        Ok(self.state.read().jobs.get(job_id).cloned())
    }

    fn set_status(&self, job_id: &str, status: ExportStatus) -> CoreResult<()> {
        let mut state = self.state.write();
        let job = state
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| CoreError::not_found("$export", job_id))?;
        job.job_status = status;
        Ok(())
    }

    fn results(&self, job_id: &str) -> CoreResult<Vec<ExportFile>> {
        let state = self.state.read();
        let Some(names) = state.files.get(job_id) else {
            return Ok(Vec::new());
        };
        names
            .iter()
            .map(|name| {
                Ok(ExportFile {
                    resource_kind: result_file_kind(job_id, name)?,
                    url: format!("memory://exports/{name}"),
                })
            })
            .collect()
    }
}
