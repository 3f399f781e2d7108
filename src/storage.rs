use crate::app::ports::{JobRun, JobStarted, JobStatus, JobTracker, StartJob};
use crate::error::Result;
use crate::types::Document;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// In-memory job tracker for dry runs and tests.
#[derive(Clone, Default)]
pub struct InMemoryJobTracker {
    runs: Arc<Mutex<HashMap<i64, JobRun>>>,
    next_id: Arc<Mutex<i64>>,
}

impl InMemoryJobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn runs(&self) -> MutexGuard<'_, HashMap<i64, JobRun>> {
        self.runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// All runs recorded so far, ordered by run id.
    pub fn all_runs(&self) -> Vec<JobRun> {
        let mut runs: Vec<JobRun> = self.runs().values().cloned().collect();
        runs.sort_by_key(|r| r.id);
        runs
    }

    fn finish(&self, run_id: i64, status: JobStatus, update: impl FnOnce(&mut JobRun)) -> u64 {
        let mut runs = self.runs();
        match runs.get_mut(&run_id) {
            Some(run) if run.status == JobStatus::Running => {
                run.status = status;
                run.end_time = Some(Utc::now());
                update(run);
                1
            }
            _ => 0,
        }
    }
}

#[async_trait]
impl JobTracker for InMemoryJobTracker {
    async fn start(&self, request: StartJob) -> Result<JobStarted> {
        let id = {
            let mut next = self.next_id.lock().unwrap_or_else(|p| p.into_inner());
            *next += 1;
            *next
        };
        let run = JobRun {
            id,
            job_id: request.job_id,
            job_name: request.job_name,
            correlation_id: request.correlation_id,
            source: request.source,
            status: JobStatus::Running,
            start_time: Some(Utc::now()),
            end_time: None,
            result_data: None,
            error_message: None,
        };
        debug!("Started run {} for job {}", id, run.job_id);
        self.runs().insert(id, run);
        Ok(JobStarted {
            run_id: id,
            status: JobStatus::Running,
        })
    }

    async fn complete(&self, run_id: i64, documents: &[Document]) -> Result<u64> {
        Ok(self.finish(run_id, JobStatus::Completed, |run| {
            run.result_data = Some(documents.to_vec());
        }))
    }

    async fn fail(&self, run_id: i64, error_message: Option<&str>) -> Result<u64> {
        Ok(self.finish(run_id, JobStatus::Failed, |run| {
            run.error_message = error_message.map(str::to_string);
        }))
    }

    async fn job(&self, run_id: i64) -> Result<Option<JobRun>> {
        Ok(self.runs().get(&run_id).cloned())
    }
}
