use super::job::JobError;
use super::schedule::next_eligible_at;
use crate::job_store::{Job, JobStore, LAST_RUN_FORMAT};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Notify, RwLock};

/// Information about a job for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    #[serde(flatten)]
    pub job: Job,
    /// Whether a run is in flight in this process.
    pub is_running: bool,
    /// `"now"` for a job that never ran, `None` when last_run is unreadable.
    pub next_run_at: Option<String>,
}

impl JobInfo {
    fn new(job: Job, is_running: bool) -> Self {
        let next_run_at = match next_eligible_at(&job) {
            Ok(Some(at)) => Some(at.format(LAST_RUN_FORMAT).to_string()),
            Ok(None) => Some("now".to_string()),
            Err(_) => None,
        };
        JobInfo {
            job,
            is_running,
            next_run_at,
        }
    }
}

/// Command sent to the scheduler.
pub enum SchedulerCommand {
    TriggerJob {
        job_id: String,
        response: oneshot::Sender<Result<(), JobError>>,
    },
    CancelJob {
        job_id: String,
        response: oneshot::Sender<Result<(), JobError>>,
    },
}

/// Shared state between scheduler and handle.
#[derive(Default)]
pub struct SharedJobState {
    /// Ids of jobs with a run in flight.
    pub running_jobs: HashSet<String>,
}

/// Handle to interact with the job scheduler from HTTP handlers.
#[derive(Clone)]
pub struct SchedulerHandle {
    /// Channel to send commands to the scheduler
    command_tx: mpsc::Sender<SchedulerCommand>,
    /// Shared state for reading which jobs are running
    shared_state: Arc<RwLock<SharedJobState>>,
    /// Signalled every time a run ends and its id left `running_jobs`
    run_finished: Arc<Notify>,
    job_store: Arc<dyn JobStore>,
}

impl SchedulerHandle {
    pub fn new(
        command_tx: mpsc::Sender<SchedulerCommand>,
        shared_state: Arc<RwLock<SharedJobState>>,
        run_finished: Arc<Notify>,
        job_store: Arc<dyn JobStore>,
    ) -> Self {
        Self {
            command_tx,
            shared_state,
            run_finished,
            job_store,
        }
    }

    /// Get information about all jobs, in snapshot order.
    pub async fn list_jobs(&self) -> Vec<JobInfo> {
        let jobs = self.job_store.load();
        let state = self.shared_state.read().await;
        jobs.into_iter()
            .map(|job| {
                let is_running = state.running_jobs.contains(&job.id);
                JobInfo::new(job, is_running)
            })
            .collect()
    }

    pub async fn get_job(&self, job_id: &str) -> Option<JobInfo> {
        let job = self.job_store.get_job(job_id)?;
        let is_running = self.is_job_running(job_id).await;
        Some(JobInfo::new(job, is_running))
    }

    /// Start a run now, regardless of the job's schedule.
    pub async fn trigger_job(&self, job_id: &str) -> Result<(), JobError> {
        self.send(|response| SchedulerCommand::TriggerJob {
            job_id: job_id.to_string(),
            response,
        })
        .await
    }

    /// Terminate the in-flight run of a job.
    pub async fn cancel_job(&self, job_id: &str) -> Result<(), JobError> {
        self.send(|response| SchedulerCommand::CancelJob {
            job_id: job_id.to_string(),
            response,
        })
        .await
    }

    async fn send(
        &self,
        make_command: impl FnOnce(oneshot::Sender<Result<(), JobError>>) -> SchedulerCommand,
    ) -> Result<(), JobError> {
        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(make_command(response_tx))
            .await
            .map_err(|_| JobError::ExecutionFailed("Scheduler not available".to_string()))?;

        response_rx
            .await
            .map_err(|_| JobError::ExecutionFailed("Scheduler did not respond".to_string()))?
    }

    /// Wait until the job has no run in flight, at most `timeout`.
    ///
    /// Returns false if a run was still going when the timeout expired.
    pub async fn wait_until_stopped(&self, job_id: &str, timeout: Duration) -> bool {
        let wait = async {
            loop {
                // Registered before the check so a run ending in between still wakes us.
                let finished = self.run_finished.notified();
                if !self.is_job_running(job_id).await {
                    return;
                }
                finished.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }

    /// Check if a job is currently running.
    pub async fn is_job_running(&self, job_id: &str) -> bool {
        let state = self.shared_state.read().await;
        state.running_jobs.contains(job_id)
    }

    pub async fn running_jobs(&self) -> Vec<String> {
        let state = self.shared_state.read().await;
        let mut ids: Vec<String> = state.running_jobs.iter().cloned().collect();
        ids.sort();
        ids
    }
}
