use super::environment::SyncEnvironment;
use super::job::RunOutcome;
use super::process::{SyncLauncher, SyncProcess};
use crate::job_logs::{JobLogRegistry, ProgressSnapshot};
use crate::job_store::{Job, JobStatus, JobStore, LAST_RUN_FORMAT};
use chrono::Local;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

fn now_timestamp() -> String {
    Local::now().format(LAST_RUN_FORMAT).to_string()
}

/// Executes one job invocation end to end.
///
/// All results are side effects: status transitions in the job store and
/// lines/progress in the log registry. The returned [`RunOutcome`] is only
/// informational.
pub struct JobRunner {
    job_store: Arc<dyn JobStore>,
    log_registry: Arc<JobLogRegistry>,
    launcher: Arc<dyn SyncLauncher>,
}

impl JobRunner {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        log_registry: Arc<JobLogRegistry>,
        launcher: Arc<dyn SyncLauncher>,
    ) -> Self {
        Self {
            job_store,
            log_registry,
            launcher,
        }
    }

    pub async fn run(&self, job: &Job, cancel_token: CancellationToken) -> RunOutcome {
        info!("Starting job: {} ({})", job.name, job.id);
        let start_time = Instant::now();

        self.set_status(job, JobStatus::Running, None);
        self.log_registry.reset(&job.id);
        self.log_registry
            .set_progress(&job.id, ProgressSnapshot::started(now_timestamp()));

        let outcome = self.execute(job, &cancel_token).await;

        self.log_registry.update_progress(&job.id, |progress| {
            progress.finished_at = Some(now_timestamp());
        });
        info!(
            "Job {} ({}) finished after {:?}: {}",
            job.name,
            job.id,
            start_time.elapsed(),
            outcome.as_str()
        );
        outcome
    }

    async fn execute(&self, job: &Job, cancel_token: &CancellationToken) -> RunOutcome {
        let env = SyncEnvironment::for_job(job);

        if !self.launcher.entry_point_exists() {
            self.log(job, &format!("Error: {} not found", self.launcher.entry_point()));
            self.set_status(job, JobStatus::Error, None);
            return RunOutcome::EntryPointMissing;
        }

        let mut process = match self.launcher.spawn(&env).await {
            Ok(process) => process,
            Err(e) => {
                self.log(job, &format!("Error running job: {:#}", e));
                self.set_status(job, JobStatus::Error, None);
                return RunOutcome::LaunchFailed;
            }
        };

        loop {
            tokio::select! {
                line = process.next_line() => match line {
                    Some(line) => self.record_output(job, &line),
                    None => break,
                },
                _ = cancel_token.cancelled() => {
                    return self.cancel(job, &mut process).await;
                }
            }
        }

        let exit_code = tokio::select! {
            result = process.wait() => result,
            _ = cancel_token.cancelled() => {
                return self.cancel(job, &mut process).await;
            }
        };

        match exit_code {
            Ok(0) => {
                self.log(job, "Job completed successfully.");
                self.set_status(job, JobStatus::Idle, Some(&now_timestamp()));
                RunOutcome::Succeeded
            }
            Ok(code) => {
                self.log(job, &format!("Job failed with exit code {}", code));
                self.set_status(job, JobStatus::Error, Some(&now_timestamp()));
                RunOutcome::Failed(code)
            }
            Err(e) => {
                self.log(job, &format!("Error running job: {:#}", e));
                self.set_status(job, JobStatus::Error, None);
                RunOutcome::LaunchFailed
            }
        }
    }

    async fn cancel(&self, job: &Job, process: &mut Box<dyn SyncProcess>) -> RunOutcome {
        if let Err(e) = process.terminate().await {
            warn!("Failed to terminate job {} ({}): {:#}", job.name, job.id, e);
        }
        self.log(job, "Job cancelled");
        self.set_status(job, JobStatus::Error, Some(&now_timestamp()));
        RunOutcome::Cancelled
    }

    fn record_output(&self, job: &Job, line: &str) {
        self.log_registry.append(&job.id, line);
        self.log_registry
            .update_progress(&job.id, |progress| progress.observe_line(line));
    }

    /// A line produced by the runner itself, mirrored to the process log.
    fn log(&self, job: &Job, message: &str) {
        info!("[Job {}] {}", job.name, message);
        self.log_registry.append(&job.id, message);
    }

    fn set_status(&self, job: &Job, status: JobStatus, last_run: Option<&str>) {
        if let Err(e) = self.job_store.update_status(&job.id, status, last_run) {
            error!(
                "Failed to set status of job {} ({}) to {}: {}",
                job.name, job.id, status, e
            );
        }
    }
}
