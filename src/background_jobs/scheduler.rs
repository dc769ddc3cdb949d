use super::handle::{SchedulerCommand, SchedulerHandle, SharedJobState};
use super::job::{JobError, TriggerSource};
use super::runner::JobRunner;
use super::schedule::is_due;
use crate::job_store::{Job, JobStatus, JobStore};
use chrono::Local;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// How long shutdown waits for each cancelled run to wind down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Polls the job store and dispatches due jobs to the runner.
///
/// Every run, scheduled or manual, goes through [`JobScheduler::spawn_job`],
/// so at most one run per job id is in flight at any time.
pub struct JobScheduler {
    /// Shared state accessible by SchedulerHandle
    shared_state: Arc<RwLock<SharedJobState>>,

    /// Woken whenever a run ends, see `SchedulerHandle::wait_until_stopped`.
    run_finished: Arc<Notify>,

    /// Currently running jobs with their task handles (not shared, managed by scheduler loop)
    running_handles: HashMap<String, JoinHandle<()>>,

    /// Cancellation tokens for each running job.
    job_cancel_tokens: HashMap<String, CancellationToken>,

    job_store: Arc<dyn JobStore>,

    runner: Arc<JobRunner>,

    /// Receiver for commands from SchedulerHandle
    command_receiver: mpsc::Receiver<SchedulerCommand>,

    /// Token to signal scheduler shutdown.
    shutdown_token: CancellationToken,

    poll_interval: Duration,
}

impl JobScheduler {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        runner: Arc<JobRunner>,
        command_receiver: mpsc::Receiver<SchedulerCommand>,
        shutdown_token: CancellationToken,
        shared_state: Arc<RwLock<SharedJobState>>,
        run_finished: Arc<Notify>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            shared_state,
            run_finished,
            running_handles: HashMap::new(),
            job_cancel_tokens: HashMap::new(),
            job_store,
            runner,
            command_receiver,
            shutdown_token,
            poll_interval,
        }
    }

    /// Main scheduler loop. The first poll happens immediately.
    pub async fn run(&mut self) {
        info!(
            "Starting job scheduler, polling every {:?}",
            self.poll_interval
        );

        // On startup: no run survives a restart
        match self.job_store.mark_stale_running() {
            Ok(count) if count > 0 => {
                info!("Marked {} stale running jobs as errored", count);
            }
            Ok(_) => {}
            Err(e) => {
                error!("Failed to mark stale jobs: {}", e);
            }
        }

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // Clean up completed job handles
            self.cleanup_completed_jobs().await;

            tokio::select! {
                _ = ticker.tick() => {
                    self.run_due_jobs().await;
                }
                Some(cmd) = self.command_receiver.recv() => {
                    self.handle_command(cmd).await;
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    self.shutdown().await;
                    break;
                }
            }
        }

        info!("Job scheduler stopped");
    }

    /// Handle a command from the SchedulerHandle.
    async fn handle_command(&mut self, cmd: SchedulerCommand) {
        match cmd {
            SchedulerCommand::TriggerJob { job_id, response } => {
                let result = self.trigger_job(&job_id).await;
                let _ = response.send(result);
            }
            SchedulerCommand::CancelJob { job_id, response } => {
                let result = self.cancel_job(&job_id).await;
                let _ = response.send(result);
            }
        }
    }

    /// Manually trigger a job by ID, ignoring its schedule.
    async fn trigger_job(&mut self, job_id: &str) -> Result<(), JobError> {
        let job = self.job_store.get_job(job_id).ok_or(JobError::NotFound)?;
        self.spawn_job(job, TriggerSource::Manual).await
    }

    async fn cancel_job(&mut self, job_id: &str) -> Result<(), JobError> {
        if !self.shared_state.read().await.running_jobs.contains(job_id) {
            return Err(JobError::NotRunning);
        }
        match self.job_cancel_tokens.get(job_id) {
            Some(token) => {
                info!("Cancelling job {}", job_id);
                token.cancel();
                Ok(())
            }
            None => Err(JobError::NotRunning),
        }
    }

    /// One polling pass over the whole snapshot.
    async fn run_due_jobs(&mut self) {
        let jobs = self.job_store.load();
        let now = Local::now().naive_local();
        debug!("Checking {} jobs for due runs", jobs.len());

        for job in jobs {
            if self.shared_state.read().await.running_jobs.contains(&job.id) {
                continue; // Skip already running jobs
            }

            match is_due(&job, now) {
                Ok(true) => {
                    if let Err(e) = self.spawn_job(job, TriggerSource::Schedule).await {
                        debug!("Skipped scheduled run: {}", e);
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    warn!("Skipping job this cycle: {}", e);
                }
            }
        }
    }

    /// Claim the job id and start a run in its own task.
    async fn spawn_job(&mut self, job: Job, triggered_by: TriggerSource) -> Result<(), JobError> {
        {
            let mut state = self.shared_state.write().await;
            if !state.running_jobs.insert(job.id.clone()) {
                return Err(JobError::AlreadyRunning);
            }
        }

        info!(
            "Dispatching job {} ({}), triggered by {}",
            job.name, job.id, triggered_by
        );

        let job_id = job.id.clone();
        let cancel_token = self.shutdown_token.child_token();
        self.job_cancel_tokens
            .insert(job_id.clone(), cancel_token.clone());

        let runner = Arc::clone(&self.runner);
        let shared_state = Arc::clone(&self.shared_state);
        let run_finished = Arc::clone(&self.run_finished);
        let handle = tokio::spawn(async move {
            let outcome = runner.run(&job, cancel_token).await;
            debug!("Run of job {} ended: {}", job.id, outcome.as_str());

            shared_state.write().await.running_jobs.remove(&job.id);
            run_finished.notify_waiters();
        });

        self.running_handles.insert(job_id, handle);
        Ok(())
    }

    /// Clean up handles for completed jobs.
    async fn cleanup_completed_jobs(&mut self) {
        let mut completed = Vec::new();

        for (job_id, handle) in &self.running_handles {
            if handle.is_finished() {
                completed.push(job_id.clone());
            }
        }

        for job_id in completed {
            if let Some(handle) = self.running_handles.remove(&job_id) {
                if let Err(e) = handle.await {
                    self.recover_from_failed_task(&job_id, e).await;
                }
            }
            self.job_cancel_tokens.remove(&job_id);
        }
    }

    /// A run task that panicked never cleared its own state.
    async fn recover_from_failed_task(&self, job_id: &str, e: tokio::task::JoinError) {
        error!("Run task of job {} failed: {}", job_id, e);
        self.shared_state.write().await.running_jobs.remove(job_id);
        self.run_finished.notify_waiters();
        if let Err(e) = self
            .job_store
            .update_status(job_id, JobStatus::Error, None)
        {
            error!("Failed to mark job {} as errored: {}", job_id, e);
        }
    }

    /// Cancel every in-flight run and wait for it to finish.
    async fn shutdown(&mut self) {
        info!("Shutting down scheduler...");

        for (job_id, token) in &self.job_cancel_tokens {
            debug!("Cancelling job: {}", job_id);
            token.cancel();
        }

        for (job_id, handle) in self.running_handles.drain() {
            if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
                warn!("Job {} did not stop within {:?}", job_id, SHUTDOWN_GRACE);
            }
        }

        self.job_cancel_tokens.clear();
        info!("Scheduler shutdown complete");
    }
}

/// Create a scheduler and its handle.
pub fn create_scheduler(
    job_store: Arc<dyn JobStore>,
    runner: Arc<JobRunner>,
    shutdown_token: CancellationToken,
    poll_interval: Duration,
) -> (JobScheduler, SchedulerHandle) {
    let (command_tx, command_rx) = mpsc::channel(100);
    let shared_state = Arc::new(RwLock::new(SharedJobState::default()));
    let run_finished = Arc::new(Notify::new());

    let scheduler = JobScheduler::new(
        job_store.clone(),
        runner,
        command_rx,
        shutdown_token,
        Arc::clone(&shared_state),
        Arc::clone(&run_finished),
        poll_interval,
    );

    let handle = SchedulerHandle::new(command_tx, shared_state, run_finished, job_store);

    (scheduler, handle)
}
