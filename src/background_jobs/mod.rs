//! Scheduling and execution of sync jobs.
//!
//! The [`JobScheduler`] polls the job store and hands due jobs to the
//! [`JobRunner`], which launches the external sync program and streams its
//! output into the log registry. HTTP handlers talk to the scheduler through
//! a [`SchedulerHandle`].

mod environment;
mod handle;
mod job;
mod process;
mod runner;
mod schedule;
mod scheduler;
#[cfg(test)]
mod testing;

pub use environment::{normalize_url, SyncEnvironment};
pub use handle::{JobInfo, SchedulerCommand, SchedulerHandle, SharedJobState};
pub use job::{JobError, RunOutcome, TriggerSource};
pub use process::{CommandLauncher, SyncLauncher, SyncProcess, SIGNALED_EXIT_CODE};
pub use runner::JobRunner;
pub use schedule::{is_due, next_eligible_at, ScheduleError};
pub use scheduler::{create_scheduler, JobScheduler, DEFAULT_POLL_INTERVAL};
