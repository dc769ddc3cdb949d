use crate::job_store::{Job, JobStatus};
use chrono::{Duration, NaiveDateTime};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("job {job_id} has malformed last_run {value:?}: {source}")]
    MalformedLastRun {
        job_id: String,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Earliest local time at which the job may run again, `None` for a job that never ran.
pub fn next_eligible_at(job: &Job) -> Result<Option<NaiveDateTime>, ScheduleError> {
    let last_run = job
        .last_run_at()
        .map_err(|source| ScheduleError::MalformedLastRun {
            job_id: job.id.clone(),
            value: job.last_run.clone(),
            source,
        })?;
    let interval = Duration::minutes(i64::from(job.interval_minutes.max(1)));
    Ok(last_run.map(|at| at + interval))
}

/// Whether the scheduler should dispatch `job` at local time `now`.
///
/// A running job is never due. A job that never ran is due immediately,
/// otherwise once `interval_minutes` have passed since its last run.
pub fn is_due(job: &Job, now: NaiveDateTime) -> Result<bool, ScheduleError> {
    if job.status == JobStatus::Running {
        return Ok(false);
    }
    match next_eligible_at(job)? {
        None => Ok(true),
        Some(next) => Ok(now >= next),
    }
}
