//! Durable storage of job definitions and their status.
//!
//! The whole job list is persisted as a single JSON snapshot which is
//! rewritten on every change. All reads and writes go through one lock so a
//! user edit and a runner's status transition can never lose each other's
//! updates.

mod file_job_store;
mod models;

pub use file_job_store::{FileJobStore, SNAPSHOT_FILE_NAME};
pub use models::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("A job with id {0} already exists")]
    DuplicateId(String),

    #[error("Invalid job: {0}")]
    InvalidJob(String),
}

pub trait JobStore: Send + Sync {
    /// Read the current snapshot.
    ///
    /// A missing snapshot is an empty list. A snapshot that is not valid JSON is
    /// restored from the backup when possible, otherwise it also reads as an
    /// empty list. Single records that are not valid jobs are left out.
    fn load(&self) -> Vec<Job>;

    /// Atomically replace the persisted snapshot with `jobs`.
    fn save(&self, jobs: &[Job]) -> Result<(), JobStoreError>;

    /// Change the status (and optionally `last_run`) of a single job.
    ///
    /// Unknown ids are ignored.
    fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        last_run: Option<&str>,
    ) -> Result<(), JobStoreError>;

    fn get_job(&self, job_id: &str) -> Option<Job>;

    /// Add a new job in the Idle state that has never run.
    fn create_job(&self, new_job: NewJob) -> Result<Job, JobStoreError>;

    /// Replace the user-editable fields of a job, keeping its status and last run.
    fn update_job(&self, job_id: &str, new_job: NewJob) -> Result<Job, JobStoreError>;

    /// Returns true if a job was removed.
    fn delete_job(&self, job_id: &str) -> Result<bool, JobStoreError>;

    /// Move jobs left in the Running state by a previous process to Error.
    fn mark_stale_running(&self) -> Result<usize, JobStoreError>;
}
