use super::{Job, JobStatus, JobStore, JobStoreError, NewJob, NEVER_RUN};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

pub const SNAPSHOT_FILE_NAME: &str = "jobs.json";

/// Contents of the snapshot file.
///
/// Records that are valid JSON but not a valid job stay in `unreadable`,
/// verbatim, so rewriting the snapshot never drops them.
#[derive(Debug, Default)]
struct Snapshot {
    jobs: Vec<Job>,
    unreadable: Vec<JsonValue>,
}

impl Snapshot {
    fn from_records(records: Vec<JsonValue>, source: &Path) -> Self {
        let mut snapshot = Snapshot::default();
        for (index, record) in records.into_iter().enumerate() {
            match serde_json::from_value::<Job>(record.clone()) {
                Ok(job) => snapshot.jobs.push(job),
                Err(e) => {
                    warn!(
                        "Ignoring job record {} ({:?}) in {:?}: {}",
                        index,
                        record_id(&record),
                        source,
                        e
                    );
                    snapshot.unreadable.push(record);
                }
            }
        }
        snapshot
    }

    fn contains_id(&self, id: &str) -> bool {
        self.jobs.iter().any(|j| j.id == id)
            || self.unreadable.iter().any(|r| record_id(r) == Some(id))
    }
}

fn record_id(record: &JsonValue) -> Option<&str> {
    record.get("id").and_then(JsonValue::as_str)
}

/// JSON file backed [`JobStore`].
///
/// Writes go to `jobs.json.tmp`, are fsynced, then renamed over `jobs.json`,
/// so readers only ever observe a complete snapshot. The previous snapshot is
/// copied to `jobs.json.bak` before each write and used to recover from a
/// snapshot that is not a JSON array. A single record that does not fit the
/// job schema is skipped on its own.
pub struct FileJobStore {
    snapshot_path: PathBuf,
    backup_path: PathBuf,
    temp_path: PathBuf,
    lock: Mutex<()>,
}

impl FileJobStore {
    /// Create a store persisting to `jobs.json` inside `data_dir`.
    pub fn new(data_dir: &Path) -> Self {
        Self::with_snapshot_path(data_dir.join(SNAPSHOT_FILE_NAME))
    }

    pub fn with_snapshot_path(snapshot_path: PathBuf) -> Self {
        let backup_path = sibling_with_suffix(&snapshot_path, ".bak");
        let temp_path = sibling_with_suffix(&snapshot_path, ".tmp");
        Self {
            snapshot_path,
            backup_path,
            temp_path,
            lock: Mutex::new(()),
        }
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        // The guarded data is the file itself, a panic mid-write leaves nothing
        // in memory to repair.
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Read the snapshot. Caller must hold the lock.
    ///
    /// Only I/O errors other than "not found" are returned; text that is not a
    /// JSON array is handled by falling back to the backup.
    fn read_snapshot(&self) -> Result<Snapshot, JobStoreError> {
        let content = match fs::read_to_string(&self.snapshot_path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Snapshot::default()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<Vec<JsonValue>>(&content) {
            Ok(records) => Ok(Snapshot::from_records(records, &self.snapshot_path)),
            Err(e) => {
                error!(
                    "Error decoding {:?}: {}. Attempting to restore backup.",
                    self.snapshot_path, e
                );
                Ok(self.restore_backup())
            }
        }
    }

    /// Caller must hold the lock.
    fn restore_backup(&self) -> Snapshot {
        let content = match fs::read_to_string(&self.backup_path) {
            Ok(content) => content,
            Err(e) => {
                error!("No usable backup at {:?}: {}", self.backup_path, e);
                return Snapshot::default();
            }
        };

        match serde_json::from_str::<Vec<JsonValue>>(&content) {
            Ok(records) => {
                let snapshot = Snapshot::from_records(records, &self.backup_path);
                if let Err(e) = fs::copy(&self.backup_path, &self.snapshot_path) {
                    warn!("Failed to copy backup over corrupt snapshot: {}", e);
                } else {
                    info!(
                        "Restored {} jobs from backup {:?}",
                        snapshot.jobs.len(),
                        self.backup_path
                    );
                }
                snapshot
            }
            Err(e) => {
                error!("Backup {:?} is also unreadable: {}", self.backup_path, e);
                Snapshot::default()
            }
        }
    }

    /// Write `records` to the temporary path and flush it to stable storage.
    fn write_temp<T: Serialize>(&self, records: &[T]) -> Result<(), JobStoreError> {
        let json = serde_json::to_string_pretty(records)?;
        let mut file = File::create(&self.temp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    fn commit_temp(&self) -> Result<(), JobStoreError> {
        fs::rename(&self.temp_path, &self.snapshot_path)?;
        Ok(())
    }

    /// Back up, then atomically replace the snapshot. Caller must hold the lock.
    ///
    /// `unreadable` records are written back after the jobs, unchanged.
    fn write_snapshot(&self, jobs: &[Job], unreadable: &[JsonValue]) -> Result<(), JobStoreError> {
        let mut records = jobs
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        records.extend(unreadable.iter().cloned());

        if self.snapshot_path.exists() {
            if let Err(e) = fs::copy(&self.snapshot_path, &self.backup_path) {
                warn!("Failed to create backup {:?}: {}", self.backup_path, e);
            }
        }

        let result = self.write_temp(&records).and_then(|_| self.commit_temp());
        if let Err(e) = &result {
            error!("Error saving jobs to {:?}: {}", self.snapshot_path, e);
            match fs::remove_file(&self.temp_path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {:?}: {}", self.temp_path, e),
            }
        }
        result
    }
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

impl JobStore for FileJobStore {
    fn load(&self) -> Vec<Job> {
        let _guard = self.guard();
        match self.read_snapshot() {
            Ok(snapshot) => snapshot.jobs,
            Err(e) => {
                error!("Error loading jobs from {:?}: {}", self.snapshot_path, e);
                Vec::new()
            }
        }
    }

    fn save(&self, jobs: &[Job]) -> Result<(), JobStoreError> {
        let _guard = self.guard();
        self.write_snapshot(jobs, &[])
    }

    fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        last_run: Option<&str>,
    ) -> Result<(), JobStoreError> {
        let _guard = self.guard();
        let mut snapshot = self.read_snapshot()?;

        let Some(job) = snapshot.jobs.iter_mut().find(|j| j.id == job_id) else {
            debug!("Status update for unknown job {} ignored", job_id);
            return Ok(());
        };
        job.status = status;
        if let Some(last_run) = last_run {
            job.last_run = last_run.to_string();
        }

        self.write_snapshot(&snapshot.jobs, &snapshot.unreadable)
    }

    fn get_job(&self, job_id: &str) -> Option<Job> {
        self.load().into_iter().find(|j| j.id == job_id)
    }

    fn create_job(&self, new_job: NewJob) -> Result<Job, JobStoreError> {
        new_job.validate().map_err(JobStoreError::InvalidJob)?;

        let _guard = self.guard();
        let mut snapshot = self.read_snapshot()?;

        let id = new_job
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        if snapshot.contains_id(&id) {
            return Err(JobStoreError::DuplicateId(id));
        }

        let job = Job {
            id,
            name: new_job.name,
            job_type: new_job.job_type,
            interval_minutes: new_job.interval_minutes,
            config: new_job.config,
            last_run: NEVER_RUN.to_string(),
            status: JobStatus::Idle,
        };
        snapshot.jobs.push(job.clone());
        self.write_snapshot(&snapshot.jobs, &snapshot.unreadable)?;

        info!("Created job {} ({})", job.id, job.name);
        Ok(job)
    }

    fn update_job(&self, job_id: &str, new_job: NewJob) -> Result<Job, JobStoreError> {
        new_job.validate().map_err(JobStoreError::InvalidJob)?;

        let _guard = self.guard();
        let mut snapshot = self.read_snapshot()?;

        let job = snapshot
            .jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or_else(|| JobStoreError::NotFound(job_id.to_string()))?;
        job.name = new_job.name;
        job.job_type = new_job.job_type;
        job.interval_minutes = new_job.interval_minutes;
        job.config = new_job.config;
        let updated = job.clone();

        self.write_snapshot(&snapshot.jobs, &snapshot.unreadable)?;
        Ok(updated)
    }

    fn delete_job(&self, job_id: &str) -> Result<bool, JobStoreError> {
        let _guard = self.guard();
        let mut snapshot = self.read_snapshot()?;

        // Unreadable records can be deleted by id too.
        let before = snapshot.jobs.len() + snapshot.unreadable.len();
        snapshot.jobs.retain(|j| j.id != job_id);
        snapshot.unreadable.retain(|r| record_id(r) != Some(job_id));
        if snapshot.jobs.len() + snapshot.unreadable.len() == before {
            return Ok(false);
        }

        self.write_snapshot(&snapshot.jobs, &snapshot.unreadable)?;
        info!("Deleted job {}", job_id);
        Ok(true)
    }

    fn mark_stale_running(&self) -> Result<usize, JobStoreError> {
        let _guard = self.guard();
        let mut snapshot = self.read_snapshot()?;

        let mut count = 0;
        for job in snapshot
            .jobs
            .iter_mut()
            .filter(|j| j.status == JobStatus::Running)
        {
            job.status = JobStatus::Error;
            count += 1;
        }

        if count > 0 {
            self.write_snapshot(&snapshot.jobs, &snapshot.unreadable)?;
        }
        Ok(count)
    }
}
