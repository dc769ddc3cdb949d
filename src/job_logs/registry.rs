use super::ProgressSnapshot;
use chrono::Local;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;

const LIVE_CHANNEL_CAPACITY: usize = 1024;

/// A log line as published to live subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEvent {
    pub job_id: String,
    pub line: String,
}

/// In-memory log buffers and progress snapshots, keyed by job id.
///
/// Created once at startup and shared by reference with every runner and the
/// HTTP layer. Nothing here is persisted; buffers grow until the job's next
/// run resets them or the process exits.
pub struct JobLogRegistry {
    logs: Mutex<HashMap<String, Vec<String>>>,
    progress: Mutex<HashMap<String, ProgressSnapshot>>,
    live_tx: broadcast::Sender<LogEvent>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Default for JobLogRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobLogRegistry {
    pub fn new() -> Self {
        let (live_tx, _) = broadcast::channel(LIVE_CHANNEL_CAPACITY);
        Self {
            logs: Mutex::new(HashMap::new()),
            progress: Mutex::new(HashMap::new()),
            live_tx,
        }
    }

    /// Clear the log buffer of a job. Called once at the start of every run.
    pub fn reset(&self, job_id: &str) {
        lock(&self.logs).insert(job_id.to_string(), Vec::new());
    }

    /// Append one line, prefixed with the current local time.
    pub fn append(&self, job_id: &str, line: &str) {
        let line = format!("[{}] {}", Local::now().format("%H:%M:%S"), line.trim_end());

        let mut logs = lock(&self.logs);
        logs.entry(job_id.to_string())
            .or_default()
            .push(line.clone());

        // Published under the buffer lock, see `subscribe_with_backlog`.
        let _ = self.live_tx.send(LogEvent {
            job_id: job_id.to_string(),
            line,
        });
    }

    /// Copy of the current buffer, empty for an unknown job.
    pub fn get_logs(&self, job_id: &str) -> Vec<String> {
        lock(&self.logs).get(job_id).cloned().unwrap_or_default()
    }

    /// Receive every line appended from now on, for all jobs.
    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.live_tx.subscribe()
    }

    /// Current buffer of a job plus a receiver for every line appended after it.
    pub fn subscribe_with_backlog(
        &self,
        job_id: &str,
    ) -> (Vec<String>, broadcast::Receiver<LogEvent>) {
        let logs = lock(&self.logs);
        let backlog = logs.get(job_id).cloned().unwrap_or_default();
        (backlog, self.live_tx.subscribe())
    }

    pub fn set_progress(&self, job_id: &str, snapshot: ProgressSnapshot) {
        lock(&self.progress).insert(job_id.to_string(), snapshot);
    }

    /// Mutate the existing snapshot in place; does nothing when there is none.
    pub fn update_progress(&self, job_id: &str, update: impl FnOnce(&mut ProgressSnapshot)) {
        if let Some(snapshot) = lock(&self.progress).get_mut(job_id) {
            update(snapshot);
        }
    }

    pub fn get_progress(&self, job_id: &str) -> Option<ProgressSnapshot> {
        lock(&self.progress).get(job_id).cloned()
    }

    pub fn clear_progress(&self, job_id: &str) {
        lock(&self.progress).remove(job_id);
    }

    /// Forget everything about a job, e.g. after it was deleted.
    pub fn remove(&self, job_id: &str) {
        lock(&self.logs).remove(job_id);
        self.clear_progress(job_id);
    }
}
