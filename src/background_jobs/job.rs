/// Errors returned to callers that ask the scheduler to act on a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    NotFound,
    AlreadyRunning,
    NotRunning,
    ExecutionFailed(String),
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobError::NotFound => write!(f, "Job not found"),
            JobError::AlreadyRunning => write!(f, "Job is already running"),
            JobError::NotRunning => write!(f, "Job is not running"),
            JobError::ExecutionFailed(msg) => write!(f, "Execution failed: {}", msg),
        }
    }
}

impl std::error::Error for JobError {}

/// How a single run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The program exited with code 0.
    Succeeded,
    /// The program ran and exited with a nonzero code.
    Failed(i32),
    /// The entry point was missing; nothing was spawned.
    EntryPointMissing,
    /// The program could not be started or its output could not be read.
    LaunchFailed,
    /// The run was terminated on request.
    Cancelled,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Succeeded => "succeeded",
            RunOutcome::Failed(_) => "failed",
            RunOutcome::EntryPointMissing => "entry_point_missing",
            RunOutcome::LaunchFailed => "launch_failed",
            RunOutcome::Cancelled => "cancelled",
        }
    }
}

/// Who asked for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Schedule,
    Manual,
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerSource::Schedule => write!(f, "schedule"),
            TriggerSource::Manual => write!(f, "manual"),
        }
    }
}
