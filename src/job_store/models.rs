use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Persisted value of `last_run` for a job that has never been run.
pub const NEVER_RUN: &str = "Never";

/// Format of `last_run` timestamps (local wall-clock time).
pub const LAST_RUN_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const DEFAULT_INTERVAL_MINUTES: u32 = 60;

fn default_interval_minutes() -> u32 {
    DEFAULT_INTERVAL_MINUTES
}

fn default_last_run() -> String {
    NEVER_RUN.to_string()
}

/// `null` is how older snapshots recorded a job that never ran.
fn deserialize_last_run<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_last_run))
}

/// Which *arr application a job synchronizes.
///
/// Selects the prefix of the environment variables handed to the sync program
/// and the REST API version used when talking to the instances directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Radarr,
    Sonarr,
    Lidarr,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Radarr => "radarr",
            JobType::Sonarr => "sonarr",
            JobType::Lidarr => "lidarr",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "radarr" => Some(JobType::Radarr),
            "sonarr" => Some(JobType::Sonarr),
            "lidarr" => Some(JobType::Lidarr),
            _ => None,
        }
    }

    /// Prefix used for the per-instance environment variables, e.g. `RADARR`.
    pub fn env_prefix(&self) -> &'static str {
        match self {
            JobType::Radarr => "RADARR",
            JobType::Sonarr => "SONARR",
            JobType::Lidarr => "LIDARR",
        }
    }

    /// REST API version segment exposed by this application.
    pub fn api_version(&self) -> &'static str {
        match self {
            JobType::Lidarr => "v1",
            JobType::Radarr | JobType::Sonarr => "v3",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Current state of a job as seen by the scheduler and the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JobStatus {
    #[default]
    Idle,
    Running,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Idle => "Idle",
            JobStatus::Running => "Running",
            JobStatus::Error => "Error",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A configured, recurring synchronization job.
///
/// `last_run` is kept as the raw persisted text: either [`NEVER_RUN`] or a
/// timestamp in [`LAST_RUN_FORMAT`]. A malformed value must not make the whole
/// snapshot unreadable, so it is only interpreted on demand via [`Job::last_run_at`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u32,
    #[serde(default)]
    pub config: Map<String, JsonValue>,
    #[serde(
        default = "default_last_run",
        deserialize_with = "deserialize_last_run"
    )]
    pub last_run: String,
    #[serde(default)]
    pub status: JobStatus,
}

impl Job {
    pub fn has_never_run(&self) -> bool {
        let trimmed = self.last_run.trim();
        trimmed.is_empty() || trimmed == NEVER_RUN
    }

    /// Parse `last_run`.
    ///
    /// Returns `Ok(None)` for a job that never ran and an error for a value that
    /// is neither the sentinel nor a valid timestamp.
    pub fn last_run_at(&self) -> Result<Option<NaiveDateTime>, chrono::ParseError> {
        if self.has_never_run() {
            return Ok(None);
        }
        NaiveDateTime::parse_from_str(self.last_run.trim(), LAST_RUN_FORMAT).map(Some)
    }

    /// Read a string config value, empty when absent or not a string.
    pub fn config_str(&self, key: &str) -> &str {
        self.config
            .get(key)
            .and_then(JsonValue::as_str)
            .unwrap_or("")
    }

    /// Read a boolean-ish config value.
    pub fn config_flag(&self, key: &str) -> bool {
        match self.config.get(key) {
            Some(JsonValue::Bool(b)) => *b,
            Some(JsonValue::Number(n)) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
            Some(JsonValue::String(s)) => matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            ),
            _ => false,
        }
    }
}

/// Payload for creating or replacing a job's user-editable fields.
#[derive(Debug, Clone, Deserialize)]
pub struct NewJob {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u32,
    #[serde(default)]
    pub config: Map<String, JsonValue>,
}

impl NewJob {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        if self.interval_minutes < 1 {
            return Err("interval_minutes must be at least 1".to_string());
        }
        if let Some(id) = &self.id {
            if id.trim().is_empty() {
                return Err("id must not be blank".to_string());
            }
        }
        Ok(())
    }
}
