mod file_config;

pub use file_config::{FileConfig, SyncConfig};

use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_SYNC_DIR_NAME: &str = "syncarr_source";
pub const DEFAULT_ENTRY_POINT: &str = "index.py";
pub const DEFAULT_INTERPRETER: &str = "python";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub data_dir: Option<PathBuf>,
    pub sync_dir: Option<PathBuf>,
    pub entry_point: Option<String>,
    pub interpreter: Option<String>,
    pub port: u16,
    pub poll_interval_secs: u64,
    pub http_timeout_sec: u64,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub data_dir: PathBuf,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,
    pub http_timeout_sec: u64,

    pub sync: SyncSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    /// Working directory of the sync program.
    pub sync_dir: PathBuf,
    /// Script run inside `sync_dir`.
    pub entry_point: String,
    pub interpreter: String,
    pub poll_interval_secs: u64,
}

impl SyncSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        // TOML overrides CLI for each field
        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .or_else(|| cli.data_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("data_dir must be specified via --data-dir or in config file")
            })?;

        if !data_dir.exists() {
            bail!("Data directory does not exist: {:?}", data_dir);
        }
        if !data_dir.is_dir() {
            bail!("data_dir is not a directory: {:?}", data_dir);
        }

        let port = file.port.unwrap_or(cli.port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let frontend_dir_path = file
            .frontend_dir_path
            .or_else(|| cli.frontend_dir_path.clone());

        let http_timeout_sec = file.http_timeout_sec.unwrap_or(cli.http_timeout_sec);
        if http_timeout_sec == 0 {
            bail!("http_timeout_sec must be at least 1");
        }

        // Sync settings - [sync] section over CLI, then defaults
        let sync_file = file.sync.unwrap_or_default();
        let sync_dir = sync_file
            .sync_dir
            .map(PathBuf::from)
            .or_else(|| cli.sync_dir.clone())
            .unwrap_or_else(|| data_dir.join(DEFAULT_SYNC_DIR_NAME));
        let entry_point = sync_file
            .entry_point
            .or_else(|| cli.entry_point.clone())
            .unwrap_or_else(|| DEFAULT_ENTRY_POINT.to_string());
        let interpreter = sync_file
            .interpreter
            .or_else(|| cli.interpreter.clone())
            .unwrap_or_else(|| DEFAULT_INTERPRETER.to_string());
        let poll_interval_secs = sync_file
            .poll_interval_secs
            .unwrap_or(cli.poll_interval_secs);
        if poll_interval_secs == 0 {
            bail!("poll_interval_secs must be at least 1");
        }

        // A missing sync dir is not fatal: runs log the missing entry point.
        if !sync_dir.is_dir() {
            warn!("Sync directory does not exist: {:?}", sync_dir);
        }

        Ok(Self {
            data_dir,
            port,
            logging_level,
            frontend_dir_path,
            http_timeout_sec,
            sync: SyncSettings {
                sync_dir,
                entry_point,
                interpreter,
                poll_interval_secs,
            },
        })
    }

    pub fn jobs_file_path(&self) -> PathBuf {
        self.data_dir.join(crate::job_store::SNAPSHOT_FILE_NAME)
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
