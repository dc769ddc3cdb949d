use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use std::{fmt::Debug, path::PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use syncarr_server::arr_client::{ArrClient, DEFAULT_TIMEOUT_SEC};
use syncarr_server::background_jobs::{
    create_scheduler, CommandLauncher, JobRunner, DEFAULT_POLL_INTERVAL,
};
use syncarr_server::config;
use syncarr_server::job_logs::JobLogRegistry;
use syncarr_server::job_store::{FileJobStore, JobStore};
use syncarr_server::server::{run_server, RequestsLoggingLevel, ServerConfig};

/// How long to wait for in-flight runs after the server stopped.
const SCHEDULER_STOP_TIMEOUT: Duration = Duration::from_secs(15);

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

fn parse_dir(s: &str) -> Result<PathBuf, String> {
    let path = parse_path(s)?;
    if !path.exists() {
        return Err(format!("Directory does not exist: {}", s));
    }
    if !path.is_dir() {
        return Err(format!("Path is not a directory: {}", s));
    }
    Ok(path)
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding jobs.json and its backup. Defaults to the current directory.
    #[clap(long, value_parser = parse_dir)]
    pub data_dir: Option<PathBuf>,

    /// Working directory of the sync program. Defaults to <data-dir>/syncarr_source.
    #[clap(long, value_parser = parse_path)]
    pub sync_dir: Option<PathBuf>,

    /// Script started for every run, relative to the sync directory.
    #[clap(long)]
    pub entry_point: Option<String>,

    /// Interpreter used to start the entry point.
    #[clap(long)]
    pub interpreter: Option<String>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 8000)]
    pub port: u16,

    /// Seconds between two checks for due jobs.
    #[clap(long, default_value_t = DEFAULT_POLL_INTERVAL.as_secs())]
    pub poll_interval_secs: u64,

    /// Timeout in seconds for requests to Radarr/Sonarr/Lidarr instances.
    #[clap(long, default_value_t = DEFAULT_TIMEOUT_SEC)]
    pub http_timeout_sec: u64,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Path to the frontend directory to be statically served.
    #[clap(long)]
    pub frontend_dir_path: Option<String>,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            data_dir: args
                .data_dir
                .clone()
                .or_else(|| std::env::current_dir().ok()),
            sync_dir: args.sync_dir.clone(),
            entry_point: args.entry_point.clone(),
            interpreter: args.interpreter.clone(),
            port: args.port,
            poll_interval_secs: args.poll_interval_secs,
            http_timeout_sec: args.http_timeout_sec,
            logging_level: args.logging_level.clone(),
            frontend_dir_path: args.frontend_dir_path.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  data_dir: {:?}", app_config.data_dir);
    info!("  jobs file: {:?}", app_config.jobs_file_path());
    info!("  sync_dir: {:?}", app_config.sync.sync_dir);
    info!(
        "  command: {} {}",
        app_config.sync.interpreter, app_config.sync.entry_point
    );
    info!("  poll interval: {}s", app_config.sync.poll_interval_secs);
    info!("  port: {}", app_config.port);
    info!("  logging_level: {}", app_config.logging_level);

    let job_store: Arc<dyn JobStore> = Arc::new(FileJobStore::new(&app_config.data_dir));
    info!("Loaded {} jobs", job_store.load().len());

    let log_registry = Arc::new(JobLogRegistry::new());
    let launcher = Arc::new(CommandLauncher::new(
        app_config.sync.sync_dir.clone(),
        app_config.sync.interpreter.clone(),
        app_config.sync.entry_point.clone(),
    ));
    let runner = Arc::new(JobRunner::new(
        job_store.clone(),
        log_registry.clone(),
        launcher,
    ));
    let arr_client = Arc::new(ArrClient::new(app_config.http_timeout_sec)?);

    // Set up job scheduler
    let shutdown_token = CancellationToken::new();
    let (mut scheduler, scheduler_handle) = create_scheduler(
        job_store.clone(),
        runner,
        shutdown_token.clone(),
        app_config.sync.poll_interval(),
    );
    let scheduler_task = tokio::spawn(async move { scheduler.run().await });

    {
        let shutdown_token = shutdown_token.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
                Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
            }
            shutdown_token.cancel();
        });
    }

    info!("Ready to serve at port {}!", app_config.port);
    let server_config = ServerConfig {
        requests_logging_level: app_config.logging_level.clone(),
        port: app_config.port,
        frontend_dir_path: app_config.frontend_dir_path.clone(),
    };
    let result = run_server(
        server_config,
        job_store,
        log_registry,
        scheduler_handle,
        arr_client,
        shutdown_token.clone(),
    )
    .await;
    info!("HTTP server stopped: {:?}", result);

    // Stop the scheduler, which terminates in-flight runs.
    shutdown_token.cancel();
    if tokio::time::timeout(SCHEDULER_STOP_TIMEOUT, scheduler_task)
        .await
        .is_err()
    {
        error!("Scheduler did not stop in time");
    }

    result
}
