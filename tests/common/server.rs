//! Test server lifecycle management
//!
//! This module manages spawning and shutting down test HTTP servers.
//! Each test gets an isolated server with its own data and sync directories.

use super::constants::*;
use super::fixtures::create_sync_dir;
use std::sync::Arc;
use std::time::Duration;
use syncarr_server::arr_client::ArrClient;
use syncarr_server::background_jobs::{create_scheduler, CommandLauncher, JobRunner};
use syncarr_server::job_logs::JobLogRegistry;
use syncarr_server::job_store::FileJobStore;
use syncarr_server::server::{make_app, RequestsLoggingLevel, ServerConfig};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Test server instance with isolated job store and sync program
///
/// When dropped, the server and its scheduler shut down and temp resources are cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// Job store for direct access in tests
    pub job_store: Arc<FileJobStore>,

    // Private fields - keep resources alive until drop
    _temp_data_dir: TempDir,
    _temp_sync_dir: TempDir,
    shutdown_token: CancellationToken,
}

impl TestServer {
    /// Spawns a server whose sync program is `script` run by `sh`.
    ///
    /// With `None` the sync directory has no entry point. The scheduler
    /// polls once at startup and then only every hour, so runs happen only
    /// when a test triggers them.
    pub async fn spawn(script: Option<&str>) -> Self {
        Self::spawn_with_poll_interval(script, Duration::from_secs(3600)).await
    }

    pub async fn spawn_with_poll_interval(script: Option<&str>, poll_interval: Duration) -> Self {
        let temp_data_dir = TempDir::new().expect("Failed to create data dir");
        let (temp_sync_dir, sync_path) =
            create_sync_dir(script).expect("Failed to create sync dir");

        let job_store = Arc::new(FileJobStore::new(temp_data_dir.path()));
        let log_registry = Arc::new(JobLogRegistry::new());
        let launcher = Arc::new(CommandLauncher::new(
            sync_path,
            TEST_INTERPRETER,
            ENTRY_POINT,
        ));
        let runner = Arc::new(JobRunner::new(
            job_store.clone(),
            log_registry.clone(),
            launcher,
        ));

        let shutdown_token = CancellationToken::new();
        let (mut scheduler, scheduler_handle) = create_scheduler(
            job_store.clone(),
            runner,
            shutdown_token.clone(),
            poll_interval,
        );
        tokio::spawn(async move { scheduler.run().await });

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");

        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let base_url = format!("http://127.0.0.1:{}", port);

        let config = ServerConfig {
            port,
            requests_logging_level: RequestsLoggingLevel::None,
            frontend_dir_path: None,
        };
        let app = make_app(
            config,
            job_store.clone(),
            log_registry,
            scheduler_handle,
            Arc::new(ArrClient::new(2).expect("Failed to build arr client")),
        );

        // Spawn server in background task with graceful shutdown
        let server_shutdown = shutdown_token.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            job_store,
            _temp_data_dir: temp_data_dir,
            _temp_sync_dir: temp_sync_dir,
            shutdown_token,
        };

        server.wait_for_ready().await;

        server
    }

    /// Directory holding jobs.json
    pub fn data_dir(&self) -> &std::path::Path {
        self._temp_data_dir.path()
    }

    /// Waits for the server to become ready by polling the /api/status endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client
                .get(format!("{}/api/status", self.base_url))
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        // Stops the HTTP server and the scheduler, which kills running scripts
        self.shutdown_token.cancel();
        // TempDirs will be cleaned up automatically
    }
}
