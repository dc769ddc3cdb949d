use anyhow::{Context, Result};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tracing::{debug, error, info, warn};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{log_requests, log_stream::job_logs_ws, state::*, ServerConfig};
use crate::arr_client::{ArrClient, ArrClientError, ArrInstance, Side};
use crate::background_jobs::{JobError, SchedulerHandle};
use crate::job_logs::JobLogRegistry;
use crate::job_store::{JobStore, JobStoreError, JobType, NewJob};

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
    pub running_jobs: Vec<String>,
}

/// How long deleting a job waits for its in-flight run to be terminated.
const DELETE_STOP_TIMEOUT: Duration = Duration::from_secs(10);

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

/// Body of `POST /api/fetch-profiles` and `POST /api/fetch-rootfolders`.
#[derive(Deserialize, Debug)]
struct FetchOptionsBody {
    pub url: String,
    pub key: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    #[serde(default)]
    pub skip_ssl_verify: Option<bool>,
}

impl FetchOptionsBody {
    fn instance(&self) -> ArrInstance {
        ArrInstance::new(
            self.job_type,
            &self.url,
            &self.key,
            self.skip_ssl_verify.unwrap_or(false),
        )
    }
}

fn error_response(status: StatusCode, detail: impl Into<String>) -> Response {
    (status, Json(json!({ "detail": detail.into() }))).into_response()
}

fn job_not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "Job not found")
}

fn store_error_response(err: JobStoreError) -> Response {
    match err {
        JobStoreError::NotFound(_) => job_not_found(),
        JobStoreError::InvalidJob(msg) => error_response(StatusCode::BAD_REQUEST, msg),
        JobStoreError::DuplicateId(_) => error_response(StatusCode::CONFLICT, err.to_string()),
        JobStoreError::Io(_) | JobStoreError::Serialization(_) => {
            error!("Job store failure: {}", err);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save jobs")
        }
    }
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
        running_jobs: state.scheduler_handle.running_jobs().await,
    };
    Json(stats)
}

async fn list_jobs(State(scheduler): State<SchedulerHandle>) -> Response {
    Json(scheduler.list_jobs().await).into_response()
}

async fn get_job(
    State(scheduler): State<SchedulerHandle>,
    Path(id): Path<String>,
) -> Response {
    match scheduler.get_job(&id).await {
        Some(info) => Json(info).into_response(),
        None => job_not_found(),
    }
}

async fn create_job(
    State(job_store): State<GuardedJobStore>,
    Json(body): Json<NewJob>,
) -> Response {
    match job_store.create_job(body) {
        Ok(job) => {
            info!("Created job {} ({})", job.name, job.id);
            (StatusCode::CREATED, Json(job)).into_response()
        }
        Err(err) => store_error_response(err),
    }
}

async fn update_job(
    State(job_store): State<GuardedJobStore>,
    Path(id): Path<String>,
    Json(body): Json<NewJob>,
) -> Response {
    debug!("Updating job with id {}", id);
    match job_store.update_job(&id, body) {
        Ok(job) => Json(job).into_response(),
        Err(err) => store_error_response(err),
    }
}

async fn delete_job(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Response {
    // A run of a deleted job would otherwise keep going unobserved. Its last
    // log lines must land before the buffer is dropped below.
    match state.scheduler_handle.cancel_job(&id).await {
        Ok(()) => {
            if !state
                .scheduler_handle
                .wait_until_stopped(&id, DELETE_STOP_TIMEOUT)
                .await
            {
                warn!(
                    "Run of deleted job {} did not stop within {:?}",
                    id, DELETE_STOP_TIMEOUT
                );
            }
        }
        Err(e) => debug!("No run to cancel for deleted job {}: {}", id, e),
    }

    match state.job_store.delete_job(&id) {
        Ok(true) => {
            state.log_registry.remove(&id);
            info!("Deleted job {}", id);
            Json(json!({ "status": "success" })).into_response()
        }
        Ok(false) => job_not_found(),
        Err(err) => store_error_response(err),
    }
}

async fn run_job(
    State(scheduler): State<SchedulerHandle>,
    Path(id): Path<String>,
) -> Response {
    match scheduler.trigger_job(&id).await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(json!({ "status": "success", "message": "Job started" })),
        )
            .into_response(),
        Err(JobError::NotFound) => job_not_found(),
        Err(JobError::AlreadyRunning) => {
            error_response(StatusCode::CONFLICT, "Job is already running")
        }
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

async fn cancel_job(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Response {
    if state.job_store.get_job(&id).is_none() {
        return job_not_found();
    }

    match state.scheduler_handle.cancel_job(&id).await {
        Ok(()) => Json(json!({ "status": "success", "message": "Job cancelled" })).into_response(),
        Err(JobError::NotRunning) => error_response(StatusCode::CONFLICT, "Job is not running"),
        Err(JobError::NotFound) => job_not_found(),
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

async fn get_job_logs(
    State(log_registry): State<GuardedLogRegistry>,
    Path(id): Path<String>,
) -> Response {
    Json(json!({ "logs": log_registry.get_logs(&id) })).into_response()
}

async fn get_job_progress(
    State(log_registry): State<GuardedLogRegistry>,
    Path(id): Path<String>,
) -> Response {
    let body = match log_registry.get_progress(&id) {
        Some(progress) => {
            let mut value = serde_json::to_value(progress).unwrap_or_else(|_| json!({}));
            if let Some(map) = value.as_object_mut() {
                map.insert("has_progress".to_string(), json!(true));
            }
            value
        }
        None => json!({ "has_progress": false }),
    };
    Json(body).into_response()
}

async fn test_connection(state: ServerState, id: String, side: Side) -> Response {
    let job = match state.job_store.get_job(&id) {
        Some(job) => job,
        None => return job_not_found(),
    };
    let instance = ArrInstance::for_job(&job, side);

    let (status, message) = match state.arr_client.test_connection(&instance).await {
        Ok(()) => ("success", format!("Connection to {} successful", side.label())),
        Err(ArrClientError::MissingCredentials) => match side {
            Side::A => ("error", "URL or Key missing".to_string()),
            Side::B => ("error", "URL or Key missing for Instance B".to_string()),
        },
        Err(ArrClientError::Status(code)) => {
            ("error", format!("{} returned {}", side.label(), code))
        }
        Err(err) => ("error", err.to_string()),
    };
    debug!("Connection test of job {} {}: {}", id, side.label(), message);
    Json(json!({ "status": status, "message": message })).into_response()
}

async fn test_connection_a(State(state): State<ServerState>, Path(id): Path<String>) -> Response {
    test_connection(state, id, Side::A).await
}

async fn test_connection_b(State(state): State<ServerState>, Path(id): Path<String>) -> Response {
    test_connection(state, id, Side::B).await
}

async fn fetch_profiles(
    State(arr_client): State<GuardedArrClient>,
    Json(body): Json<FetchOptionsBody>,
) -> Response {
    let response = match arr_client.fetch_profiles(&body.instance()).await {
        Ok(profiles) => json!({ "status": "success", "profiles": profiles }),
        Err(err) => json!({ "status": "error", "profiles": [], "message": err.to_string() }),
    };
    Json(response).into_response()
}

async fn fetch_root_folders(
    State(arr_client): State<GuardedArrClient>,
    Json(body): Json<FetchOptionsBody>,
) -> Response {
    let response = match arr_client.fetch_root_folders(&body.instance()).await {
        Ok(folders) => json!({ "status": "success", "folders": folders }),
        Err(err) => json!({ "status": "error", "folders": [], "message": err.to_string() }),
    };
    Json(response).into_response()
}

pub fn make_app(
    config: ServerConfig,
    job_store: Arc<dyn JobStore>,
    log_registry: Arc<JobLogRegistry>,
    scheduler_handle: SchedulerHandle,
    arr_client: Arc<ArrClient>,
) -> Router {
    let state = ServerState {
        config: config.clone(),
        start_time: Instant::now(),
        job_store,
        log_registry,
        scheduler_handle,
        arr_client,
        hash: env!("GIT_HASH").to_string(),
    };

    let api_routes: Router = Router::new()
        .route("/status", get(home))
        .route("/jobs", get(list_jobs).post(create_job))
        .route("/jobs/{id}", get(get_job).put(update_job).delete(delete_job))
        .route("/jobs/{id}/run", post(run_job))
        .route("/jobs/{id}/cancel", post(cancel_job))
        .route("/jobs/{id}/logs", get(get_job_logs))
        .route("/jobs/{id}/logs/ws", get(job_logs_ws))
        .route("/jobs/{id}/progress", get(get_job_progress))
        .route("/jobs/{id}/test", post(test_connection_a))
        .route("/jobs/{id}/test-b", post(test_connection_b))
        .route("/fetch-profiles", post(fetch_profiles))
        .route("/fetch-rootfolders", post(fetch_root_folders))
        .with_state(state.clone());

    let home_router: Router = match &config.frontend_dir_path {
        Some(frontend_path) => {
            let static_files_service =
                ServeDir::new(frontend_path).append_index_html_on_directories(true);
            Router::new().fallback_service(static_files_service)
        }
        None => Router::new(),
    };

    home_router
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(config, log_requests))
}

pub async fn run_server(
    config: ServerConfig,
    job_store: Arc<dyn JobStore>,
    log_registry: Arc<JobLogRegistry>,
    scheduler_handle: SchedulerHandle,
    arr_client: Arc<ArrClient>,
    shutdown_token: CancellationToken,
) -> Result<()> {
    let port = config.port;
    let app = make_app(config, job_store, log_registry, scheduler_handle, arr_client);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown_token.cancelled().await })
        .await?;
    Ok(())
}
