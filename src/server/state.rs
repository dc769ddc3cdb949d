use axum::extract::FromRef;

use crate::arr_client::ArrClient;
use crate::background_jobs::SchedulerHandle;
use crate::job_logs::JobLogRegistry;
use crate::job_store::JobStore;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedJobStore = Arc<dyn JobStore>;
pub type GuardedLogRegistry = Arc<JobLogRegistry>;
pub type GuardedArrClient = Arc<ArrClient>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub job_store: GuardedJobStore,
    pub log_registry: GuardedLogRegistry,
    pub scheduler_handle: SchedulerHandle,
    pub arr_client: GuardedArrClient,
    pub hash: String,
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

impl FromRef<ServerState> for GuardedJobStore {
    fn from_ref(input: &ServerState) -> Self {
        input.job_store.clone()
    }
}

impl FromRef<ServerState> for GuardedLogRegistry {
    fn from_ref(input: &ServerState) -> Self {
        input.log_registry.clone()
    }
}

impl FromRef<ServerState> for SchedulerHandle {
    fn from_ref(input: &ServerState) -> Self {
        input.scheduler_handle.clone()
    }
}

impl FromRef<ServerState> for GuardedArrClient {
    fn from_ref(input: &ServerState) -> Self {
        input.arr_client.clone()
    }
}
