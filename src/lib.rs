//! Syncarr Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod arr_client;
pub mod background_jobs;
pub mod config;
pub mod job_logs;
pub mod job_store;
pub mod server;

// Re-export commonly used types for convenience
pub use job_store::{FileJobStore, JobStore};
pub use server::{run_server, RequestsLoggingLevel};
