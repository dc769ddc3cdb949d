//! HTTP JSON surface over the job store, log registry and scheduler.

pub mod config;
mod http_layers;
mod log_stream;
pub mod server;
pub mod state;

pub use config::ServerConfig;
pub use http_layers::*;
pub use server::{make_app, run_server};
