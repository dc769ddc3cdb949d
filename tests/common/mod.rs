//! Common test infrastructure
//!
//! This module provides all the infrastructure needed for end-to-end tests.
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{radarr_job_body, TestClient, TestServer, SUCCEEDING_SCRIPT};
//! use reqwest::StatusCode;
//!
//! #[tokio::test]
//! async fn test_create_job() {
//!     let server = TestServer::spawn(Some(SUCCEEDING_SCRIPT)).await;
//!     let client = TestClient::new(server.base_url.clone());
//!
//!     let response = client.create_job(&radarr_job_body("Movies")).await;
//!     assert_eq!(response.status(), StatusCode::CREATED);
//! }
//! ```

mod client;
mod constants;
mod fixtures;
mod server;

// Public API - this is what tests import
pub use client::TestClient;
pub use constants::*;
pub use fixtures::radarr_job_body;
pub use server::TestServer;
