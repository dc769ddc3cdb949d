//! HTTP client for end-to-end tests
//!
//! This module provides a high-level HTTP client that wraps reqwest
//! and provides methods for all syncarr-server endpoints.
//!
//! When API routes or request formats change, update only this file.

use super::constants::*;
use reqwest::Response;
use serde_json::{json, Value};
use std::time::Duration;

pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // ========================================================================
    // Job Definitions
    // ========================================================================

    /// GET /api/jobs
    pub async fn list_jobs(&self) -> Response {
        self.client
            .get(self.url("/api/jobs"))
            .send()
            .await
            .expect("List jobs request failed")
    }

    /// POST /api/jobs
    pub async fn create_job(&self, body: &Value) -> Response {
        self.client
            .post(self.url("/api/jobs"))
            .json(body)
            .send()
            .await
            .expect("Create job request failed")
    }

    /// Creates a job and returns its id, panicking unless it was created
    pub async fn create_job_id(&self, body: &Value) -> String {
        let response = self.create_job(body).await;
        assert_eq!(response.status(), reqwest::StatusCode::CREATED);
        let job: Value = response.json().await.expect("Invalid job JSON");
        job["id"].as_str().expect("Job has no id").to_string()
    }

    /// GET /api/jobs/{id}
    pub async fn get_job(&self, id: &str) -> Response {
        self.client
            .get(self.url(&format!("/api/jobs/{}", id)))
            .send()
            .await
            .expect("Get job request failed")
    }

    /// PUT /api/jobs/{id}
    pub async fn update_job(&self, id: &str, body: &Value) -> Response {
        self.client
            .put(self.url(&format!("/api/jobs/{}", id)))
            .json(body)
            .send()
            .await
            .expect("Update job request failed")
    }

    /// DELETE /api/jobs/{id}
    pub async fn delete_job(&self, id: &str) -> Response {
        self.client
            .delete(self.url(&format!("/api/jobs/{}", id)))
            .send()
            .await
            .expect("Delete job request failed")
    }

    // ========================================================================
    // Runs
    // ========================================================================

    /// POST /api/jobs/{id}/run
    pub async fn run_job(&self, id: &str) -> Response {
        self.client
            .post(self.url(&format!("/api/jobs/{}/run", id)))
            .send()
            .await
            .expect("Run job request failed")
    }

    /// POST /api/jobs/{id}/cancel
    pub async fn cancel_job(&self, id: &str) -> Response {
        self.client
            .post(self.url(&format!("/api/jobs/{}/cancel", id)))
            .send()
            .await
            .expect("Cancel job request failed")
    }

    /// GET /api/jobs/{id}/logs, lines without their timestamp prefix
    pub async fn get_log_lines(&self, id: &str) -> Vec<String> {
        let body: Value = self
            .client
            .get(self.url(&format!("/api/jobs/{}/logs", id)))
            .send()
            .await
            .expect("Get logs request failed")
            .json()
            .await
            .expect("Invalid logs JSON");
        body["logs"]
            .as_array()
            .expect("logs is not an array")
            .iter()
            .map(|line| {
                let line = line.as_str().expect("log line is not a string");
                // "[HH:MM:SS] " prefix
                line.get(11..).unwrap_or_default().to_string()
            })
            .collect()
    }

    /// GET /api/jobs/{id}/progress
    pub async fn get_progress(&self, id: &str) -> Value {
        self.client
            .get(self.url(&format!("/api/jobs/{}/progress", id)))
            .send()
            .await
            .expect("Get progress request failed")
            .json()
            .await
            .expect("Invalid progress JSON")
    }

    /// Polls the job until it is no longer running and returns it
    pub async fn wait_until_settled(&self, id: &str) -> Value {
        let start = std::time::Instant::now();
        loop {
            let job: Value = self
                .get_job(id)
                .await
                .json()
                .await
                .expect("Invalid job JSON");
            if job["is_running"] == json!(false) && job["status"] != "Running" {
                return job;
            }
            if start.elapsed() > Duration::from_millis(RUN_SETTLE_TIMEOUT_MS) {
                panic!("Job {} did not settle: {}", id, job);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Polls the job until it reports an in-flight run
    pub async fn wait_until_running(&self, id: &str) {
        let start = std::time::Instant::now();
        loop {
            let job: Value = self
                .get_job(id)
                .await
                .json()
                .await
                .expect("Invalid job JSON");
            if job["status"] == "Running" {
                return;
            }
            if start.elapsed() > Duration::from_millis(RUN_SETTLE_TIMEOUT_MS) {
                panic!("Job {} never started: {}", id, job);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    // ========================================================================
    // Connection Helpers
    // ========================================================================

    /// POST /api/jobs/{id}/test or /test-b
    pub async fn test_connection(&self, id: &str, side_b: bool) -> Response {
        let suffix = if side_b { "test-b" } else { "test" };
        self.client
            .post(self.url(&format!("/api/jobs/{}/{}", id, suffix)))
            .send()
            .await
            .expect("Test connection request failed")
    }

    /// POST /api/fetch-profiles
    pub async fn fetch_profiles(&self, body: &Value) -> Response {
        self.client
            .post(self.url("/api/fetch-profiles"))
            .json(body)
            .send()
            .await
            .expect("Fetch profiles request failed")
    }
}
