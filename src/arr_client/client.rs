//! HTTP client for arr application instances.

use std::time::Duration;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use super::models::{ArrInstance, QualityProfile, RootFolder};

pub const DEFAULT_TIMEOUT_SEC: u64 = 30;

#[derive(Debug, Error)]
pub enum ArrClientError {
    #[error("URL or Key missing")]
    MissingCredentials,

    #[error("Server returned {0}")]
    Status(u16),

    #[error("{0}")]
    Request(#[from] reqwest::Error),
}

/// HTTP client for communicating with Radarr, Sonarr and Lidarr.
///
/// Certificate verification can be skipped per instance, so two underlying
/// clients are kept with the same timeout.
pub struct ArrClient {
    client: reqwest::Client,
    insecure_client: reqwest::Client,
}

impl ArrClient {
    pub fn new(timeout_sec: u64) -> Result<Self, ArrClientError> {
        let timeout = Duration::from_secs(timeout_sec);
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let insecure_client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self {
            client,
            insecure_client,
        })
    }

    /// Check that the instance answers its status endpoint with our key.
    pub async fn test_connection(&self, instance: &ArrInstance) -> Result<(), ArrClientError> {
        self.get(instance, "system/status").await?;
        Ok(())
    }

    /// Names of the instance's quality profiles.
    pub async fn fetch_profiles(&self, instance: &ArrInstance) -> Result<Vec<String>, ArrClientError> {
        let profiles: Vec<QualityProfile> = self.get_json(instance, "qualityprofile").await?;
        Ok(profiles.into_iter().filter_map(|p| p.name).collect())
    }

    /// Paths of the instance's root folders.
    pub async fn fetch_root_folders(
        &self,
        instance: &ArrInstance,
    ) -> Result<Vec<String>, ArrClientError> {
        let folders: Vec<RootFolder> = self.get_json(instance, "rootfolder").await?;
        Ok(folders.into_iter().filter_map(|f| f.path).collect())
    }

    async fn get(
        &self,
        instance: &ArrInstance,
        resource: &str,
    ) -> Result<reqwest::Response, ArrClientError> {
        if !instance.has_credentials() {
            return Err(ArrClientError::MissingCredentials);
        }

        let client = if instance.skip_ssl_verify {
            &self.insecure_client
        } else {
            &self.client
        };
        let url = instance.endpoint(resource);
        debug!("GET {}", url);

        let response = client
            .get(&url)
            .query(&[("apikey", instance.api_key.as_str())])
            .send()
            .await?;

        // Anything but 200 is a failure, including other 2xx codes.
        if response.status() != reqwest::StatusCode::OK {
            return Err(ArrClientError::Status(response.status().as_u16()));
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        instance: &ArrInstance,
        resource: &str,
    ) -> Result<T, ArrClientError> {
        let response = self.get(instance, resource).await?;
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_store::JobType;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;

    const API_KEY: &str = "secret";

    fn authorized(query: &HashMap<String, String>) -> bool {
        query.get("apikey").map(String::as_str) == Some(API_KEY)
    }

    async fn status(Query(query): Query<HashMap<String, String>>) -> StatusCode {
        if authorized(&query) {
            StatusCode::OK
        } else {
            StatusCode::UNAUTHORIZED
        }
    }

    async fn profiles(
        Query(query): Query<HashMap<String, String>>,
    ) -> Result<Json<Value>, StatusCode> {
        if !authorized(&query) {
            return Err(StatusCode::UNAUTHORIZED);
        }
        Ok(Json(json!([
            {"id": 1, "name": "HD-1080p"},
            {"id": 2, "name": "Any"},
            {"id": 3}
        ])))
    }

    async fn root_folders() -> Json<Value> {
        Json(json!([{"id": 1, "path": "/music"}, {"id": 2, "path": "/archive"}]))
    }

    /// Fake arr instance on a random local port, returns its address.
    async fn spawn_fake_arr() -> String {
        let app = Router::new()
            .route("/api/v3/system/status", get(status))
            .route("/api/v3/qualityprofile", get(profiles))
            .route("/api/v1/rootfolder", get(root_folders))
            .route("/api/v3/created", get(|| async { StatusCode::CREATED }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("127.0.0.1:{}", addr.port())
    }

    fn client() -> ArrClient {
        ArrClient::new(5).unwrap()
    }

    #[tokio::test]
    async fn test_connection_success_and_rejected_key() {
        let addr = spawn_fake_arr().await;

        let good = ArrInstance::new(JobType::Sonarr, &format!("{}/", addr), API_KEY, false);
        client().test_connection(&good).await.unwrap();

        let bad = ArrInstance::new(JobType::Sonarr, &addr, "wrong", false);
        let err = client().test_connection(&bad).await.unwrap_err();
        assert!(matches!(err, ArrClientError::Status(401)));
        assert_eq!(err.to_string(), "Server returned 401");
    }

    #[tokio::test]
    async fn test_missing_credentials_makes_no_request() {
        let instance = ArrInstance::new(JobType::Radarr, "", API_KEY, false);
        let err = client().test_connection(&instance).await.unwrap_err();
        assert!(matches!(err, ArrClientError::MissingCredentials));

        let instance = ArrInstance::new(JobType::Radarr, "localhost:1", "  ", false);
        let err = client().fetch_profiles(&instance).await.unwrap_err();
        assert!(matches!(err, ArrClientError::MissingCredentials));
    }

    #[tokio::test]
    async fn test_fetch_profiles_returns_names() {
        let addr = spawn_fake_arr().await;
        let instance = ArrInstance::new(JobType::Sonarr, &addr, API_KEY, false);

        let names = client().fetch_profiles(&instance).await.unwrap();
        assert_eq!(names, vec!["HD-1080p", "Any"]);
    }

    #[tokio::test]
    async fn test_fetch_root_folders_uses_lidarr_api_version() {
        let addr = spawn_fake_arr().await;
        let instance = ArrInstance::new(JobType::Lidarr, &addr, API_KEY, true);

        let paths = client().fetch_root_folders(&instance).await.unwrap();
        assert_eq!(paths, vec!["/music", "/archive"]);

        // Sonarr has no v3 root folder route on the fake.
        let sonarr = ArrInstance::new(JobType::Sonarr, &addr, API_KEY, false);
        let err = client().fetch_root_folders(&sonarr).await.unwrap_err();
        assert!(matches!(err, ArrClientError::Status(404)));
    }

    #[tokio::test]
    async fn test_non_200_success_is_an_error() {
        let addr = spawn_fake_arr().await;
        let instance = ArrInstance::new(JobType::Radarr, &addr, API_KEY, false);

        let err = client().get(&instance, "created").await.unwrap_err();
        assert!(matches!(err, ArrClientError::Status(201)));
    }

    #[tokio::test]
    async fn test_unreachable_instance_is_request_error() {
        let instance = ArrInstance::new(JobType::Radarr, "127.0.0.1:1", API_KEY, false);
        let err = client().test_connection(&instance).await.unwrap_err();
        assert!(matches!(err, ArrClientError::Request(_)));
    }
}
