//! Models for the arr application APIs and the instances jobs point at.

use crate::background_jobs::normalize_url;
use crate::job_store::{Job, JobType};
use serde::Deserialize;

/// Which side of a sync job an instance is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    A,
    B,
}

impl Side {
    fn config_suffix(&self) -> &'static str {
        match self {
            Side::A => "a",
            Side::B => "b",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Side::A => "Instance A",
            Side::B => "Instance B",
        }
    }
}

/// Location and credentials of one arr application instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrInstance {
    pub job_type: JobType,
    pub url: String,
    pub api_key: String,
    pub skip_ssl_verify: bool,
}

impl ArrInstance {
    pub fn new(job_type: JobType, url: &str, api_key: &str, skip_ssl_verify: bool) -> Self {
        Self {
            job_type,
            url: url.trim().to_string(),
            api_key: api_key.trim().to_string(),
            skip_ssl_verify,
        }
    }

    /// The instance configured for one side of a job.
    pub fn for_job(job: &Job, side: Side) -> Self {
        let suffix = side.config_suffix();
        Self::new(
            job.job_type,
            job.config_str(&format!("url_{}", suffix)),
            job.config_str(&format!("key_{}", suffix)),
            job.config_flag("skip_ssl_verify"),
        )
    }

    pub fn has_credentials(&self) -> bool {
        !self.url.is_empty() && !self.api_key.is_empty()
    }

    /// Base URL with a scheme and without a trailing slash.
    pub fn base_url(&self) -> String {
        normalize_url(&self.url).trim_end_matches('/').to_string()
    }

    pub fn endpoint(&self, resource: &str) -> String {
        format!(
            "{}/api/{}/{}",
            self.base_url(),
            self.job_type.api_version(),
            resource
        )
    }
}

/// Entry of `GET /api/{v}/qualityprofile`.
#[derive(Clone, Debug, Deserialize)]
pub struct QualityProfile {
    pub id: Option<i64>,
    pub name: Option<String>,
}

/// Entry of `GET /api/{v}/rootfolder`.
#[derive(Clone, Debug, Deserialize)]
pub struct RootFolder {
    pub id: Option<i64>,
    pub path: Option<String>,
}
