use crate::job_store::Job;
use std::collections::BTreeMap;

/// Environment variables handed to the sync program for one run.
///
/// Built purely from the job's type and config so the same job always yields
/// the same environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncEnvironment {
    vars: BTreeMap<String, String>,
}

impl SyncEnvironment {
    pub fn for_job(job: &Job) -> Self {
        let mut env = SyncEnvironment::default();

        env.set("IS_IN_DOCKER", "1");
        // Run once; repetition is owned by the scheduler.
        env.set("SYNC_INTERVAL_SECONDS", "0");

        env.set(
            "SYNCARR_BIDIRECTIONAL_SYNC",
            if job.config_flag("bidirectional") { "1" } else { "0" },
        );
        env.set(
            "LOG_LEVEL",
            if job.config_flag("debug_logging") { "10" } else { "20" },
        );
        env.set(
            "SYNCARR_SKIP_MISSING",
            if job.config_flag("sync_missing") { "0" } else { "1" },
        );

        let prefix = job.job_type.env_prefix();
        for side in ["a", "b"] {
            let upper = side.to_ascii_uppercase();
            env.set(
                format!("{}_{}_URL", prefix, upper),
                normalize_url(job.config_str(&format!("url_{}", side))),
            );
            env.set(
                format!("{}_{}_KEY", prefix, upper),
                job.config_str(&format!("key_{}", side)),
            );
            env.set(
                format!("{}_{}_PROFILE", prefix, upper),
                job.config_str(&format!("profile_{}", side)),
            );
            env.set(
                format!("{}_{}_PATH", prefix, upper),
                job.config_str(&format!("path_{}", side)),
            );
        }

        env
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Prefix `http://` to a URL that has no scheme. Empty stays empty.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.is_empty() || url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("http://{}", url)
    }
}
