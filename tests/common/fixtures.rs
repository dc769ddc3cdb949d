//! On-disk fixtures for end-to-end tests

use super::constants::ENTRY_POINT;
use std::path::PathBuf;
use tempfile::TempDir;

/// Create a sync directory, with `script` as its entry point when given.
pub fn create_sync_dir(script: Option<&str>) -> std::io::Result<(TempDir, PathBuf)> {
    let dir = TempDir::new()?;
    if let Some(script) = script {
        std::fs::write(dir.path().join(ENTRY_POINT), script)?;
    }
    let path = dir.path().to_path_buf();
    Ok((dir, path))
}

/// Job creation body pointing at a radarr pair.
pub fn radarr_job_body(name: &str) -> serde_json::Value {
    serde_json::json!({
        "name": name,
        "type": "radarr",
        "interval_minutes": 60,
        "config": {
            "url_a": "radarr-a:7878",
            "key_a": "key-a",
            "url_b": "http://radarr-b:7878",
            "key_b": "key-b",
            "profile_b": "HD-1080p",
            "path_b": "/movies"
        }
    })
}
