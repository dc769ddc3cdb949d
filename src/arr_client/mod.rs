//! Client for the Radarr/Sonarr/Lidarr REST APIs used to check connections
//! and to populate job configuration choices.

mod client;
mod models;

pub use client::{ArrClient, ArrClientError, DEFAULT_TIMEOUT_SEC};
pub use models::{ArrInstance, QualityProfile, RootFolder, Side};
