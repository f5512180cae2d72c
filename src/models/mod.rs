//! Cluster identity and backend configuration models

pub mod cluster;
pub mod k3d;
pub mod kind;

pub use cluster::*;
pub use k3d::*;
pub use kind::*;

use std::io::ErrorKind;
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ClusterError;

/// Load a YAML configuration file.
///
/// A missing file is not an error: `Ok(None)` tells the caller to fall back
/// to its default configuration.
pub async fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, ClusterError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "Configuration file not found, using defaults");
            return Ok(None);
        }
        Err(e) => {
            return Err(ClusterError::Config {
                path: path.to_path_buf(),
                source: e.into(),
            })
        }
    };

    serde_yaml::from_str(&raw)
        .map(Some)
        .map_err(|e| ClusterError::Config {
            path: path.to_path_buf(),
            source: e.into(),
        })
}
