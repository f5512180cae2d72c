//! Container runtime request/response models

use std::collections::HashMap;

/// Summary of a container as reported by the runtime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerInfo {
    pub id: String,
    /// Name without the leading `/`
    pub name: String,
    pub state: Option<String>,
    pub labels: HashMap<String, String>,
}

/// Everything needed to create a registry mirror container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryContainerSpec {
    pub name: String,
    pub image: String,
    /// Host port published on 127.0.0.1
    pub host_port: u16,
    /// Pull-through upstream; `None` runs a plain local registry
    pub upstream: Option<String>,
    /// Named volume holding registry data
    pub volume: String,
    pub labels: HashMap<String, String>,
}

/// Port the registry listens on inside its container
pub const REGISTRY_CONTAINER_PORT: u16 = 5000;

impl RegistryContainerSpec {
    /// Environment handed to the registry process
    pub fn env(&self) -> Vec<String> {
        self.upstream
            .iter()
            .map(|url| format!("REGISTRY_PROXY_REMOTEURL={}", url))
            .collect()
    }
}
