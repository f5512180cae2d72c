use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Supported local cluster backends
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Distribution {
    Kind,
    K3d,
}

impl Distribution {
    /// Prefix the backend gives kubeconfig contexts
    pub fn context_prefix(&self) -> &'static str {
        match self {
            Distribution::Kind => "kind-",
            Distribution::K3d => "k3d-",
        }
    }
}

/// The cluster a lifecycle call targets
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterIdentity {
    /// Explicit cluster name; empty defers to the backend configuration
    #[serde(default)]
    pub name: String,
    /// Backend distribution tag, e.g. `kind` or `k3d`
    pub distribution: String,
    /// Backend configuration file
    #[serde(default)]
    pub config_path: Option<PathBuf>,
    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,
    #[serde(default)]
    pub context: Option<String>,
}

impl ClusterIdentity {
    pub fn new(name: impl Into<String>, distribution: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            distribution: distribution.into(),
            ..Default::default()
        }
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn with_kubeconfig(mut self, path: impl Into<PathBuf>) -> Self {
        self.kubeconfig = Some(path.into());
        self
    }

    /// Explicit context, else the backend's `<prefix><name>` convention.
    /// `None` when neither a context nor a name is known.
    pub fn context_name(&self, distribution: Distribution, configured_name: &str) -> Option<String> {
        if let Some(context) = self.context.as_ref().filter(|c| !c.is_empty()) {
            return Some(context.clone());
        }
        let name = resolve_name(&self.name, configured_name);
        if name.is_empty() {
            None
        } else {
            Some(format!("{}{}", distribution.context_prefix(), name))
        }
    }
}

/// Explicit name wins, then the configured one, else empty
pub fn resolve_name(explicit: &str, configured: &str) -> String {
    if !explicit.is_empty() {
        explicit.to_string()
    } else {
        configured.to_string()
    }
}
