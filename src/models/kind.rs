use serde::{Deserialize, Serialize};

/// Default cluster name kind uses when none is configured
pub const DEFAULT_KIND_NAME: &str = "kind";

/// kind `Cluster` configuration (`kind.x-k8s.io/v1alpha4`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindConfig {
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<KindNode>,
    /// Raw containerd TOML patches applied to every node
    #[serde(default)]
    pub containerd_config_patches: Vec<String>,
}

/// One node entry of a kind cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindNode {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

fn default_kind() -> String {
    "Cluster".to_string()
}

fn default_api_version() -> String {
    "kind.x-k8s.io/v1alpha4".to_string()
}

impl Default for KindConfig {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            api_version: default_api_version(),
            name: DEFAULT_KIND_NAME.to_string(),
            nodes: Vec::new(),
            containerd_config_patches: Vec::new(),
        }
    }
}
