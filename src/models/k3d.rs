use serde::{Deserialize, Serialize};

/// Default cluster name k3d uses when none is configured
pub const DEFAULT_K3D_NAME: &str = "k3s-default";

/// k3d `Simple` configuration (`k3d.io/v1alpha5`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct K3dConfig {
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub metadata: K3dMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servers: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agents: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub registries: K3dRegistries,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct K3dMetadata {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct K3dRegistries {
    /// Embedded k3s `registries.yaml` document
    #[serde(default)]
    pub config: String,
}

fn default_kind() -> String {
    "Simple".to_string()
}

fn default_api_version() -> String {
    "k3d.io/v1alpha5".to_string()
}

impl Default for K3dConfig {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            api_version: default_api_version(),
            metadata: K3dMetadata {
                name: DEFAULT_K3D_NAME.to_string(),
            },
            servers: None,
            agents: None,
            image: None,
            registries: K3dRegistries::default(),
        }
    }
}
