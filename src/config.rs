use anyhow::Result;
use serde::Deserialize;
use tracing::warn;

use crate::logging::LogFormat;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Docker socket path; `None` uses the local defaults (and `DOCKER_HOST`)
    #[serde(default)]
    pub docker_socket: Option<String>,

    #[serde(default = "default_kind_binary")]
    pub kind_binary: String,

    #[serde(default = "default_k3d_binary")]
    pub k3d_binary: String,

    #[serde(default = "default_registry_image")]
    pub registry_image: String,

    #[serde(default = "default_registry_base_port")]
    pub registry_base_port: u16,

    /// Also drop registry data volumes when a cluster is deleted
    #[serde(default)]
    pub delete_registry_volumes: bool,

    /// Mirror backend output to the console while capturing it
    #[serde(default = "default_mirror_output")]
    pub mirror_output: bool,

    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_kind_binary() -> String {
    "kind".to_string()
}

fn default_k3d_binary() -> String {
    "k3d".to_string()
}

fn default_registry_image() -> String {
    "registry:2".to_string()
}

fn default_registry_base_port() -> u16 {
    crate::registry::DEFAULT_BASE_PORT
}

fn default_mirror_output() -> bool {
    true
}

impl Settings {
    /// Load settings from `PROVISIONER_*` environment variables
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("PROVISIONER"))
            .build()?;

        let settings = config.try_deserialize().unwrap_or_else(|e| {
            warn!(error = %e, "Invalid provisioner settings, using defaults");
            Settings::default()
        });

        Ok(settings)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            docker_socket: None,
            kind_binary: default_kind_binary(),
            k3d_binary: default_k3d_binary(),
            registry_image: default_registry_image(),
            registry_base_port: default_registry_base_port(),
            delete_registry_volumes: false,
            mirror_output: default_mirror_output(),
            log_format: LogFormat::default(),
        }
    }
}
