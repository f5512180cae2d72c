use std::sync::Arc;

use tracing::{debug, info};

use super::{
    ClusterProvisioner, K3dCommands, K3dProvisioner, KindCommands, KindProvisioner,
    ProvisionerOptions,
};
use crate::config::Settings;
use crate::docker::{ContainerRuntime, DockerRuntime};
use crate::error::{ClusterError, ClusterResult};
use crate::models::{load_yaml, ClusterIdentity, Distribution, K3dConfig, KindConfig};

/// Builds the provisioner matching a cluster's distribution
#[derive(Clone)]
pub struct ProvisionerFactory {
    settings: Settings,
    runtime: Option<Arc<dyn ContainerRuntime>>,
}

impl ProvisionerFactory {
    /// Factory connecting to the container runtime named in `settings`
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            runtime: None,
        }
    }

    /// Factory sharing an existing container runtime client
    pub fn with_runtime(settings: Settings, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            settings,
            runtime: Some(runtime),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn runtime(&self) -> ClusterResult<Arc<dyn ContainerRuntime>> {
        if let Some(runtime) = &self.runtime {
            return Ok(runtime.clone());
        }
        let docker = DockerRuntime::connect(self.settings.docker_socket.as_deref())
            .map_err(ClusterError::ProvisionerInit)?;
        Ok(Arc::new(docker))
    }

    /// Create a provisioner for `identity`.
    ///
    /// A configured file that does not exist falls back to the backend's
    /// default configuration and is not passed to the backend.
    pub async fn create(&self, identity: &ClusterIdentity) -> ClusterResult<Box<dyn ClusterProvisioner>> {
        let distribution: Distribution = identity
            .distribution
            .parse()
            .map_err(|_| ClusterError::UnsupportedDistribution(identity.distribution.clone()))?;

        let runtime = self.runtime()?;
        let options = ProvisionerOptions::from(&self.settings);

        let provisioner: Box<dyn ClusterProvisioner> = match distribution {
            Distribution::Kind => {
                let (config, config_path) = match &identity.config_path {
                    Some(path) => match load_yaml::<KindConfig>(path).await? {
                        Some(config) => (config, Some(path)),
                        None => (KindConfig::default(), None),
                    },
                    None => (KindConfig::default(), None),
                };

                let mut provisioner = KindProvisioner::new(config, runtime, options)
                    .with_commands(KindCommands::external(&self.settings.kind_binary));
                if let Some(path) = config_path {
                    provisioner = provisioner.with_config_path(path);
                }
                if let Some(kubeconfig) = &identity.kubeconfig {
                    provisioner = provisioner.with_kubeconfig(kubeconfig);
                }
                Box::new(provisioner)
            }
            Distribution::K3d => {
                let (config, config_path) = match &identity.config_path {
                    Some(path) => match load_yaml::<K3dConfig>(path).await? {
                        Some(config) => (config, Some(path)),
                        None => (K3dConfig::default(), None),
                    },
                    None => (K3dConfig::default(), None),
                };

                let mut provisioner = K3dProvisioner::new(config, runtime, options)
                    .with_commands(K3dCommands::external(&self.settings.k3d_binary));
                if let Some(path) = config_path {
                    provisioner = provisioner.with_config_path(path);
                }
                Box::new(provisioner)
            }
        };

        debug!(
            configured_name = provisioner.configured_name(),
            config = ?identity.config_path,
            "Loaded backend configuration"
        );
        info!(%distribution, "Created provisioner");
        Ok(provisioner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::MockContainerRuntime;
    use std::io::Write;

    fn factory() -> ProvisionerFactory {
        ProvisionerFactory::with_runtime(Settings::default(), Arc::new(MockContainerRuntime::new()))
    }

    #[tokio::test]
    async fn test_unknown_distribution_is_unsupported() {
        let err = factory()
            .create(&ClusterIdentity::new("demo", "minikube"))
            .await
            .err()
            .unwrap();
        assert!(err.is_unsupported_distribution());
        assert_eq!(err.to_string(), "unsupported distribution: minikube");
    }

    #[tokio::test]
    async fn test_distribution_tag_is_case_insensitive() {
        let provisioner = factory()
            .create(&ClusterIdentity::new("demo", "K3D"))
            .await
            .unwrap();
        assert_eq!(provisioner.distribution(), Distribution::K3d);
    }

    #[tokio::test]
    async fn test_missing_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let identity =
            ClusterIdentity::new("", "kind").with_config_path(dir.path().join("kind.yaml"));

        let provisioner = factory().create(&identity).await.unwrap();
        assert_eq!(provisioner.configured_name(), "kind");
        assert_eq!(provisioner.resolve_name(""), "kind");
    }

    #[tokio::test]
    async fn test_config_file_provides_name() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "apiVersion: k3d.io/v1alpha5\nkind: Simple\nmetadata:\n  name: demo").unwrap();
        let identity = ClusterIdentity::new("", "k3d").with_config_path(file.path());

        let provisioner = factory().create(&identity).await.unwrap();
        assert_eq!(provisioner.configured_name(), "demo");
        assert_eq!(provisioner.resolve_name("other"), "other");
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "nodes: [").unwrap();
        let identity = ClusterIdentity::new("", "kind").with_config_path(file.path());

        let err = factory().create(&identity).await.err().unwrap();
        assert!(matches!(err, ClusterError::Config { .. }));
    }
}
