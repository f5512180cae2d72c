//! Registry mirror container lifecycle

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::docker::{ContainerRuntime, RegistryContainerSpec, RuntimeError};
use crate::runner::CommandContext;

use super::types::RegistryInfo;

/// Label marking containers managed by this crate
pub const MANAGED_LABEL: &str = "dev.cluster-provisioner.registry";
/// Label carrying the mirrored registry host
pub const HOST_LABEL: &str = "dev.cluster-provisioner.registry.host";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to create registry {name}: {source}")]
    Create {
        name: String,
        #[source]
        source: RuntimeError,
    },

    #[error("failed to connect registry {name} to network {network}: {source}")]
    Connect {
        name: String,
        network: String,
        #[source]
        source: RuntimeError,
    },

    #[error("failed to prepare network {network}: {source}")]
    Network {
        network: String,
        #[source]
        source: RuntimeError,
    },

    #[error("registry setup cancelled")]
    Cancelled,
}

/// Runs registry mirror containers next to a cluster
#[derive(Clone)]
pub struct RegistryMirrorManager {
    runtime: Arc<dyn ContainerRuntime>,
    image: String,
}

impl RegistryMirrorManager {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, image: impl Into<String>) -> Self {
        Self {
            runtime,
            image: image.into(),
        }
    }

    fn container_spec(&self, info: &RegistryInfo) -> RegistryContainerSpec {
        let labels = HashMap::from([
            (MANAGED_LABEL.to_string(), "true".to_string()),
            (HOST_LABEL.to_string(), info.host.clone()),
        ]);
        RegistryContainerSpec {
            name: info.name.clone(),
            image: self.image.clone(),
            host_port: info.port,
            upstream: info.upstream().map(String::from),
            volume: info.name.clone(),
            labels,
        }
    }

    /// Create missing registry containers and attach all of them to `network`
    #[instrument(skip(self, ctx, registries), fields(count = registries.len()))]
    pub async fn setup(
        &self,
        ctx: &CommandContext,
        registries: &[RegistryInfo],
        network: &str,
    ) -> Result<(), RegistryError> {
        if registries.is_empty() {
            return Ok(());
        }

        ctx.until_cancelled(self.runtime.ensure_network(network))
            .await
            .ok_or(RegistryError::Cancelled)?
            .map_err(|source| RegistryError::Network {
                network: network.to_string(),
                source,
            })?;

        for info in registries {
            let exists = ctx
                .until_cancelled(self.runtime.container_exists(&info.name))
                .await
                .ok_or(RegistryError::Cancelled)?
                .map_err(|source| RegistryError::Create {
                    name: info.name.clone(),
                    source,
                })?;

            if exists {
                info!(name = %info.name, "Registry mirror already exists");
            } else {
                let spec = self.container_spec(info);
                ctx.until_cancelled(self.runtime.create_registry(&spec))
                    .await
                    .ok_or(RegistryError::Cancelled)?
                    .map_err(|source| RegistryError::Create {
                        name: info.name.clone(),
                        source,
                    })?;
                info!(
                    name = %info.name,
                    port = info.port,
                    upstream = %info.upstream,
                    "Created registry mirror"
                );
            }

            ctx.until_cancelled(self.runtime.connect_network(network, &info.name))
                .await
                .ok_or(RegistryError::Cancelled)?
                .map_err(|source| RegistryError::Connect {
                    name: info.name.clone(),
                    network: network.to_string(),
                    source,
                })?;
        }

        Ok(())
    }

    /// Remove registry containers. Individual failures are logged and the
    /// remaining removals still run.
    #[instrument(skip(self, ctx, registries), fields(count = registries.len()))]
    pub async fn cleanup(
        &self,
        ctx: &CommandContext,
        registries: &[RegistryInfo],
        remove_volumes: bool,
    ) {
        for info in registries {
            match ctx
                .until_cancelled(self.runtime.remove_container(&info.name, remove_volumes))
                .await
            {
                Some(Ok(())) => info!(name = %info.name, "Removed registry mirror"),
                Some(Err(e)) if e.is_not_found() => {
                    info!(name = %info.name, "Registry mirror already removed")
                }
                Some(Err(e)) => {
                    warn!(name = %info.name, error = %e, "Failed to remove registry mirror")
                }
                None => warn!(name = %info.name, "Registry cleanup cancelled, skipping"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::MockContainerRuntime;
    use bollard::errors::Error as BollardError;

    fn info(name: &str, port: u16, upstream: &str) -> RegistryInfo {
        RegistryInfo {
            name: name.to_string(),
            upstream: upstream.to_string(),
            port,
            host: "docker.io".to_string(),
        }
    }

    fn server_error() -> RuntimeError {
        RuntimeError::Api(BollardError::DockerResponseServerError {
            status_code: 500,
            message: "boom".to_string(),
        })
    }

    #[tokio::test]
    async fn test_setup_creates_missing_and_connects_all() {
        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_ensure_network()
            .withf(|network| network == "kind")
            .times(1)
            .returning(|_| Ok(()));
        runtime
            .expect_container_exists()
            .returning(|name| Ok(name == "kind-ghcr-io"));
        runtime
            .expect_create_registry()
            .withf(|spec| {
                spec.name == "kind-docker-io"
                    && spec.host_port == 5000
                    && spec.upstream.as_deref() == Some("https://registry-1.docker.io")
                    && spec.labels.get(MANAGED_LABEL).map(String::as_str) == Some("true")
            })
            .times(1)
            .returning(|_| Ok(()));
        runtime
            .expect_connect_network()
            .withf(|network, _| network == "kind")
            .times(2)
            .returning(|_, _| Ok(()));

        let manager = RegistryMirrorManager::new(Arc::new(runtime), "registry:2");
        let registries = vec![
            info("kind-docker-io", 5000, "https://registry-1.docker.io"),
            info("kind-ghcr-io", 5001, "https://ghcr.io"),
        ];

        manager
            .setup(&CommandContext::new(), &registries, "kind")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_setup_without_registries_touches_nothing() {
        let runtime = MockContainerRuntime::new();
        let manager = RegistryMirrorManager::new(Arc::new(runtime), "registry:2");
        manager
            .setup(&CommandContext::new(), &[], "kind")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_setup_reports_create_failure() {
        let mut runtime = MockContainerRuntime::new();
        runtime.expect_ensure_network().returning(|_| Ok(()));
        runtime.expect_container_exists().returning(|_| Ok(false));
        runtime
            .expect_create_registry()
            .returning(|_| Err(server_error()));

        let manager = RegistryMirrorManager::new(Arc::new(runtime), "registry:2");
        let err = manager
            .setup(&CommandContext::new(), &[info("kind-docker-io", 5000, "")], "kind")
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Create { ref name, .. } if name == "kind-docker-io"));
    }

    #[tokio::test]
    async fn test_cleanup_continues_past_failures() {
        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_remove_container()
            .withf(|name, volumes| name == "kind-docker-io" && *volumes)
            .times(1)
            .returning(|_, _| Err(server_error()));
        runtime
            .expect_remove_container()
            .withf(|name, volumes| name == "kind-ghcr-io" && *volumes)
            .times(1)
            .returning(|_, _| Ok(()));

        let manager = RegistryMirrorManager::new(Arc::new(runtime), "registry:2");
        let registries = vec![
            info("kind-docker-io", 5000, ""),
            info("kind-ghcr-io", 5001, ""),
        ];
        manager
            .cleanup(&CommandContext::new(), &registries, true)
            .await;
    }

    #[test]
    fn test_pure_local_registry_has_no_proxy() {
        let manager = RegistryMirrorManager::new(Arc::new(MockContainerRuntime::new()), "registry:2");
        let spec = manager.container_spec(&info("k3d-local-dev", 5002, ""));
        assert_eq!(spec.upstream, None);
        assert_eq!(spec.volume, "k3d-local-dev");
        assert_eq!(spec.labels.get(HOST_LABEL).map(String::as_str), Some("docker.io"));
    }
}
