//! Container runtime client backed by the Docker Engine API

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::CreateImageOptions;
use bollard::models::{EndpointSettings, HostConfig, PortBinding, RestartPolicy, RestartPolicyNameEnum};
use bollard::network::{ConnectNetworkOptions, CreateNetworkOptions, InspectNetworkOptions};
use bollard::volume::RemoveVolumeOptions;
use bollard::Docker;
use futures::TryStreamExt;
use thiserror::Error;
use tracing::{debug, info, instrument};

#[cfg(test)]
use mockall::automock;

use super::types::{ContainerInfo, RegistryContainerSpec, REGISTRY_CONTAINER_PORT};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("container runtime unavailable: {0}")]
    Connect(#[source] BollardError),

    #[error("container runtime request failed: {0}")]
    Api(#[from] BollardError),
}

impl RuntimeError {
    /// True when the runtime answered with HTTP 404
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RuntimeError::Api(BollardError::DockerResponseServerError {
                status_code: 404,
                ..
            })
        )
    }
}

/// Container lifecycle operations the provisioners depend on
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// All containers (running or not) carrying `label=value`
    async fn list_containers(&self, label: &str, value: &str)
        -> Result<Vec<ContainerInfo>, RuntimeError>;

    async fn container_exists(&self, name: &str) -> Result<bool, RuntimeError>;

    async fn start_container(&self, name: &str) -> Result<(), RuntimeError>;

    async fn stop_container(&self, name: &str) -> Result<(), RuntimeError>;

    /// Create the network as a bridge if it does not exist yet
    async fn ensure_network(&self, network: &str) -> Result<(), RuntimeError>;

    /// Attach a container to a network; a no-op when already attached
    async fn connect_network(&self, network: &str, container: &str) -> Result<(), RuntimeError>;

    /// Pull the image, create the container and start it
    async fn create_registry(&self, spec: &RegistryContainerSpec) -> Result<(), RuntimeError>;

    /// Force-remove a container, and its named data volume when asked
    async fn remove_container(&self, name: &str, remove_volumes: bool) -> Result<(), RuntimeError>;
}

/// [`ContainerRuntime`] talking to a Docker-compatible daemon
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to the given unix socket, or to the local defaults
    /// (honouring `DOCKER_HOST`) when no socket is configured
    pub fn connect(socket: Option<&str>) -> Result<Self, RuntimeError> {
        let docker = match socket {
            Some(path) => Docker::connect_with_socket(path, 120, bollard::API_DEFAULT_VERSION),
            None => Docker::connect_with_local_defaults(),
        }
        .map_err(RuntimeError::Connect)?;

        Ok(Self { docker })
    }

    async fn attached_networks(&self, container: &str) -> Result<Vec<String>, RuntimeError> {
        let inspect = self
            .docker
            .inspect_container(container, None::<InspectContainerOptions>)
            .await?;

        Ok(inspect
            .network_settings
            .and_then(|settings| settings.networks)
            .map(|networks| networks.into_keys().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_containers(
        &self,
        label: &str,
        value: &str,
    ) -> Result<Vec<ContainerInfo>, RuntimeError> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![format!("{}={}", label, value)]);

        let options = ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        };

        let containers = self.docker.list_containers(Some(options)).await?;

        Ok(containers
            .into_iter()
            .map(|c| ContainerInfo {
                id: c.id.unwrap_or_default(),
                name: c
                    .names
                    .and_then(|names| names.into_iter().next())
                    .map(|name| name.trim_start_matches('/').to_string())
                    .unwrap_or_default(),
                state: c.state,
                labels: c.labels.unwrap_or_default(),
            })
            .collect())
    }

    async fn container_exists(&self, name: &str) -> Result<bool, RuntimeError> {
        match self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(_) => Ok(true),
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    async fn start_container(&self, name: &str) -> Result<(), RuntimeError> {
        self.docker
            .start_container(name, None::<StartContainerOptions<String>>)
            .await?;
        info!("Started container");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn stop_container(&self, name: &str) -> Result<(), RuntimeError> {
        self.docker
            .stop_container(name, None::<StopContainerOptions>)
            .await?;
        info!("Stopped container");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn ensure_network(&self, network: &str) -> Result<(), RuntimeError> {
        match self
            .docker
            .inspect_network(network, None::<InspectNetworkOptions<String>>)
            .await
        {
            Ok(_) => return Ok(()),
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => {}
            Err(e) => return Err(e.into()),
        }

        self.docker
            .create_network(CreateNetworkOptions {
                name: network.to_string(),
                driver: "bridge".to_string(),
                ..Default::default()
            })
            .await?;
        info!("Created network");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn connect_network(&self, network: &str, container: &str) -> Result<(), RuntimeError> {
        if self
            .attached_networks(container)
            .await?
            .iter()
            .any(|n| n == network)
        {
            debug!("Container already attached to network");
            return Ok(());
        }

        self.docker
            .connect_network(
                network,
                ConnectNetworkOptions {
                    container: container.to_string(),
                    endpoint_config: EndpointSettings::default(),
                },
            )
            .await?;
        info!("Connected container to network");
        Ok(())
    }

    #[instrument(skip(self, spec), fields(name = %spec.name, port = spec.host_port))]
    async fn create_registry(&self, spec: &RegistryContainerSpec) -> Result<(), RuntimeError> {
        self.docker
            .create_image(
                Some(CreateImageOptions {
                    from_image: spec.image.clone(),
                    ..Default::default()
                }),
                None,
                None,
            )
            .try_collect::<Vec<_>>()
            .await?;

        let container_port = format!("{}/tcp", REGISTRY_CONTAINER_PORT);

        let mut port_bindings = HashMap::new();
        port_bindings.insert(
            container_port.clone(),
            Some(vec![PortBinding {
                host_ip: Some("127.0.0.1".to_string()),
                host_port: Some(spec.host_port.to_string()),
            }]),
        );

        let mut exposed_ports = HashMap::new();
        exposed_ports.insert(container_port, HashMap::new());

        let config = Config {
            image: Some(spec.image.clone()),
            env: Some(spec.env()),
            labels: Some(spec.labels.clone()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(HostConfig {
                port_bindings: Some(port_bindings),
                binds: Some(vec![format!("{}:/var/lib/registry", spec.volume)]),
                restart_policy: Some(RestartPolicy {
                    name: Some(RestartPolicyNameEnum::UNLESS_STOPPED),
                    maximum_retry_count: None,
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        self.docker
            .create_container(
                Some(CreateContainerOptions {
                    name: spec.name.clone(),
                    platform: None,
                }),
                config,
            )
            .await?;
        self.docker
            .start_container(&spec.name, None::<StartContainerOptions<String>>)
            .await?;

        info!("Created registry container");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_container(&self, name: &str, remove_volumes: bool) -> Result<(), RuntimeError> {
        self.docker
            .remove_container(
                name,
                Some(RemoveContainerOptions {
                    force: true,
                    v: remove_volumes,
                    ..Default::default()
                }),
            )
            .await?;

        if remove_volumes {
            match self
                .docker
                .remove_volume(name, None::<RemoveVolumeOptions>)
                .await
            {
                Ok(()) => {}
                Err(BollardError::DockerResponseServerError {
                    status_code: 404, ..
                }) => {}
                Err(e) => return Err(e.into()),
            }
        }

        info!("Removed container");
        Ok(())
    }
}
