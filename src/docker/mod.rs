//! Container runtime integration
//!
//! Used for the operations a backend exposes no command for:
//! - starting and stopping cluster node containers
//! - running registry mirror containers and wiring them into networks

mod client;
mod types;

#[cfg(test)]
pub use client::MockContainerRuntime;
pub use client::{ContainerRuntime, DockerRuntime, RuntimeError};
pub use types::{ContainerInfo, RegistryContainerSpec, REGISTRY_CONTAINER_PORT};
