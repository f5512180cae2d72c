//! Cluster lifecycle provisioners
//!
//! One [`ClusterProvisioner`] per backend:
//! - [`KindProvisioner`]: kind commands, node containers for start/stop
//! - [`K3dProvisioner`]: k3d commands for every operation
//!
//! Provisioners keep no record of clusters; backend output is authoritative.

mod factory;
mod k3d;
mod kind;
mod list;

pub use factory::ProvisionerFactory;
pub use k3d::{K3dCommands, K3dProvisioner, K3D_CLUSTER_LABEL};
pub use kind::{KindCommands, KindProvisioner, KIND_CLUSTER_LABEL, KIND_NETWORK};
pub use list::{parse_list, ListFormat};

use std::future::Future;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::Settings;
use crate::docker::ContainerRuntime;
use crate::error::{ClusterError, ClusterResult, Operation};
use crate::models::{resolve_name, Distribution};
use crate::runner::{
    CommandBuilder, CommandContext, CommandInvocation, CommandResult, CommandRunner,
};

/// Uniform lifecycle contract over all backends
#[async_trait]
pub trait ClusterProvisioner: Send + Sync {
    fn distribution(&self) -> Distribution;

    /// Cluster name embedded in the loaded backend configuration
    fn configured_name(&self) -> &str;

    /// Explicit name wins over the configured one; may be empty
    fn resolve_name(&self, explicit: &str) -> String {
        resolve_name(explicit, self.configured_name())
    }

    async fn create(&self, ctx: &CommandContext, name: &str) -> ClusterResult<()>;

    async fn delete(&self, ctx: &CommandContext, name: &str) -> ClusterResult<()>;

    async fn start(&self, ctx: &CommandContext, name: &str) -> ClusterResult<()>;

    async fn stop(&self, ctx: &CommandContext, name: &str) -> ClusterResult<()>;

    async fn list(&self, ctx: &CommandContext) -> ClusterResult<Vec<String>>;

    /// Whether the resolved cluster appears in [`list`](Self::list).
    /// An empty resolved name is never listed, so no listing is made.
    async fn exists(&self, ctx: &CommandContext, name: &str) -> ClusterResult<bool> {
        let name = self.resolve_name(name);
        if name.is_empty() {
            return Ok(false);
        }
        let clusters = self.list(ctx).await?;
        Ok(clusters.iter().any(|cluster| *cluster == name))
    }
}

/// Knobs shared by every provisioner, taken from [`Settings`]
#[derive(Debug, Clone)]
pub struct ProvisionerOptions {
    pub registry_image: String,
    pub registry_base_port: u16,
    pub delete_registry_volumes: bool,
    pub mirror_output: bool,
}

impl Default for ProvisionerOptions {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for ProvisionerOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            registry_image: settings.registry_image.clone(),
            registry_base_port: settings.registry_base_port,
            delete_registry_volumes: settings.delete_registry_volumes,
            mirror_output: settings.mirror_output,
        }
    }
}

/// Run `fut` and count its outcome under `cluster_operations_total`
pub(crate) async fn observed<T, F>(
    distribution: Distribution,
    operation: Operation,
    fut: F,
) -> ClusterResult<T>
where
    F: Future<Output = ClusterResult<T>>,
{
    let result = fut.await;
    let distribution: &'static str = distribution.into();
    let op: &'static str = operation.into();
    let outcome = if result.is_ok() { "success" } else { "failure" };
    metrics::increment_counter!(
        "cluster_operations_total",
        "distribution" => distribution,
        "operation" => op,
        "outcome" => outcome
    );
    result
}

/// Build a fresh command and run it, tagging failures with `operation`
pub(crate) async fn run_backend(
    runner: &CommandRunner,
    ctx: &CommandContext,
    builder: &CommandBuilder,
    args: Vec<String>,
    operation: Operation,
) -> ClusterResult<CommandResult> {
    let invocation = CommandInvocation::new(builder(), args);
    runner
        .run(ctx, invocation)
        .await
        .map_err(|e| ClusterError::operation(operation, e))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeAction {
    Start,
    Stop,
}

/// Start or stop every container labelled as a node of `cluster`.
///
/// Each container gets exactly one call. The operation fails with
/// `NotFound` when no containers match, and with the first runtime error
/// once all calls were attempted.
pub(crate) async fn toggle_nodes(
    runtime: &dyn ContainerRuntime,
    ctx: &CommandContext,
    label: &str,
    cluster: &str,
    action: NodeAction,
) -> ClusterResult<usize> {
    let nodes = ctx
        .until_cancelled(runtime.list_containers(label, cluster))
        .await
        .ok_or(ClusterError::Cancelled)??;

    if nodes.is_empty() {
        return Err(ClusterError::NotFound(cluster.to_string()));
    }

    let mut first_error = None;
    for node in &nodes {
        let call = async {
            match action {
                NodeAction::Start => runtime.start_container(&node.name).await,
                NodeAction::Stop => runtime.stop_container(&node.name).await,
            }
        };
        match ctx.until_cancelled(call).await {
            Some(Ok(())) => info!(node = %node.name, ?action, "Node container updated"),
            Some(Err(e)) => {
                warn!(node = %node.name, ?action, error = %e, "Node container call failed");
                first_error.get_or_insert(ClusterError::Runtime(e));
            }
            None => return Err(ClusterError::Cancelled),
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(nodes.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::{ContainerInfo, MockContainerRuntime, RuntimeError};
    use bollard::errors::Error as BollardError;

    fn nodes(names: &[&str]) -> Vec<ContainerInfo> {
        names
            .iter()
            .map(|name| ContainerInfo {
                name: name.to_string(),
                ..Default::default()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_toggle_nodes_without_containers_is_not_found() {
        let mut runtime = MockContainerRuntime::new();
        runtime.expect_list_containers().returning(|_, _| Ok(vec![]));

        let err = toggle_nodes(&runtime, &CommandContext::new(), "label", "demo", NodeAction::Start)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_toggle_nodes_calls_each_container_once() {
        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_list_containers()
            .withf(|label, value| label == "io.x-k8s.kind.cluster" && value == "demo")
            .returning(|_, _| Ok(nodes(&["demo-control-plane", "demo-worker", "demo-worker2"])));
        runtime.expect_stop_container().times(3).returning(|_| Ok(()));

        let stopped = toggle_nodes(
            &runtime,
            &CommandContext::new(),
            "io.x-k8s.kind.cluster",
            "demo",
            NodeAction::Stop,
        )
        .await
        .unwrap();
        assert_eq!(stopped, 3);
    }

    #[tokio::test]
    async fn test_toggle_nodes_fails_when_any_call_fails() {
        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_list_containers()
            .returning(|_, _| Ok(nodes(&["a", "b"])));
        runtime
            .expect_start_container()
            .withf(|name| name == "a")
            .times(1)
            .returning(|_| {
                Err(RuntimeError::Api(BollardError::DockerResponseServerError {
                    status_code: 500,
                    message: "cannot start".to_string(),
                }))
            });
        runtime
            .expect_start_container()
            .withf(|name| name == "b")
            .times(1)
            .returning(|_| Ok(()));

        let err = toggle_nodes(&runtime, &CommandContext::new(), "l", "demo", NodeAction::Start)
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::Runtime(_)));
    }
}
