//! kind backend
//!
//! kind has no start/stop command, so those operations act on the node
//! containers directly. Mirrors come from `containerdConfigPatches`.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};

use super::{
    observed, parse_list, run_backend, toggle_nodes, ClusterProvisioner, ListFormat, NodeAction,
    ProvisionerOptions,
};
use crate::docker::ContainerRuntime;
use crate::error::{ClusterError, ClusterResult, Operation};
use crate::models::{Distribution, KindConfig};
use crate::registry::{
    build_registry_infos, parse_containerd_patches, RegistryInfo, RegistryMirrorManager,
};
use crate::runner::{CommandBuilder, CommandContext, CommandRunner, ExternalCommand};

/// Label kind puts on every node container
pub const KIND_CLUSTER_LABEL: &str = "io.x-k8s.kind.cluster";
/// Network kind attaches all clusters to
pub const KIND_NETWORK: &str = "kind";
/// Printed by `kind get clusters` when nothing exists
const NO_CLUSTERS_SENTINEL: &str = "No kind clusters found.";
const REGISTRY_PREFIX: &str = "kind-";

/// Command constructors for each kind operation
#[derive(Clone)]
pub struct KindCommands {
    pub create: CommandBuilder,
    pub delete: CommandBuilder,
    pub list: CommandBuilder,
}

impl KindCommands {
    /// Commands backed by the kind binary
    pub fn external(binary: &str) -> Self {
        Self {
            create: ExternalCommand::builder(binary, &["create", "cluster"]),
            delete: ExternalCommand::builder(binary, &["delete", "cluster"]),
            list: ExternalCommand::builder(binary, &["get", "clusters"]),
        }
    }
}

impl Default for KindCommands {
    fn default() -> Self {
        Self::external("kind")
    }
}

pub struct KindProvisioner {
    config: KindConfig,
    config_path: Option<PathBuf>,
    kubeconfig: Option<PathBuf>,
    commands: KindCommands,
    runner: CommandRunner,
    runtime: Arc<dyn ContainerRuntime>,
    mirrors: RegistryMirrorManager,
    options: ProvisionerOptions,
}

impl KindProvisioner {
    pub fn new(
        config: KindConfig,
        runtime: Arc<dyn ContainerRuntime>,
        options: ProvisionerOptions,
    ) -> Self {
        Self {
            config,
            config_path: None,
            kubeconfig: None,
            commands: KindCommands::default(),
            runner: CommandRunner::new().with_mirror(options.mirror_output),
            mirrors: RegistryMirrorManager::new(runtime.clone(), options.registry_image.clone()),
            runtime,
            options,
        }
    }

    /// Pass `--config <path>` on create
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Pass `--kubeconfig <path>` on create and delete
    pub fn with_kubeconfig(mut self, path: impl Into<PathBuf>) -> Self {
        self.kubeconfig = Some(path.into());
        self
    }

    pub fn with_commands(mut self, commands: KindCommands) -> Self {
        self.commands = commands;
        self
    }

    pub fn config(&self) -> &KindConfig {
        &self.config
    }

    /// Registry mirrors declared in the containerd patches
    pub fn registries(&self) -> Vec<RegistryInfo> {
        let specs = parse_containerd_patches(&self.config.containerd_config_patches);
        build_registry_infos(
            &specs,
            REGISTRY_PREFIX,
            self.options.registry_base_port,
            &HashSet::new(),
        )
    }

    fn kubeconfig_args(&self, args: &mut Vec<String>) {
        if let Some(path) = &self.kubeconfig {
            args.push("--kubeconfig".to_string());
            args.push(path.display().to_string());
        }
    }

    fn name_args(name: &str, args: &mut Vec<String>) {
        if !name.is_empty() {
            args.push("--name".to_string());
            args.push(name.to_string());
        }
    }

    async fn toggle(&self, ctx: &CommandContext, name: &str, operation: Operation) -> ClusterResult<()> {
        let name = self.resolve_name(name);
        if name.is_empty() {
            return Err(ClusterError::operation(operation, ClusterError::NameRequired));
        }

        let action = match operation {
            Operation::Stop => NodeAction::Stop,
            _ => NodeAction::Start,
        };
        let count = toggle_nodes(self.runtime.as_ref(), ctx, KIND_CLUSTER_LABEL, &name, action)
            .await
            .map_err(|e| ClusterError::operation(operation, e))?;

        info!(cluster = %name, nodes = count, "{} finished", operation);
        Ok(())
    }
}

#[async_trait]
impl ClusterProvisioner for KindProvisioner {
    fn distribution(&self) -> Distribution {
        Distribution::Kind
    }

    fn configured_name(&self) -> &str {
        &self.config.name
    }

    #[instrument(skip(self, ctx))]
    async fn create(&self, ctx: &CommandContext, name: &str) -> ClusterResult<()> {
        observed(Distribution::Kind, Operation::Create, async {
            let name = self.resolve_name(name);

            let mut args = Vec::new();
            Self::name_args(&name, &mut args);
            if let Some(path) = &self.config_path {
                args.push("--config".to_string());
                args.push(path.display().to_string());
            }
            self.kubeconfig_args(&mut args);

            run_backend(&self.runner, ctx, &self.commands.create, args, Operation::Create).await?;

            self.mirrors
                .setup(ctx, &self.registries(), KIND_NETWORK)
                .await
                .map_err(|e| ClusterError::operation(Operation::Create, e))?;

            info!(cluster = %name, "Cluster created");
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, ctx))]
    async fn delete(&self, ctx: &CommandContext, name: &str) -> ClusterResult<()> {
        observed(Distribution::Kind, Operation::Delete, async {
            let name = self.resolve_name(name);

            let mut args = Vec::new();
            Self::name_args(&name, &mut args);
            self.kubeconfig_args(&mut args);

            run_backend(&self.runner, ctx, &self.commands.delete, args, Operation::Delete).await?;

            self.mirrors
                .cleanup(ctx, &self.registries(), self.options.delete_registry_volumes)
                .await;

            info!(cluster = %name, "Cluster deleted");
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, ctx))]
    async fn start(&self, ctx: &CommandContext, name: &str) -> ClusterResult<()> {
        observed(Distribution::Kind, Operation::Start, self.toggle(ctx, name, Operation::Start)).await
    }

    #[instrument(skip(self, ctx))]
    async fn stop(&self, ctx: &CommandContext, name: &str) -> ClusterResult<()> {
        observed(Distribution::Kind, Operation::Stop, self.toggle(ctx, name, Operation::Stop)).await
    }

    #[instrument(skip(self, ctx))]
    async fn list(&self, ctx: &CommandContext) -> ClusterResult<Vec<String>> {
        observed(Distribution::Kind, Operation::List, async {
            let output =
                run_backend(&self.runner, ctx, &self.commands.list, Vec::new(), Operation::List)
                    .await?;
            parse_list(
                ListFormat::Lines {
                    sentinel: NO_CLUSTERS_SENTINEL,
                },
                &output.stdout,
            )
            .map_err(|e| ClusterError::operation(Operation::List, e))
        })
        .await
    }
}
