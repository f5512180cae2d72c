//! k3d backend

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};

use super::{
    observed, parse_list, run_backend, ClusterProvisioner, ListFormat, ProvisionerOptions,
};
use crate::docker::ContainerRuntime;
use crate::error::{ClusterError, ClusterResult, Operation};
use crate::models::{Distribution, K3dConfig, DEFAULT_K3D_NAME};
use crate::registry::{
    build_registry_infos, parse_registries_yaml, RegistryInfo, RegistryMirrorManager,
};
use crate::runner::{CommandBuilder, CommandContext, CommandRunner, ExternalCommand};

/// Label k3d puts on every node container
pub const K3D_CLUSTER_LABEL: &str = "k3d.cluster";
const REGISTRY_PREFIX: &str = "k3d-";

/// Command constructors for each k3d operation
#[derive(Clone)]
pub struct K3dCommands {
    pub create: CommandBuilder,
    pub delete: CommandBuilder,
    pub start: CommandBuilder,
    pub stop: CommandBuilder,
    pub list: CommandBuilder,
}

impl K3dCommands {
    /// Commands backed by the k3d binary
    pub fn external(binary: &str) -> Self {
        Self {
            create: ExternalCommand::builder(binary, &["cluster", "create"]),
            delete: ExternalCommand::builder(binary, &["cluster", "delete"]),
            start: ExternalCommand::builder(binary, &["cluster", "start"]),
            stop: ExternalCommand::builder(binary, &["cluster", "stop"]),
            list: ExternalCommand::builder(binary, &["cluster", "list"]),
        }
    }
}

impl Default for K3dCommands {
    fn default() -> Self {
        Self::external("k3d")
    }
}

pub struct K3dProvisioner {
    config: K3dConfig,
    config_path: Option<PathBuf>,
    commands: K3dCommands,
    runner: CommandRunner,
    mirrors: RegistryMirrorManager,
    options: ProvisionerOptions,
}

impl K3dProvisioner {
    pub fn new(
        config: K3dConfig,
        runtime: Arc<dyn ContainerRuntime>,
        options: ProvisionerOptions,
    ) -> Self {
        Self {
            config,
            config_path: None,
            commands: K3dCommands::default(),
            runner: CommandRunner::new().with_mirror(options.mirror_output),
            mirrors: RegistryMirrorManager::new(runtime, options.registry_image.clone()),
            options,
        }
    }

    /// Pass `--config <path>` on create, and on delete without a name
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn with_commands(mut self, commands: K3dCommands) -> Self {
        self.commands = commands;
        self
    }

    pub fn config(&self) -> &K3dConfig {
        &self.config
    }

    /// Registry mirrors declared in the embedded `registries.yaml`
    pub fn registries(&self) -> Vec<RegistryInfo> {
        let specs = parse_registries_yaml(&self.config.registries.config);
        build_registry_infos(
            &specs,
            REGISTRY_PREFIX,
            self.options.registry_base_port,
            &HashSet::new(),
        )
    }

    /// Network k3d creates for a cluster
    fn network(name: &str) -> String {
        let name = if name.is_empty() { DEFAULT_K3D_NAME } else { name };
        format!("k3d-{}", name)
    }

    fn config_args(&self, args: &mut Vec<String>) {
        if let Some(path) = &self.config_path {
            args.push("--config".to_string());
            args.push(path.display().to_string());
        }
    }

    async fn toggle(
        &self,
        ctx: &CommandContext,
        name: &str,
        builder: &CommandBuilder,
        operation: Operation,
    ) -> ClusterResult<()> {
        let name = self.resolve_name(name);
        let args = if name.is_empty() {
            Vec::new()
        } else {
            vec![name.clone()]
        };

        run_backend(&self.runner, ctx, builder, args, operation).await?;
        info!(cluster = %name, "{} finished", operation);
        Ok(())
    }
}

#[async_trait]
impl ClusterProvisioner for K3dProvisioner {
    fn distribution(&self) -> Distribution {
        Distribution::K3d
    }

    fn configured_name(&self) -> &str {
        &self.config.metadata.name
    }

    #[instrument(skip(self, ctx))]
    async fn create(&self, ctx: &CommandContext, name: &str) -> ClusterResult<()> {
        observed(Distribution::K3d, Operation::Create, async {
            let name = self.resolve_name(name);

            let mut args = Vec::new();
            self.config_args(&mut args);
            if !name.is_empty() {
                args.push(name.clone());
            }

            run_backend(&self.runner, ctx, &self.commands.create, args, Operation::Create).await?;

            self.mirrors
                .setup(ctx, &self.registries(), &Self::network(&name))
                .await
                .map_err(|e| ClusterError::operation(Operation::Create, e))?;

            info!(cluster = %name, "Cluster created");
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, ctx))]
    async fn delete(&self, ctx: &CommandContext, name: &str) -> ClusterResult<()> {
        observed(Distribution::K3d, Operation::Delete, async {
            let name = self.resolve_name(name);

            let mut args = Vec::new();
            if name.is_empty() {
                self.config_args(&mut args);
            } else {
                args.push(name.clone());
            }

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
        observed(
            Distribution::K3d,
            Operation::Start,
            self.toggle(ctx, name, &self.commands.start, Operation::Start),
        )
        .await
    }

    #[instrument(skip(self, ctx))]
    async fn stop(&self, ctx: &CommandContext, name: &str) -> ClusterResult<()> {
        observed(
            Distribution::K3d,
            Operation::Stop,
            self.toggle(ctx, name, &self.commands.stop, Operation::Stop),
        )
        .await
    }

    #[instrument(skip(self, ctx))]
    async fn list(&self, ctx: &CommandContext) -> ClusterResult<Vec<String>> {
        observed(Distribution::K3d, Operation::List, async {
            let args = vec!["-o".to_string(), "json".to_string()];
            let output =
                run_backend(&self.runner, ctx, &self.commands.list, args, Operation::List).await?;
            parse_list(ListFormat::Json, &output.stdout)
                .map_err(|e| ClusterError::operation(Operation::List, e))
        })
        .await
    }
}
