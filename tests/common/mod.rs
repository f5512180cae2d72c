//! Shared test doubles
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cluster_provisioner::docker::{
    ContainerInfo, ContainerRuntime, RegistryContainerSpec, RuntimeError,
};
use cluster_provisioner::runner::{BackendCommand, CommandBuilder, CommandContext, CommandIo};

/// In-memory container runtime recording every call
#[derive(Default)]
pub struct FakeRuntime {
    pub nodes: Mutex<HashMap<String, Vec<ContainerInfo>>>,
    pub containers: Mutex<HashSet<String>>,
    pub calls: Mutex<Vec<String>>,
    pub created: Mutex<Vec<RegistryContainerSpec>>,
}

impl FakeRuntime {
    pub fn with_nodes(cluster: &str, names: &[&str]) -> Self {
        let runtime = Self::default();
        let nodes = names
            .iter()
            .map(|name| ContainerInfo {
                name: name.to_string(),
                ..Default::default()
            })
            .collect();
        runtime
            .nodes
            .lock()
            .unwrap()
            .insert(cluster.to_string(), nodes);
        runtime
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_containers(
        &self,
        _label: &str,
        value: &str,
    ) -> Result<Vec<ContainerInfo>, RuntimeError> {
        self.record(format!("list {}", value));
        Ok(self
            .nodes
            .lock()
            .unwrap()
            .get(value)
            .cloned()
            .unwrap_or_default())
    }

    async fn container_exists(&self, name: &str) -> Result<bool, RuntimeError> {
        Ok(self.containers.lock().unwrap().contains(name))
    }

    async fn start_container(&self, name: &str) -> Result<(), RuntimeError> {
        self.record(format!("start {}", name));
        Ok(())
    }

    async fn stop_container(&self, name: &str) -> Result<(), RuntimeError> {
        self.record(format!("stop {}", name));
        Ok(())
    }

    async fn ensure_network(&self, network: &str) -> Result<(), RuntimeError> {
        self.record(format!("network {}", network));
        Ok(())
    }

    async fn connect_network(&self, network: &str, container: &str) -> Result<(), RuntimeError> {
        self.record(format!("connect {} {}", network, container));
        Ok(())
    }

    async fn create_registry(&self, spec: &RegistryContainerSpec) -> Result<(), RuntimeError> {
        self.record(format!("create {}", spec.name));
        self.containers.lock().unwrap().insert(spec.name.clone());
        self.created.lock().unwrap().push(spec.clone());
        Ok(())
    }

    async fn remove_container(&self, name: &str, _remove_volumes: bool) -> Result<(), RuntimeError> {
        self.record(format!("remove {}", name));
        self.containers.lock().unwrap().remove(name);
        Ok(())
    }
}

/// Backend command that records its arguments and prints canned output
#[derive(Clone, Default)]
pub struct RecordingCommand {
    pub calls: Arc<Mutex<Vec<Vec<String>>>>,
    pub stdout: Arc<Mutex<String>>,
}

impl RecordingCommand {
    pub fn printing(stdout: &str) -> Self {
        let cmd = Self::default();
        cmd.set_stdout(stdout);
        cmd
    }

    pub fn set_stdout(&self, stdout: &str) {
        *self.stdout.lock().unwrap() = stdout.to_string();
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn builder(&self) -> CommandBuilder {
        let cmd = self.clone();
        Arc::new(move || Box::new(cmd.clone()) as Box<dyn BackendCommand>)
    }
}

#[async_trait]
impl BackendCommand for RecordingCommand {
    fn describe(&self) -> String {
        "recording".to_string()
    }

    async fn execute(
        &self,
        _ctx: &CommandContext,
        args: &[String],
        mut io: CommandIo,
    ) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(args.to_vec());
        let stdout = self.stdout.lock().unwrap().clone();
        io.stdout.write_all(stdout.as_bytes())?;
        Ok(())
    }
}
