//! Backend command objects and their execution context

use std::future::Future;
use std::io::Write;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::capture::CaptureWriter;

/// Execution context threaded into every backend call
#[derive(Debug, Clone, Default)]
pub struct CommandContext {
    token: CancellationToken,
}

impl CommandContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context driven by an existing token
    pub fn with_token(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Drive `fut` to completion unless the context is cancelled first
    pub async fn until_cancelled<F, T>(&self, fut: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            value = fut => Some(value),
        }
    }
}

/// Output sinks injected into a backend command
pub struct CommandIo {
    pub stdout: CaptureWriter,
    pub stderr: CaptureWriter,
}

/// A backend's command logic, invoked in-process by the runner
#[async_trait]
pub trait BackendCommand: Send + Sync {
    /// Command path used in logs and error messages, e.g. `k3d cluster list`
    fn describe(&self) -> String;

    /// Execute with the given arguments, writing output to `io`
    async fn execute(&self, ctx: &CommandContext, args: &[String], io: CommandIo) -> Result<()>;
}

/// Constructor for a fresh command object per invocation
pub type CommandBuilder = Arc<dyn Fn() -> Box<dyn BackendCommand> + Send + Sync>;

/// A command object plus its arguments. Built for a single run.
pub struct CommandInvocation {
    pub command: Box<dyn BackendCommand>,
    pub args: Vec<String>,
}

impl CommandInvocation {
    pub fn new(command: Box<dyn BackendCommand>, args: Vec<String>) -> Self {
        Self { command, args }
    }
}

/// Runs a backend binary with a fixed subcommand path
#[derive(Debug, Clone)]
pub struct ExternalCommand {
    program: String,
    subcommand: Vec<String>,
}

impl ExternalCommand {
    pub fn new(program: impl Into<String>, subcommand: &[&str]) -> Self {
        Self {
            program: program.into(),
            subcommand: subcommand.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Builder producing this command fresh for every invocation
    pub fn builder(program: &str, subcommand: &[&str]) -> CommandBuilder {
        let template = Self::new(program, subcommand);
        Arc::new(move || Box::new(template.clone()) as Box<dyn BackendCommand>)
    }
}

#[async_trait]
impl BackendCommand for ExternalCommand {
    fn describe(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.subcommand.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    async fn execute(&self, ctx: &CommandContext, args: &[String], io: CommandIo) -> Result<()> {
        debug!(command = %self.describe(), ?args, "Spawning backend process");

        let mut child = Command::new(&self.program)
            .args(&self.subcommand)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to execute {}", self.program))?;

        let stdout = child.stdout.take().context("child stdout not captured")?;
        let stderr = child.stderr.take().context("child stderr not captured")?;

        let run = async {
            let (out, err, status) = tokio::join!(
                forward(stdout, io.stdout),
                forward(stderr, io.stderr),
                child.wait()
            );
            out?;
            err?;
            Ok::<_, anyhow::Error>(status?)
        };

        let status = match ctx.until_cancelled(run).await {
            Some(status) => status?,
            None => bail!("{} cancelled", self.describe()),
        };

        if !status.success() {
            bail!("{} failed: {}", self.describe(), status);
        }
        Ok(())
    }
}

async fn forward<R>(mut reader: R, mut writer: CaptureWriter) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        writer.write_all(&buf[..n])?;
    }
}
