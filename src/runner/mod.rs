//! Command execution with output capture
//!
//! The runner invokes a backend's command logic in-process while:
//! - capturing stdout/stderr through injected capture pipes
//! - mirroring both streams live to the real console
//! - forwarding the backend's `tracing` output into the stderr capture,
//!   both on the calling task and process-wide through [`RoutedWriter`]
//! - converting a backend's fatal-exit request into a [`RunError`]

mod capture;
mod command;
mod fatal;
mod route;

pub use capture::{CaptureWriter, Stream};
pub use command::{
    BackendCommand, CommandBuilder, CommandContext, CommandInvocation, CommandIo, ExternalCommand,
};
pub use fatal::{fatal_exit, replace_exit_handler, ExitHandler};
pub use route::{RoutedTarget, RoutedWriter};

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::instrument::WithSubscriber;
use tracing::{debug, instrument};
use tracing_subscriber::EnvFilter;

use capture::CapturePipe;
use fatal::InterceptGuard;
use route::RouteGuard;

/// Console redirection and the exit handler are process-wide, so only one
/// run may be active at a time.
static RUN_LOCK: Mutex<()> = Mutex::const_new(());

/// Captured output of one command invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    /// True when either stream carries non-whitespace output
    pub fn has_output(&self) -> bool {
        !self.stdout.trim().is_empty() || !self.stderr.trim().is_empty()
    }
}

/// Errors produced by [`CommandRunner::run`]
#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to set up output capture: {0}")]
    Setup(#[from] tokio::runtime::TryCurrentError),

    #[error(transparent)]
    Command(anyhow::Error),

    #[error("backend requested process exit with code {code}")]
    FatalExit { code: i32 },

    #[error("{source}: {stderr} | {stdout}")]
    WithOutput {
        source: Box<RunError>,
        stdout: String,
        stderr: String,
    },
}

impl RunError {
    /// Attach trimmed output snippets when there is anything to show
    pub fn with_output(self, result: &CommandResult) -> Self {
        if !result.has_output() {
            return self;
        }
        RunError::WithOutput {
            source: Box::new(self),
            stdout: result.stdout.trim().to_string(),
            stderr: result.stderr.trim().to_string(),
        }
    }

    /// Exit code requested by the backend, if this run ended in a fatal exit
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            RunError::FatalExit { code } => Some(*code),
            RunError::WithOutput { source, .. } => source.exit_code(),
            _ => None,
        }
    }
}

/// Executes backend commands, capturing and mirroring their output
#[derive(Debug, Clone)]
pub struct CommandRunner {
    mirror: bool,
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self { mirror: true }
    }
}

impl CommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable live mirroring to the console
    pub fn with_mirror(mut self, mirror: bool) -> Self {
        self.mirror = mirror;
        self
    }

    /// Run one invocation to completion.
    ///
    /// On success the captured output is returned. On failure the error is
    /// enriched with the captured output when either stream is non-empty.
    /// Panics other than an intercepted fatal exit propagate unchanged.
    #[instrument(skip_all, fields(command = %invocation.command.describe()))]
    pub async fn run(
        &self,
        ctx: &CommandContext,
        invocation: CommandInvocation,
    ) -> Result<CommandResult, RunError> {
        tokio::runtime::Handle::try_current()?;
        route::ensure_process_logger();
        let _exclusive = RUN_LOCK.lock().await;

        let CommandInvocation { command, args } = invocation;
        debug!(?args, "Running backend command");

        let stdout = CapturePipe::open(Stream::Stdout, self.mirror);
        let stderr = CapturePipe::open(Stream::Stderr, self.mirror);
        let logger = forwarding_logger(stderr.writer());
        let route = RouteGuard::install(stderr.writer());
        let intercept = InterceptGuard::install();

        let io = CommandIo {
            stdout: stdout.writer(),
            stderr: stderr.writer(),
        };
        let outcome = AssertUnwindSafe(
            command
                .execute(ctx, &args, io)
                .with_subscriber(logger),
        )
        .catch_unwind()
        .await;

        let result = CommandResult {
            stdout: stdout.finish().await,
            stderr: stderr.finish().await,
        };
        route.restore();
        let requested_exit = intercept.restore();

        // An exit requested off the polled task surfaces here only as an
        // ordinary outcome, so the recorded code takes precedence
        let error = match (outcome, requested_exit) {
            (Err(payload), requested) => match fatal::classify(payload) {
                Ok(exit) => RunError::FatalExit { code: exit.code },
                Err(other) => match requested {
                    Some(code) => RunError::FatalExit { code },
                    None => std::panic::resume_unwind(other),
                },
            },
            (Ok(_), Some(code)) => RunError::FatalExit { code },
            (Ok(Ok(())), None) => return Ok(result),
            (Ok(Err(err)), None) => RunError::Command(err),
        };

        debug!(error = %error, "Backend command failed");
        Err(error.with_output(&result))
    }
}

/// Scoped subscriber writing formatted backend log lines into the capture
fn forwarding_logger(writer: CaptureWriter) -> tracing::Dispatch {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .finish();
    tracing::Dispatch::new(subscriber)
}
