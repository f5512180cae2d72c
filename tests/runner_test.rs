//! Tests for command execution and output capture

use std::io::Write;

use async_trait::async_trait;
use cluster_provisioner::runner::{
    fatal_exit, BackendCommand, CommandContext, CommandInvocation, CommandIo, CommandRunner,
    RunError,
};

/// What a [`TestCommand`] does when executed
enum Behaviour {
    Print(&'static str),
    FailWithOutput,
    FatalExit(i32),
    Log(&'static str),
    SpawnedLog(&'static str),
    BlockingFatalExit(i32),
    Panic,
    WaitForCancel,
}

struct TestCommand(Behaviour);

#[async_trait]
impl BackendCommand for TestCommand {
    fn describe(&self) -> String {
        "test command".to_string()
    }

    async fn execute(
        &self,
        ctx: &CommandContext,
        _args: &[String],
        mut io: CommandIo,
    ) -> anyhow::Result<()> {
        match self.0 {
            Behaviour::Print(text) => {
                io.stdout.write_all(text.as_bytes())?;
                Ok(())
            }
            Behaviour::FailWithOutput => {
                io.stdout.write_all(b"out\n")?;
                io.stderr.write_all(b"err\n")?;
                anyhow::bail!("E")
            }
            Behaviour::FatalExit(code) => {
                io.stderr.write_all(b"fatal problem\n")?;
                fatal_exit(code)
            }
            Behaviour::Log(message) => {
                tracing::info!("{}", message);
                Ok(())
            }
            Behaviour::SpawnedLog(message) => {
                tokio::spawn(async move { tracing::info!("{}", message) }).await?;
                Ok(())
            }
            Behaviour::BlockingFatalExit(code) => {
                tokio::task::spawn_blocking(move || fatal_exit(code)).await?;
                Ok(())
            }
            Behaviour::Panic => panic!("backend bug"),
            Behaviour::WaitForCancel => {
                ctx.token().cancelled().await;
                anyhow::bail!("cancelled")
            }
        }
    }
}

fn runner() -> CommandRunner {
    CommandRunner::new().with_mirror(false)
}

fn invocation(behaviour: Behaviour) -> CommandInvocation {
    CommandInvocation::new(Box::new(TestCommand(behaviour)), Vec::new())
}

#[tokio::test]
async fn test_stdout_is_captured() {
    let result = runner()
        .run(&CommandContext::new(), invocation(Behaviour::Print("X")))
        .await
        .unwrap();

    assert_eq!(result.stdout, "X");
    assert_eq!(result.stderr, "");
}

#[tokio::test]
async fn test_mirroring_does_not_change_capture() {
    let result = CommandRunner::new()
        .run(&CommandContext::new(), invocation(Behaviour::Print("mirrored\n")))
        .await
        .unwrap();

    assert_eq!(result.stdout, "mirrored\n");
}

#[tokio::test]
async fn test_failure_carries_both_streams() {
    let err = runner()
        .run(&CommandContext::new(), invocation(Behaviour::FailWithOutput))
        .await
        .unwrap_err();

    let message = err.to_string();
    assert!(message.contains('E'));
    assert!(message.contains("out"));
    assert!(message.contains("err"));
    assert_eq!(message, "E: err | out");
}

#[tokio::test]
async fn test_fatal_exit_becomes_error() {
    let err = runner()
        .run(&CommandContext::new(), invocation(Behaviour::FatalExit(1)))
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), Some(1));
    assert!(err.to_string().contains("fatal problem"));

    // The process is still alive and the runner is reusable
    let result = runner()
        .run(&CommandContext::new(), invocation(Behaviour::Print("again")))
        .await
        .unwrap();
    assert_eq!(result.stdout, "again");
}

#[tokio::test]
async fn test_backend_logs_land_in_stderr_capture() {
    let result = runner()
        .run(&CommandContext::new(), invocation(Behaviour::Log("pulling image")))
        .await
        .unwrap();

    assert!(result.stderr.contains("pulling image"));
    assert!(result.stdout.is_empty());
}

#[tokio::test]
async fn test_logs_from_spawned_tasks_are_captured() {
    let result = runner()
        .run(
            &CommandContext::new(),
            invocation(Behaviour::SpawnedLog("worker pulling image")),
        )
        .await
        .unwrap();

    assert!(result.stderr.contains("worker pulling image"));
}

#[tokio::test]
async fn test_fatal_exit_on_blocking_worker_keeps_exit_code() {
    let err = runner()
        .run(&CommandContext::new(), invocation(Behaviour::BlockingFatalExit(1)))
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), Some(1));
}

#[tokio::test]
async fn test_cancellation_surfaces_as_command_error() {
    let ctx = CommandContext::new();
    ctx.cancel();

    let err = runner()
        .run(&ctx, invocation(Behaviour::WaitForCancel))
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::Command(_)));
}

#[tokio::test]
#[should_panic(expected = "backend bug")]
async fn test_foreign_panic_is_reraised() {
    let _ = runner()
        .run(&CommandContext::new(), invocation(Behaviour::Panic))
        .await;
}
