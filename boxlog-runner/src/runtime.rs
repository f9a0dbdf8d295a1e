//! Container runtime management
//!
//! Drives a Docker-compatible CLI (docker or podman) for the workload's lifecycle:
//! - Checking the runtime is reachable
//! - Pulling the image, creating and starting the container
//! - Following the container's combined output
//! - Waiting for exit, stopping and removing the container

use anyhow::{Context, Result};
use async_trait::async_trait;
use boxlog_core::domain::workload::{WorkloadId, WorkloadSpec};
use std::pin::Pin;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{self, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info};
use uuid::Uuid;

/// Byte stream of a workload's combined output
pub type OutputStream = Box<dyn AsyncRead + Send + Unpin>;

/// Operations the workload controller needs from the execution environment
///
/// No call is retried by the caller.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Pulls the image so that `create_workload` does not block on it
    async fn pull_image(&self, image: &str) -> Result<()>;

    /// Creates the container for `spec` without starting it
    async fn create_workload(&self, spec: &WorkloadSpec) -> Result<WorkloadId>;

    async fn start_workload(&self, id: &WorkloadId) -> Result<()>;

    /// Follows the workload's output from the beginning until it exits
    async fn stream_output(&self, id: &WorkloadId) -> Result<OutputStream>;

    /// Resolves with the exit code once the workload stops
    async fn wait_for_exit(&self, id: &WorkloadId) -> Result<i64>;

    async fn stop_workload(&self, id: &WorkloadId, grace: Duration) -> Result<()>;

    async fn remove_workload(&self, id: &WorkloadId, force: bool) -> Result<()>;

    /// Releases the client; later calls fail
    async fn release(&self) -> Result<()>;
}

/// Docker-compatible CLI runtime
pub struct CliRuntime {
    program: String,
    closed: AtomicBool,
}

impl CliRuntime {
    /// Connects to the runtime behind `program`
    ///
    /// Fails if the program is missing or its daemon/service does not answer.
    pub async fn connect(program: impl Into<String>) -> Result<Self> {
        let runtime = Self {
            program: program.into(),
            closed: AtomicBool::new(false),
        };

        let version = runtime
            .exec(&["version", "--format", "{{.Client.Version}}"])
            .await
            .with_context(|| format!("'{}' is not reachable. Is it installed and running?", runtime.program))?;
        info!("{} is available: {}", runtime.program, version);

        Ok(runtime)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            anyhow::bail!("{} client is closed", self.program);
        }
        Ok(())
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut command = Command::new(&self.program);
        command.args(args).stdin(Stdio::null()).kill_on_drop(true);
        command
    }

    /// Runs one CLI invocation to completion and returns its trimmed stdout
    async fn exec(&self, args: &[&str]) -> Result<String> {
        self.ensure_open()?;

        let subcommand = args.first().copied().unwrap_or_default();
        let output = self
            .command(args)
            .output()
            .await
            .with_context(|| format!("Failed to execute '{} {}'", self.program, subcommand))?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !stdout.is_empty() {
            debug!("{} {} stdout: {}", self.program, subcommand, stdout);
        }
        if !stderr.is_empty() {
            debug!("{} {} stderr: {}", self.program, subcommand, stderr);
        }

        if !output.status.success() {
            let exit_code = output.status.code().unwrap_or(-1);
            anyhow::bail!(
                "'{} {}' failed: exit_code={}, stderr='{}'",
                self.program,
                subcommand,
                exit_code,
                stderr
            );
        }

        Ok(stdout)
    }
}

#[async_trait]
impl ContainerRuntime for CliRuntime {
    async fn pull_image(&self, image: &str) -> Result<()> {
        info!("Pulling image {}", image);
        self.exec(&["pull", "--quiet", image]).await?;
        Ok(())
    }

    async fn create_workload(&self, spec: &WorkloadSpec) -> Result<WorkloadId> {
        let name = format!("boxlog-{}", Uuid::new_v4());

        // TTY merges stderr into stdout; the shell entrypoint handles images
        // that ship their own entrypoint.
        let stdout = self
            .exec(&[
                "create",
                "--tty",
                "--name",
                &name,
                "--entrypoint",
                "/bin/sh",
                &spec.image,
                "-c",
                &spec.command,
            ])
            .await?;

        let id = stdout
            .lines()
            .last()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| anyhow::anyhow!("'{} create' printed no container id", self.program))?;

        info!("Created container {} ({})", name, id);
        Ok(WorkloadId::new(id))
    }

    async fn start_workload(&self, id: &WorkloadId) -> Result<()> {
        self.exec(&["start", id.as_str()]).await?;
        Ok(())
    }

    async fn stream_output(&self, id: &WorkloadId) -> Result<OutputStream> {
        self.ensure_open()?;

        let mut child = self
            .command(&["logs", "--follow", id.as_str()])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to execute '{} logs'", self.program))?;

        let stdout = child
            .stdout
            .take()
            .context("log follower has no stdout pipe")?;

        Ok(Box::new(FollowedOutput {
            _child: child,
            stdout,
        }))
    }

    async fn wait_for_exit(&self, id: &WorkloadId) -> Result<i64> {
        let stdout = self.exec(&["wait", id.as_str()]).await?;
        stdout
            .lines()
            .last()
            .unwrap_or_default()
            .trim()
            .parse::<i64>()
            .with_context(|| format!("Unexpected output from '{} wait': '{}'", self.program, stdout))
    }

    async fn stop_workload(&self, id: &WorkloadId, grace: Duration) -> Result<()> {
        let secs = grace_secs(grace).to_string();
        self.exec(&["stop", "-t", &secs, id.as_str()]).await?;
        debug!("Container {} stopped", id.short());
        Ok(())
    }

    async fn remove_workload(&self, id: &WorkloadId, force: bool) -> Result<()> {
        if force {
            self.exec(&["rm", "--force", id.as_str()]).await?;
        } else {
            self.exec(&["rm", id.as_str()]).await?;
        }
        debug!("Container {} removed", id.short());
        Ok(())
    }

    async fn release(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            anyhow::bail!("{} client already closed", self.program);
        }
        debug!("{} client released", self.program);
        Ok(())
    }
}

/// Whole seconds for `stop -t`, rounded up so a short grace is never zero
fn grace_secs(grace: Duration) -> u64 {
    grace.as_secs() + u64::from(grace.subsec_nanos() > 0)
}

/// Stdout of a `logs --follow` process; the process is killed when dropped
struct FollowedOutput {
    _child: Child,
    stdout: ChildStdout,
}

impl AsyncRead for FollowedOutput {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stdout).poll_read(cx, buf)
    }
}
