//! External process execution
//!
//! Every tool the pipeline drives (git, build toolchains, docker, trivy) goes
//! through a [`CommandRunner`]. Output is inherited from the service process,
//! so tool logs land on the server's own stdout/stderr.

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{CicdError, Result};

/// A single external command: program, arguments and optional working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Full command line, e.g. `go build ./...`
    pub fn command_line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Bounds applied to every command of one pipeline run.
#[derive(Debug, Clone)]
pub struct RunLimits {
    pub deadline: Option<Instant>,
    pub cancel: CancellationToken,
    started: Instant,
}

impl RunLimits {
    pub fn new(deadline: Option<Instant>, cancel: CancellationToken) -> Self {
        Self {
            deadline,
            cancel,
            started: Instant::now(),
        }
    }

    /// No deadline, never cancelled.
    pub fn unbounded() -> Self {
        Self::new(None, CancellationToken::new())
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `spec` to completion. Non-zero exit, spawn failure, deadline and
    /// cancellation are all reported as errors.
    async fn run(&self, spec: &CommandSpec, limits: &RunLimits) -> Result<()>;
}

/// Runs commands as child processes of the service.
#[derive(Debug, Default, Clone)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, spec: &CommandSpec, limits: &RunLimits) -> Result<()> {
        let command_line = spec.command_line();
        match &spec.current_dir {
            Some(dir) => info!("Running (cwd = '{}'): {}", dir.display(), command_line),
            None => info!("Running: {}", command_line),
        }

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        // Own process group, so the tool's workers can be killed with it.
        #[cfg(unix)]
        cmd.process_group(0);
        if let Some(dir) = &spec.current_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            error!("{} failed to start: {}", command_line, e);
            CicdError::CommandSpawnFailed {
                command: command_line.clone(),
                source: e,
            }
        })?;
        let mut group = ProcessGroup::of(&child);

        let deadline = async {
            match limits.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        let interrupted = tokio::select! {
            status = child.wait() => {
                group.disarm();
                let status = status?;
                if status.success() {
                    return Ok(());
                }
                error!("{} failed: {}", command_line, status);
                return Err(CicdError::CommandFailed {
                    command: command_line,
                    status: status.to_string(),
                });
            }
            () = deadline => Interrupted::TimedOut,
            () = limits.cancel.cancelled() => Interrupted::Cancelled,
        };

        group.kill();
        if let Err(e) = child.wait().await {
            warn!("Failed to reap {}: {}", command_line, e);
        }

        match interrupted {
            Interrupted::TimedOut => {
                error!("{} timed out", command_line);
                Err(CicdError::CommandTimedOut {
                    command: command_line,
                    elapsed_secs: limits.elapsed_secs(),
                })
            }
            Interrupted::Cancelled => {
                error!("{} cancelled", command_line);
                Err(CicdError::CommandCancelled { command: command_line })
            }
        }
    }
}

enum Interrupted {
    TimedOut,
    Cancelled,
}

/// Process group led by a spawned child. Killed on drop unless disarmed, which
/// covers the request future being dropped mid-command.
struct ProcessGroup {
    pgid: Option<i32>,
}

impl ProcessGroup {
    fn of(child: &Child) -> Self {
        Self {
            pgid: child.id().and_then(|id| i32::try_from(id).ok()),
        }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }

    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_process_group(pgid);
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: i32) {
    // SAFETY: a negative pid addresses the group the child was spawned into
    // with `process_group(0)`; SIGKILL takes no other resources.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        debug!(
            "Process group {} already gone: {}",
            pgid,
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: i32) {}
