//! In-process stand-in for external tools

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::command::{CommandRunner, CommandSpec, RunLimits};
use crate::error::{CicdError, Result};

/// Records every command instead of running it. `git clone` materializes the
/// fixture files in the target directory; commands whose line starts with a
/// `fail_on` prefix exit with status 1; `hang_on` prefixes never finish on
/// their own and only return once the run's deadline passes or it is cancelled.
#[derive(Default)]
pub struct FakeRunner {
    fixture: Vec<(String, String)>,
    fail_prefixes: Vec<String>,
    hang_prefixes: Vec<String>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, name: &str, contents: &str) -> Self {
        self.fixture.push((name.to_string(), contents.to_string()));
        self
    }

    pub fn fail_on(mut self, prefix: &str) -> Self {
        self.fail_prefixes.push(prefix.to_string());
        self
    }

    pub fn hang_on(mut self, prefix: &str) -> Self {
        self.hang_prefixes.push(prefix.to_string());
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(CommandSpec::command_line).collect()
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.program).collect()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, spec: &CommandSpec, limits: &RunLimits) -> Result<()> {
        self.calls.lock().unwrap().push(spec.clone());
        let line = spec.command_line();

        if self.hang_prefixes.iter().any(|p| line.starts_with(p.as_str())) {
            let deadline = async {
                match limits.deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };
            return Err(tokio::select! {
                () = deadline => CicdError::CommandTimedOut {
                    command: line,
                    elapsed_secs: limits.elapsed_secs(),
                },
                () = limits.cancel.cancelled() => CicdError::CommandCancelled { command: line },
            });
        }

        if self.fail_prefixes.iter().any(|p| line.starts_with(p.as_str())) {
            return Err(CicdError::CommandFailed {
                command: line,
                status: "exit status: 1".to_string(),
            });
        }

        if spec.program == "git" && spec.args.first().map(String::as_str) == Some("clone") {
            if let Some(target) = spec.args.last() {
                let target = PathBuf::from(target);
                std::fs::create_dir_all(&target)?;
                for (name, contents) in &self.fixture {
                    std::fs::write(target.join(name), contents)?;
                }
            }
        }
        Ok(())
    }
}
