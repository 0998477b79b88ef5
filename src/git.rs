use std::path::Path;

use crate::command::{CommandRunner, CommandSpec, RunLimits};
use crate::error::Result;

/// Clone `repo_url` into `dir`. git creates the directory itself.
pub async fn clone_repository(
    runner: &dyn CommandRunner,
    repo_url: &str,
    dir: &Path,
    limits: &RunLimits,
) -> Result<()> {
    let spec = CommandSpec::new("git")
        .arg("clone")
        .arg("--")
        .arg(repo_url)
        .arg(dir.to_string_lossy());
    runner.run(&spec, limits).await
}
