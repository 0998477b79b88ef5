//! Container image build and vulnerability scan

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::command::{CommandRunner, CommandSpec, RunLimits};
use crate::context::BuildContext;
use crate::error::{CicdError, Result};

pub const DOCKERFILE: &str = "Dockerfile";

const REMOVE_TIMEOUT: Duration = Duration::from_secs(60);

/// Build the image for `ctx`, tagged with its per-run tag.
pub async fn build_image(
    runner: &dyn CommandRunner,
    ctx: &BuildContext,
    limits: &RunLimits,
) -> Result<()> {
    if !ctx.work_dir().join(DOCKERFILE).is_file() {
        return Err(CicdError::DescriptorNotFound);
    }

    let spec = CommandSpec::new("docker")
        .args(["build", "-t"])
        .arg(ctx.image_tag.as_str())
        .arg(ctx.work_dir().to_string_lossy());
    runner.run(&spec, limits).await
}

/// Scan `image_tag` with trivy. With `severity` set, any finding at those
/// levels makes trivy exit non-zero.
pub async fn scan_image(
    runner: &dyn CommandRunner,
    image_tag: &str,
    severity: Option<&str>,
    limits: &RunLimits,
) -> Result<()> {
    let mut spec = CommandSpec::new("trivy").args(["image", "--no-progress"]);
    if let Some(severity) = severity {
        spec = spec.args(["--exit-code", "1", "--severity", severity]);
    }
    let spec = spec.arg(image_tag);
    runner.run(&spec, limits).await
}

/// Remove the per-run image from the local store. Only logged on failure, the
/// run's outcome is already decided by then.
pub async fn remove_image(runner: &dyn CommandRunner, image_tag: &str) {
    let spec = CommandSpec::new("docker").args(["rmi", image_tag]);
    // Separate limits: runs even when the pipeline hit its deadline or was cancelled.
    let limits = RunLimits::new(Some(Instant::now() + REMOVE_TIMEOUT), CancellationToken::new());
    match runner.run(&spec, &limits).await {
        Ok(()) => debug!("Removed image {}", image_tag),
        Err(e) => warn!("Failed to remove image {}: {}", image_tag, e),
    }
}
