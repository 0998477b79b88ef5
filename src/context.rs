use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::PipelineConfig;

/// Per-request state threaded through every pipeline stage.
///
/// The run id seeds both the working directory and the image tag, so two
/// pipelines running at the same time never share either.
#[derive(Debug)]
pub struct BuildContext {
    pub run_id: String,
    pub repo_url: String,
    pub image_tag: String,
    work_dir: WorkDir,
}

impl BuildContext {
    pub fn new(repo_url: impl Into<String>, config: &PipelineConfig) -> Self {
        let run_id = Uuid::now_v7().to_string();
        let work_dir = config.workspace_root().join(format!("repo-{}", run_id));
        let image_tag = format!("{}:{}", config.image_name, run_id);

        Self {
            work_dir: WorkDir::new(work_dir, config.keep_workspaces),
            image_tag,
            repo_url: repo_url.into(),
            run_id,
        }
    }

    pub fn work_dir(&self) -> &Path {
        self.work_dir.path()
    }

    /// Remove the working directory without blocking the runtime.
    pub async fn cleanup(mut self) {
        self.work_dir.remove().await;
    }
}

/// Working directory of one run.
///
/// [`WorkDir::remove`] deletes it on the async path; if the owner is dropped
/// first (request aborted mid-run) `Drop` removes it synchronously instead.
#[derive(Debug)]
pub struct WorkDir {
    path: PathBuf,
    keep: bool,
    removed: bool,
}

impl WorkDir {
    pub fn new(path: PathBuf, keep: bool) -> Self {
        Self {
            path,
            keep,
            removed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn remove(&mut self) {
        if self.keep || self.removed {
            return;
        }
        self.removed = true;
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => debug!("Removed working directory {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove working directory {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if self.keep || self.removed || !self.path.exists() {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!("Removed working directory {}", self.path.display()),
            Err(e) => warn!(
                "Failed to remove working directory {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}
