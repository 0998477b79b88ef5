pub mod api;
pub mod command;
pub mod context;
pub mod docker;
pub mod error;
pub mod git;
pub mod logging;
pub mod pipeline;
pub mod project;
pub mod webhook;

#[cfg(test)]
pub(crate) mod testing;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::command::CommandRunner;
use crate::error::CicdError;

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";
pub const DEFAULT_IMAGE_NAME: &str = "myapp";
pub const DEFAULT_TIMEOUT_SECS: u64 = 3600;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct CICDConfig {
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PipelineConfig {
    /// Parent directory for per-run checkouts. Defaults to the system temp dir.
    pub workspace_root: Option<PathBuf>,
    pub image_name: String,
    /// Deadline for a whole pipeline run; 0 disables it.
    pub timeout_secs: u64,
    pub keep_workspaces: bool,
    /// Leave the per-run image in the local docker store after the scan.
    pub keep_images: bool,
    /// Severities passed to trivy; when set, findings fail the scan.
    pub scan_severity: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workspace_root: None,
            image_name: DEFAULT_IMAGE_NAME.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            keep_workspaces: false,
            keep_images: false,
            scan_severity: None,
        }
    }
}

impl PipelineConfig {
    pub fn workspace_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Directory for daily-rotated log files; console only when unset.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            directory: None,
        }
    }
}

/// Load and parse a configuration file
pub fn load_config(path: impl AsRef<Path>) -> Result<CICDConfig, CicdError> {
    let path = path.as_ref();
    let config_str = std::fs::read_to_string(path).map_err(|e| {
        CicdError::ConfigError(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    parse_config(&config_str).map_err(|e| {
        CicdError::ConfigError(format!(
            "Failed to parse config file '{}': {}",
            path.display(),
            e
        ))
    })
}

pub fn parse_config(config_str: &str) -> Result<CICDConfig, CicdError> {
    Ok(toml::from_str(config_str)?)
}

pub struct AppState {
    pub config: CICDConfig,
    pub runner: Arc<dyn CommandRunner>,
    /// Cancelled on shutdown; aborts every running pipeline.
    pub shutdown: CancellationToken,
    pub start_time: Instant,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: CICDConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            config,
            runner,
            shutdown: CancellationToken::new(),
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<AppState>;
