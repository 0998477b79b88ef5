use std::io;

use crate::pipeline::Stage;

/// Custom error type for intellibuild_ci operations
#[derive(Debug, thiserror::Error)]
pub enum CicdError {
    #[error("unsupported language or build system")]
    UnsupportedBuildSystem,

    #[error("no test command available for this project")]
    NoTestCommand,

    #[error("Dockerfile not found")]
    DescriptorNotFound,

    #[error("`{command}` exited with {status}")]
    CommandFailed { command: String, status: String },

    #[error("`{command}` failed to start: {source}")]
    CommandSpawnFailed {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` timed out after {elapsed_secs}s")]
    CommandTimedOut { command: String, elapsed_secs: u64 },

    #[error("`{command}` was cancelled")]
    CommandCancelled { command: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParseError(#[from] toml::de::Error),
}

/// A pipeline failure, tagged with the stage that produced it.
#[derive(Debug, thiserror::Error)]
#[error("{}: {source}", .stage.failure_prefix())]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: CicdError,
}

impl StageError {
    pub fn new(stage: Stage, source: CicdError) -> Self {
        Self { stage, source }
    }
}

/// Helper type for Results that use CicdError
pub type Result<T> = std::result::Result<T, CicdError>;
