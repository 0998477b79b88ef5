//! Health and status endpoints

use axum::{Json, extract::State as AxumState};
use serde::Serialize;

use crate::{PipelineConfig, SharedState};

#[derive(Debug, Serialize)]
pub struct ServerStats {
    pub name: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub started_at: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub server: ServerStats,
    pub pipeline: PipelineConfig,
}

/// GET / - liveness check
pub async fn root() -> &'static str {
    "intellibuild_ci - healthy"
}

/// GET /status - server uptime and effective pipeline settings
pub async fn status(AxumState(state): AxumState<SharedState>) -> Json<StatusResponse> {
    let mut pipeline = state.config.pipeline.clone();
    pipeline.workspace_root = Some(pipeline.workspace_root());

    Json(StatusResponse {
        server: ServerStats {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.start_time.elapsed().as_secs(),
            started_at: state.started_at.to_rfc3339(),
        },
        pipeline,
    })
}
