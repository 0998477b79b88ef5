//! Webhook handler for push events

use axum::{
    body::Bytes,
    extract::State as AxumState,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::SharedState;
use crate::command::RunLimits;
use crate::context::BuildContext;
use crate::error::StageError;
use crate::pipeline::run_pipeline;
use crate::webhook::PushPayload;

pub const SUCCESS_BODY: &str = "CI/CD pipeline executed successfully";

/// Everything the webhook can answer with other than success.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Repository URL not found")]
    MissingRepoUrl,

    #[error(transparent)]
    Pipeline(#[from] StageError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::MissingRepoUrl => StatusCode::BAD_REQUEST,
            WebhookError::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// Handles the webhook POST request: runs the whole pipeline and reports the
/// outcome in the response.
pub async fn handle_webhook(
    AxumState(state): AxumState<SharedState>,
    body: Bytes,
) -> Result<(StatusCode, &'static str), WebhookError> {
    let payload = match PushPayload::parse(&body) {
        Ok(payload) => payload,
        Err(e) => {
            info!("Could not parse JSON body: {:?}", e);
            return Err(WebhookError::MissingRepoUrl);
        }
    };
    debug!("{:#?}", &payload);

    let Some(repo_url) = payload.repository_url() else {
        error!("No repository URL in webhook payload");
        return Err(WebhookError::MissingRepoUrl);
    };

    let pipeline = &state.config.pipeline;
    let ctx = BuildContext::new(repo_url, pipeline);
    info!(
        "Created run {} for '{}' (repository {:?}, branch {:?}, commit {:?})",
        ctx.run_id,
        ctx.repo_url,
        payload.repository_name(),
        payload.branch(),
        payload.head_commit()
    );

    let limits = RunLimits::new(
        pipeline.timeout().map(|timeout| Instant::now() + timeout),
        state.shutdown.child_token(),
    );
    let result = run_pipeline(state.runner.as_ref(), &ctx, pipeline, &limits).await;
    ctx.cleanup().await;
    result?;

    Ok((StatusCode::OK, SUCCESS_BODY))
}
