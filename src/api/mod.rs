//! API module for all HTTP handlers

pub mod stats;
pub mod webhook;

use axum::{Router, http::StatusCode, routing};

use crate::SharedState;

pub use stats::{root, status};
pub use webhook::handle_webhook;

/// Build the application router.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", routing::get(root))
        .route("/status", routing::get(status))
        .route(
            "/webhook",
            routing::post(handle_webhook).fallback(method_not_allowed),
        )
        .with_state(state)
}

async fn method_not_allowed() -> (StatusCode, &'static str) {
    (StatusCode::METHOD_NOT_ALLOWED, "Invalid request method")
}
