use intellibuild_ci::api::router;
use intellibuild_ci::command::SystemCommandRunner;
use intellibuild_ci::error::CicdError;
use intellibuild_ci::logging::setup_logging;
use intellibuild_ci::{AppState, CICDConfig, load_config};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{self, info};

const DEFAULT_CONFIG_PATH: &str = "ci_config.toml";

/// `CI_CONFIG` must point at a readable file; the default path is optional.
fn resolve_config() -> Result<(CICDConfig, Option<String>), CicdError> {
    if let Ok(path) = std::env::var("CI_CONFIG") {
        let config = load_config(&path)?;
        return Ok((config, Some(path)));
    }
    if Path::new(DEFAULT_CONFIG_PATH).exists() {
        let config = load_config(DEFAULT_CONFIG_PATH)?;
        return Ok((config, Some(DEFAULT_CONFIG_PATH.to_string())));
    }
    Ok((CICDConfig::default(), None))
}

async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received, cancelling running pipelines");
    token.cancel();
}

async fn run() -> Result<(), CicdError> {
    dotenv::dotenv().ok();

    let (mut config, config_path) = resolve_config()?;
    if let Ok(bind_address) = std::env::var("BIND_ADDRESS") {
        config.server.bind_address = bind_address;
    }

    let _log_guard = setup_logging(&config.logging)?;

    let bind_address = config.server.bind_address.clone();
    let state = Arc::new(AppState::new(config, Arc::new(SystemCommandRunner)));
    let shutdown = state.shutdown.clone();
    let app = router(state);

    info!("Listening on {}", bind_address);
    match &config_path {
        Some(path) => info!("Using config at {:?}", path),
        None => info!("No config file found, using defaults"),
    }

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
