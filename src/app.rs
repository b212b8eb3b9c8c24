use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::api;
use crate::config::Config;
use crate::idle::ActivityTracker;
use crate::inference::holder::ModelHolder;
use crate::inference::vllm::VllmLoader;
use crate::state::AppState;

/// Runs the gateway against a vLLM engine until shutdown.
pub async fn run(config: Config) -> Result<()> {
    config.validate()?;
    info!(
        model = %config.model_id,
        gpu_class = %config.gpu_class,
        engine_url = %config.engine_url,
        launch_engine = config.launch_engine,
        "Starting OCR gateway"
    );

    let holder = ModelHolder::new(VllmLoader::new(config.clone()));
    start(&config, holder).await
}

/// Preloads the model when configured to, then binds the listener and serves.
///
/// A failed preload aborts before the listener is bound.
pub async fn start(config: &Config, holder: ModelHolder) -> Result<()> {
    let state = AppState::new(holder, config.request_timeout());

    if config.preload {
        state
            .holder
            .initialize()
            .await
            .context("Model failed to load before accepting traffic")?;
    }

    let listener = TcpListener::bind(format!("{}:{}", config.address, config.port)).await?;
    serve(state, listener, config.max_body_bytes, config.idle_timeout()).await
}

/// Serves the API on `listener` until Ctrl+C or until no scan has run for
/// `idle_timeout`.
pub async fn serve(
    state: AppState,
    listener: TcpListener,
    max_body_bytes: usize,
    idle_timeout: Option<Duration>,
) -> Result<()> {
    info!("Listening on {}", listener.local_addr()?);

    let router = api::router(state.clone(), max_body_bytes);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(
            Arc::clone(&state.activity),
            idle_timeout,
        ))
        .await?;

    info!(loads = state.holder.loads(), "Gateway stopped");
    Ok(())
}

async fn shutdown_signal(activity: Arc<ActivityTracker>, idle_timeout: Option<Duration>) {
    let idle = async {
        match idle_timeout {
            Some(timeout) => activity.idle_reached(timeout).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => info!("Shutting down..."),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        },
        () = idle => info!("Shutting down idle gateway..."),
    }
}
