//! HTTP trigger server.
//!
//! In server mode the controller exposes a single GET endpoint that runs
//! one processing pass. The core assumes at most one active pass, so
//! overlapping triggers are rejected with `409 Conflict` instead of being
//! queued; the label mutex on the platform protects against other
//! instances.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use tokio::sync::Mutex;

use crate::config::Config;
use crate::core::runner;

struct AppState {
    config: Config,
    running: Mutex<()>,
}

/// Serves the trigger endpoint until the process is stopped.
pub async fn serve(config: Config) -> Result<()> {
    let port = config.server.port;
    let state = Arc::new(AppState {
        config,
        running: Mutex::new(()),
    });

    let app = Router::new().route("/", get(trigger)).with_state(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;
    tracing::info!(port, "listening for triggers");

    axum::serve(listener, app)
        .await
        .context("trigger server terminated")?;
    Ok(())
}

async fn trigger(State(state): State<Arc<AppState>>) -> Response {
    // Reject overlapping triggers: one pass at a time per instance.
    let Ok(_guard) = state.running.try_lock() else {
        tracing::warn!("a processing pass is already running");
        return (
            StatusCode::CONFLICT,
            "A processing pass is already running.\n",
        )
            .into_response();
    };

    match runner::run_once(&state.config).await {
        Ok(()) => (StatusCode::OK, "Scheduled.\n").into_response(),
        Err(err) => {
            tracing::error!(error = %err, "processing pass failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Report error.\n").into_response()
        }
    }
}
