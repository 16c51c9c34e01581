// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::session_engine::{EngineSettings, SessionEngine};
use crate::infrastructure::config::load_console_config;
use crate::infrastructure::http_device_client::HttpDeviceClient;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    connect, disconnect, export_session, health_check, send_command, session_view,
    start_logging, stop_logging,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("telemetry_console=info,tower_http=info")),
        )
        .init();

    // Load configuration
    let config = load_console_config()?;

    // Device client (infrastructure layer)
    let client = Arc::new(HttpDeviceClient::new(
        config.device.status_path.clone(),
        config.device.command_path.clone(),
    ));

    // Session engine (application layer)
    let engine = SessionEngine::new(client, EngineSettings::from_config(&config));
    spawn_status_watcher(&engine);

    if let Some(settings) = &config.device.auto_connect {
        let target = settings.to_target()?;
        if let Err(e) = engine.connect(target).await {
            tracing::warn!("Auto-connect failed: {}", e);
        }
    }

    let state = Arc::new(AppState {
        engine: engine.clone(),
    });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/session", get(session_view))
        .route("/session/connect", post(connect))
        .route("/session/disconnect", post(disconnect))
        .route("/session/command", post(send_command))
        .route("/session/logging/start", post(start_logging))
        .route("/session/logging/stop", post(stop_logging))
        .route("/session/export", post(export_session))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = config.server.bind.parse()?;
    tracing::info!("Starting telemetry console on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Releases the log file if a session is still running
    engine.shutdown().await;
    tracing::info!("Telemetry console stopped");

    Ok(())
}

/// Log connection status transitions as they are published.
fn spawn_status_watcher(engine: &SessionEngine) {
    let mut rx = engine.subscribe();
    tokio::spawn(async move {
        let mut last = rx.borrow().status;
        while rx.changed().await.is_ok() {
            let status = rx.borrow().status;
            if status != last {
                tracing::info!("Session status: {} -> {}", last.label(), status.label());
                last = status;
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
