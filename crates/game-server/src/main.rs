//! Team Arena game server
//!
//! # Servers
//!
//! - WebSocket server for players (default: 0.0.0.0:8080)
//! - HTTP server for health and metrics (default: 0.0.0.0:8081)
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize Prometheus metrics recorder
//! 3. Start the game server (registry actor + WebSocket acceptor)
//! 4. Start health HTTP server (liveness, readiness, metrics)
//! 5. Wait for shutdown signal; readiness drops as soon as draining starts

#![warn(clippy::pedantic)]
#![allow(clippy::too_many_lines)] // main.rs orchestrates startup, naturally longer

use std::time::Duration;

use axum::Router;
use game_server::config::Config;
use game_server::observability::{health_router, init_metrics_recorder};
use game_server::server::GameServer;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "game_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting game server");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        server_id = %config.server_id,
        bind_address = %config.bind_address,
        health_bind_address = %config.health_bind_address,
        max_players_per_team = config.max_players_per_team,
        handshake_timeout_seconds = config.handshake_timeout_seconds,
        shutdown_timeout_seconds = config.shutdown_timeout_seconds,
        "Configuration loaded successfully"
    );

    // Must happen before any metrics are recorded
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;
    info!("Prometheus metrics recorder initialized");

    let server = GameServer::start(&config).await.map_err(|e| {
        error!(error = %e, addr = %config.bind_address, "Failed to start game server");
        e
    })?;
    info!(addr = %server.local_addr(), "Game server started");

    let shutdown_token = CancellationToken::new();

    let metrics_router = Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let handle = prometheus_handle.clone();
            async move { handle.render() }
        }),
    );

    let app = health_router(server.health())
        .merge(metrics_router)
        .layer(TraceLayer::new_for_http());

    // Bind listener BEFORE spawning to fail fast on bind errors
    let health_addr = config.health_bind_address;
    let health_listener = tokio::net::TcpListener::bind(health_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %health_addr, "Failed to bind health server");
            format!("Failed to bind health server to {health_addr}: {e}")
        })?;

    let health_shutdown_token = shutdown_token.child_token();
    tokio::spawn(async move {
        info!(addr = %health_addr, "Health server starting");
        let server = axum::serve(health_listener, app).with_graceful_shutdown(async move {
            health_shutdown_token.cancelled().await;
            info!("Health server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "Health server failed");
        }
    });

    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");

    if let Err(e) = server
        .shutdown(Duration::from_secs(config.shutdown_timeout_seconds))
        .await
    {
        warn!(error = %e, "Game server shutdown error");
    }

    shutdown_token.cancel();

    info!("Game server shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(clippy::expect_used, reason = "Signal handler installation failure is unrecoverable")]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(clippy::expect_used, reason = "Signal handler installation failure is unrecoverable")]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
