//! Knight Arena Server - Authoritative multiplayer arena server
//!
//! This is the main entry point for the game server. It handles:
//! - WebSocket connections for lobbies and real-time rounds
//! - The global tick loop driving every room
//! - HTTP endpoints for health and the map catalogue

mod app;
mod config;
mod game;
mod http;
mod rooms;
mod util;
mod ws;

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::Config;
use crate::http::build_router;
use crate::rooms::run_tick_loop;
use crate::util::time::{init_server_time, SIMULATION_TPS};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    // Initialize server time tracking
    init_server_time();

    let state = AppState::new(config.clone());

    info!(
        addr = %config.server_addr,
        tps = SIMULATION_TPS,
        maps = state.maps.list().len(),
        max_rooms = config.max_rooms,
        max_players_per_room = config.max_players_per_room,
        input_rate_limit = config.input_rate_limit,
        "Starting Knight Arena server"
    );

    tokio::spawn(run_tick_loop(state.rooms.clone()));

    // Build router
    let router = build_router(state);

    // Start server
    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;

    info!("Listening on {addr}, players connect to ws://{addr}/ws");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Arena server stopped");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
