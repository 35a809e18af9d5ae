//! Hover race server binary.
//!
//! Games are created and joined over REST, played over one WebSocket per
//! client, and each simulated by its own 30 Hz task. A background sweep
//! drops players and games that have gone quiet.

mod app;
mod config;
mod game;
mod http;
mod lobby;
mod util;
mod ws;

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::Config;
use crate::http::build_router;
use crate::util::time::init_server_time;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional; real environment wins
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    init_tracing(&config.log_level);
    init_server_time();

    info!(addr = %config.server_addr, max_players = config.max_players_per_game, "Hover race server booting");
    if config.session_secret_generated {
        warn!("SESSION_SECRET not set, player secrets will not survive a restart");
    }

    let state = AppState::new(config.clone());

    // idle player and game sweep, lives as long as the process
    let lobby = state.lobby.clone();
    tokio::spawn(async move {
        lobby.run().await;
    });

    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;
    info!("Accepting games on http://{addr}/games (ws at /games/{{game_id}}/ws)");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Hover race server stopped");
    Ok(())
}

/// `RUST_LOG` takes precedence over the configured level
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Resolves on Ctrl+C or SIGTERM
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
        _ = ctrl_c => info!("Ctrl+C received, draining connections"),
        _ = terminate => info!("SIGTERM received, draining connections"),
    }
}
