//! SCOREKEEPER — points, bets and player loans for a card-game table
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores the table from disk (or seats a fresh dealer), and serves the
//! JSON API until Ctrl+C.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use scorekeeper::api;
use scorekeeper::config::{AppConfig, DEFAULT_CONFIG_FILE};
use scorekeeper::engine::session::{GameDefaults, Session};
use scorekeeper::storage::{JsonFileStore, MemoryStore, StateStore};

const BANNER: &str = r#"
 ____                     _
/ ___|  ___ ___  _ __ ___| | _____  ___ _ __   ___ _ __
\___ \ / __/ _ \| '__/ _ \ |/ / _ \/ _ \ '_ \ / _ \ '__|
 ___) | (_| (_) | | |  __/   <  __/  __/ |_) |  __/ |
|____/ \___\___/|_|  \___|_|\_\___|\___| .__/ \___|_|
                                       |_|
  Points, bets and loans for the card table
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    init_logging();

    let config_path =
        std::env::var("SCOREKEEPER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
    let cfg = if std::path::Path::new(&config_path).exists() {
        AppConfig::load(&config_path)?
    } else {
        warn!(path = %config_path, "Config file not found, using built-in defaults");
        AppConfig::default()
    };

    println!("{BANNER}");
    info!(
        persist = cfg.session.persist,
        state_file = %cfg.session.state_file,
        dealer_starting_points = cfg.session.dealer_starting_points,
        starting_points = cfg.defaults.starting_points,
        "SCOREKEEPER starting up"
    );

    // -- Restore or create the table -------------------------------------

    let store: Box<dyn StateStore> = if cfg.session.persist {
        Box::new(JsonFileStore::new(&cfg.session.state_file))
    } else {
        warn!("Persistence disabled, the table will be lost on exit");
        Box::new(MemoryStore::default())
    };
    let session = Session::open(store, GameDefaults::from(&cfg))
        .context("Failed to open the saved table")?;
    let state = Arc::new(Mutex::new(session));

    // -- Serve -----------------------------------------------------------

    if cfg.server.enabled {
        let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port)
            .parse()
            .with_context(|| {
                format!("Invalid server address {}:{}", cfg.server.host, cfg.server.port)
            })?;
        info!("Serving the table. Press Ctrl+C to stop.");
        api::serve(state.clone(), addr, shutdown_signal()).await?;
    } else {
        info!("API server disabled. Press Ctrl+C to stop.");
        shutdown_signal().await;
    }

    let session = state.lock().await;
    let game = session.state();
    info!(
        round = game.round,
        players = game.players.len(),
        dealer_points = game.dealer.points,
        active_loans = game.active_loans().count(),
        "SCOREKEEPER shut down cleanly."
    );

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
        return;
    }
    info!("Shutdown signal received.");
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("scorekeeper=info"));

    let json_logging = std::env::var("SCOREKEEPER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
