//! API — local Axum server exposing the table operations as JSON.
//!
//! A front end calls these endpoints and re-renders from the returned
//! state. CORS is open so a page served from elsewhere on the machine can
//! reach it.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, Method},
    routing::{delete, get, post, put},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub use routes::AppState;

/// Serve the API on `addr` until `shutdown` resolves.
pub async fn serve(
    state: AppState,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind API address {addr}"))?;
    info!(%addr, "API server listening on http://{addr}");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;
    Ok(())
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(routes::health))
        .route("/api/state", get(routes::get_state))
        // Roster
        .route("/api/players", post(routes::add_player))
        .route("/api/players/:id", delete(routes::remove_player))
        .route("/api/players/:id/bet", put(routes::set_bet))
        // Settlement
        .route("/api/settle/winner", post(routes::settle_winner))
        .route("/api/settle/players/:id/loss", post(routes::settle_player_loss))
        .route("/api/settle/players/:id/win", post(routes::settle_player_win))
        .route("/api/settle/dealer", post(routes::settle_dealer))
        .route("/api/bets/reset", post(routes::reset_bets))
        // Loans and rounds
        .route("/api/loans", post(routes::create_loan))
        .route("/api/loans/active", get(routes::get_active_loans))
        .route("/api/loans/paid", get(routes::get_paid_loans))
        .route("/api/loans/quote", get(routes::quote_loan))
        .route("/api/loans/:id/repay", post(routes::repay_loan))
        .route("/api/rounds/advance", post(routes::advance_round))
        .route("/api/game/reset", post(routes::new_game))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
