//! API route handlers.
//!
//! All endpoints speak JSON. The session sits behind one mutex, so calls
//! are applied strictly one at a time.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::engine::events::LedgerEvent;
use crate::engine::loans::LoanView;
use crate::engine::session::{LoanRequest, Session};
use crate::types::{AccountId, ErrorKind, GameState, LedgerError, LoanId, Points};

pub type AppState = Arc<Mutex<Session>>;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AddPlayerRequest {
    pub name: String,
    #[serde(default)]
    pub points: Option<Points>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BetRequest {
    pub amount: Points,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WinnerRequest {
    pub winner: AccountId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuoteParams {
    pub amount: Points,
    #[serde(default)]
    pub interest_rate: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuoteResponse {
    pub amount: Points,
    pub interest_rate: Decimal,
    pub repayment_total: Points,
}

/// Reply to every accepted mutation: the notification, the event behind
/// it, and the table as it now stands.
#[derive(Debug, Clone, Serialize)]
pub struct OperationResponse {
    pub message: String,
    pub event: LedgerEvent,
    pub state: GameState,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A rejected operation, rendered as a status code plus message.
#[derive(Debug)]
pub struct ApiError(LedgerError);

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.kind() {
            ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Persistence => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorResponse {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type OperationResult = Result<Json<OperationResponse>, ApiError>;

fn respond(session: &Session, event: LedgerEvent) -> Json<OperationResponse> {
    Json(OperationResponse {
        message: event.to_string(),
        event,
        state: session.state().clone(),
    })
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// GET /api/state
pub async fn get_state(State(state): State<AppState>) -> Json<GameState> {
    let session = state.lock().await;
    Json(session.state().clone())
}

/// POST /api/players
pub async fn add_player(
    State(state): State<AppState>,
    Json(req): Json<AddPlayerRequest>,
) -> OperationResult {
    let mut session = state.lock().await;
    let event = session.add_player(&req.name, req.points)?;
    Ok(respond(&session, event))
}

/// DELETE /api/players/:id
pub async fn remove_player(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> OperationResult {
    let mut session = state.lock().await;
    let event = session.remove_player(&AccountId::from(id))?;
    Ok(respond(&session, event))
}

/// PUT /api/players/:id/bet
pub async fn set_bet(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<BetRequest>,
) -> OperationResult {
    let mut session = state.lock().await;
    let event = session.set_bet(&AccountId::from(id), req.amount)?;
    Ok(respond(&session, event))
}

/// POST /api/settle/winner
pub async fn settle_winner(
    State(state): State<AppState>,
    Json(req): Json<WinnerRequest>,
) -> OperationResult {
    let mut session = state.lock().await;
    let event = session.settle_winner_takes_all(&req.winner)?;
    Ok(respond(&session, event))
}

/// POST /api/settle/players/:id/loss
pub async fn settle_player_loss(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> OperationResult {
    let mut session = state.lock().await;
    let event = session.settle_player_loss(&AccountId::from(id))?;
    Ok(respond(&session, event))
}

/// POST /api/settle/players/:id/win
pub async fn settle_player_win(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> OperationResult {
    let mut session = state.lock().await;
    let event = session.settle_player_win(&AccountId::from(id))?;
    Ok(respond(&session, event))
}

/// POST /api/settle/dealer
pub async fn settle_dealer(State(state): State<AppState>) -> OperationResult {
    let mut session = state.lock().await;
    let event = session.settle_dealer_collects_all()?;
    Ok(respond(&session, event))
}

/// POST /api/bets/reset
pub async fn reset_bets(State(state): State<AppState>) -> OperationResult {
    let mut session = state.lock().await;
    let event = session.reset_bets()?;
    Ok(respond(&session, event))
}

/// GET /api/loans/active
pub async fn get_active_loans(State(state): State<AppState>) -> Json<Vec<LoanView>> {
    let session = state.lock().await;
    Json(session.active_loans())
}

/// GET /api/loans/paid
pub async fn get_paid_loans(State(state): State<AppState>) -> Json<Vec<LoanView>> {
    let session = state.lock().await;
    Json(session.paid_loans())
}

/// GET /api/loans/quote
pub async fn quote_loan(
    State(state): State<AppState>,
    Query(params): Query<QuoteParams>,
) -> Result<Json<QuoteResponse>, ApiError> {
    let session = state.lock().await;
    let interest_rate = params
        .interest_rate
        .unwrap_or(session.defaults().interest_rate);
    let repayment_total = session.repayment_total(params.amount, Some(interest_rate))?;
    Ok(Json(QuoteResponse {
        amount: params.amount,
        interest_rate,
        repayment_total,
    }))
}

/// POST /api/loans
pub async fn create_loan(
    State(state): State<AppState>,
    Json(req): Json<LoanRequest>,
) -> OperationResult {
    let mut session = state.lock().await;
    let event = session.create_loan(req)?;
    Ok(respond(&session, event))
}

/// POST /api/loans/:id/repay
pub async fn repay_loan(State(state): State<AppState>, Path(id): Path<u64>) -> OperationResult {
    let mut session = state.lock().await;
    let event = session.repay_loan_in_full(LoanId(id))?;
    Ok(respond(&session, event))
}

/// POST /api/rounds/advance
pub async fn advance_round(State(state): State<AppState>) -> OperationResult {
    let mut session = state.lock().await;
    let event = session.advance_round()?;
    Ok(respond(&session, event))
}

/// POST /api/game/reset
pub async fn new_game(State(state): State<AppState>) -> OperationResult {
    let mut session = state.lock().await;
    let event = session.new_game()?;
    Ok(respond(&session, event))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
