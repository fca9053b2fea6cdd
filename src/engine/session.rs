//! Session — one table, its store, and its subscribers.
//!
//! Every mutating call is applied to the ledger, written through to the
//! store and announced on the event channel. If the write fails the
//! ledger is rolled back to its previous snapshot, so memory and storage
//! never disagree and a failed call has no effect at all.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use super::events::LedgerEvent;
use super::loans::{quote_repayment, LoanTerms, LoanView};
use super::settlement::SettlementKind;
use super::Ledger;
use crate::config::AppConfig;
use crate::storage::StateStore;
use crate::types::{AccountId, GameState, LedgerError, LoanId, Points, DEFAULT_DEALER_POINTS};

/// Buffered events per subscriber before the slowest one starts lagging.
const EVENT_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Values used when a caller leaves an argument out.
#[derive(Debug, Clone, PartialEq)]
pub struct GameDefaults {
    pub dealer_starting_points: Points,
    pub starting_points: Points,
    pub loan_amount: Points,
    pub interest_rate: Decimal,
    pub duration_rounds: u64,
}

impl Default for GameDefaults {
    fn default() -> Self {
        Self {
            dealer_starting_points: DEFAULT_DEALER_POINTS,
            starting_points: 100,
            loan_amount: 50,
            interest_rate: dec!(10),
            duration_rounds: 5,
        }
    }
}

impl From<&AppConfig> for GameDefaults {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            dealer_starting_points: cfg.session.dealer_starting_points,
            starting_points: cfg.defaults.starting_points,
            loan_amount: cfg.defaults.loan_amount,
            interest_rate: cfg.defaults.interest_rate,
            duration_rounds: cfg.defaults.duration_rounds,
        }
    }
}

/// A loan request where everything but the parties may be left to the
/// table defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoanRequest {
    pub lender: AccountId,
    pub borrower: AccountId,
    #[serde(default)]
    pub amount: Option<Points>,
    #[serde(default)]
    pub interest_rate: Option<Decimal>,
    #[serde(default)]
    pub duration_rounds: Option<u64>,
}

impl LoanRequest {
    pub fn new(lender: AccountId, borrower: AccountId) -> Self {
        Self {
            lender,
            borrower,
            amount: None,
            interest_rate: None,
            duration_rounds: None,
        }
    }

    fn into_terms(self, defaults: &GameDefaults) -> LoanTerms {
        LoanTerms {
            lender: self.lender,
            borrower: self.borrower,
            amount: self.amount.unwrap_or(defaults.loan_amount),
            interest_rate: self.interest_rate.unwrap_or(defaults.interest_rate),
            duration_rounds: self.duration_rounds.unwrap_or(defaults.duration_rounds),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct Session {
    ledger: Ledger,
    store: Box<dyn StateStore>,
    defaults: GameDefaults,
    events: broadcast::Sender<LedgerEvent>,
}

impl Session {
    /// Restore the table from `store`, or seat a lone dealer if nothing was
    /// saved yet.
    pub fn open(store: Box<dyn StateStore>, defaults: GameDefaults) -> Result<Self, LedgerError> {
        let ledger = match store.load()? {
            Some(state) => {
                let ledger = Ledger::from_state(state)?;
                info!(state = %ledger.state(), "Resumed saved table");
                ledger
            }
            None => {
                let ledger = Ledger::new(defaults.dealer_starting_points);
                info!(dealer_points = defaults.dealer_starting_points, "Fresh table");
                ledger
            }
        };
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            ledger,
            store,
            defaults,
            events,
        })
    }

    // -- Queries --

    pub fn state(&self) -> &GameState {
        self.ledger.state()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn defaults(&self) -> &GameDefaults {
        &self.defaults
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    pub fn active_loans(&self) -> Vec<LoanView> {
        self.ledger
            .active_loans()
            .into_iter()
            .map(|loan| self.ledger.loan_view(loan))
            .collect()
    }

    pub fn paid_loans(&self) -> Vec<LoanView> {
        self.ledger
            .paid_loans()
            .into_iter()
            .map(|loan| self.ledger.loan_view(loan))
            .collect()
    }

    /// What a loan of `amount` would cost to repay, at the default rate
    /// unless one is given. Terms a loan could not be issued with are
    /// refused.
    pub fn repayment_total(
        &self,
        amount: Points,
        interest_rate: Option<Decimal>,
    ) -> Result<Points, LedgerError> {
        quote_repayment(amount, interest_rate.unwrap_or(self.defaults.interest_rate))
    }

    // -- Roster --

    pub fn add_player(
        &mut self,
        name: &str,
        points: Option<Points>,
    ) -> Result<LedgerEvent, LedgerError> {
        let points = points.unwrap_or(self.defaults.starting_points);
        self.commit("add_player", |ledger| {
            let id = ledger.add_player(name, points)?;
            let name = ledger.state().account_name(&id).to_string();
            Ok(LedgerEvent::PlayerJoined { id, name, points })
        })
    }

    pub fn remove_player(&mut self, id: &AccountId) -> Result<LedgerEvent, LedgerError> {
        self.commit("remove_player", |ledger| {
            let removed = ledger.remove_player(id)?;
            Ok(LedgerEvent::PlayerRemoved {
                id: removed.id,
                name: removed.name,
            })
        })
    }

    pub fn set_bet(
        &mut self,
        player: &AccountId,
        amount: Points,
    ) -> Result<LedgerEvent, LedgerError> {
        self.commit("set_bet", |ledger| {
            ledger.set_bet(player, amount)?;
            Ok(LedgerEvent::BetPlaced {
                player: player.clone(),
                amount,
            })
        })
    }

    // -- Settlement --

    pub fn settle_winner_takes_all(
        &mut self,
        winner: &AccountId,
    ) -> Result<LedgerEvent, LedgerError> {
        self.commit("settle_winner_takes_all", |ledger| {
            Ok(LedgerEvent::Settled {
                kind: SettlementKind::WinnerTakesAll,
                settlement: ledger.settle_winner_takes_all(winner)?,
            })
        })
    }

    pub fn settle_player_loss(&mut self, player: &AccountId) -> Result<LedgerEvent, LedgerError> {
        self.commit("settle_player_loss", |ledger| {
            Ok(LedgerEvent::Settled {
                kind: SettlementKind::PlayerLoss,
                settlement: ledger.settle_player_loss(player)?,
            })
        })
    }

    pub fn settle_player_win(&mut self, player: &AccountId) -> Result<LedgerEvent, LedgerError> {
        self.commit("settle_player_win", |ledger| {
            Ok(LedgerEvent::Settled {
                kind: SettlementKind::PlayerWin,
                settlement: ledger.settle_player_win(player)?,
            })
        })
    }

    pub fn settle_dealer_collects_all(&mut self) -> Result<LedgerEvent, LedgerError> {
        self.commit("settle_dealer_collects_all", |ledger| {
            Ok(LedgerEvent::Settled {
                kind: SettlementKind::DealerCollectsAll,
                settlement: ledger.settle_dealer_collects_all()?,
            })
        })
    }

    pub fn reset_bets(&mut self) -> Result<LedgerEvent, LedgerError> {
        self.commit("reset_bets", |ledger| {
            Ok(LedgerEvent::BetsReset {
                cleared: ledger.reset_bets(),
            })
        })
    }

    // -- Loans & rounds --

    pub fn create_loan(&mut self, request: LoanRequest) -> Result<LedgerEvent, LedgerError> {
        let terms = request.into_terms(&self.defaults);
        self.commit("create_loan", |ledger| {
            let id = ledger.create_loan(terms)?;
            let loan = ledger
                .state()
                .loan(id)
                .cloned()
                .ok_or(LedgerError::LoanNotFound(id))?;
            Ok(LedgerEvent::LoanCreated { loan })
        })
    }

    pub fn repay_loan(
        &mut self,
        loan_id: LoanId,
        borrower: &AccountId,
        lender: &AccountId,
        total_amount: Points,
    ) -> Result<LedgerEvent, LedgerError> {
        self.commit("repay_loan", |ledger| {
            let repayment = ledger.repay_loan(loan_id, borrower, lender, total_amount)?;
            Ok(LedgerEvent::LoanRepaid { repayment })
        })
    }

    pub fn repay_loan_in_full(&mut self, loan_id: LoanId) -> Result<LedgerEvent, LedgerError> {
        self.commit("repay_loan", |ledger| {
            let repayment = ledger.repay_loan_in_full(loan_id)?;
            Ok(LedgerEvent::LoanRepaid { repayment })
        })
    }

    pub fn advance_round(&mut self) -> Result<LedgerEvent, LedgerError> {
        self.commit("advance_round", |ledger| {
            Ok(LedgerEvent::RoundAdvanced {
                report: ledger.advance_round(),
            })
        })
    }

    /// Throw the table away and start over with a lone dealer.
    pub fn new_game(&mut self) -> Result<LedgerEvent, LedgerError> {
        let dealer_points = self.defaults.dealer_starting_points;
        self.commit("new_game", |ledger| {
            ledger.replace_state(GameState::new(dealer_points));
            Ok(LedgerEvent::GameReset { dealer_points })
        })
    }

    // -- Internals --

    /// Apply one operation all-or-nothing: run it, persist the result, and
    /// only then announce it.
    fn commit(
        &mut self,
        operation: &'static str,
        apply: impl FnOnce(&mut Ledger) -> Result<LedgerEvent, LedgerError>,
    ) -> Result<LedgerEvent, LedgerError> {
        let snapshot = self.ledger.state().clone();

        let event = match apply(&mut self.ledger) {
            Ok(event) => event,
            Err(e) => {
                self.ledger.replace_state(snapshot);
                warn!(operation, error = %e, "Operation rejected");
                return Err(e);
            }
        };

        if let Err(e) = self.store.save(self.ledger.state()) {
            self.ledger.replace_state(snapshot);
            error!(operation, error = %e, "Failed to save state, operation rolled back");
            return Err(e);
        }

        info!(operation, round = self.ledger.round(), "{event}");
        // Nobody listening is fine.
        let _ = self.events.send(event.clone());
        Ok(event)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
