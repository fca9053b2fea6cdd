//! Events emitted after each accepted operation.
//!
//! The `Display` form is the short notification a front end shows the
//! table; the serialised form carries the details.

use serde::Serialize;
use std::fmt;

use super::loans::{Repayment, RoundReport};
use super::settlement::{Settlement, SettlementKind};
use crate::types::{AccountId, Loan, Points};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    PlayerJoined {
        id: AccountId,
        name: String,
        points: Points,
    },
    PlayerRemoved {
        id: AccountId,
        name: String,
    },
    BetPlaced {
        player: AccountId,
        amount: Points,
    },
    Settled {
        kind: SettlementKind,
        settlement: Settlement,
    },
    BetsReset {
        cleared: usize,
    },
    LoanCreated {
        loan: Loan,
    },
    LoanRepaid {
        repayment: Repayment,
    },
    RoundAdvanced {
        report: RoundReport,
    },
    GameReset {
        dealer_points: Points,
    },
}

impl fmt::Display for LedgerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerEvent::PlayerJoined { name, points, .. } => {
                write!(f, "{name} has joined the game with {points} points")
            }
            LedgerEvent::PlayerRemoved { name, .. } => {
                write!(f, "{name} has been removed from the game")
            }
            LedgerEvent::BetPlaced { amount, .. } => write!(f, "Bet updated to {amount} points"),
            LedgerEvent::Settled { kind, settlement } => match (settlement, kind) {
                (Settlement::Resolved(entry), _) => write!(f, "{entry}"),
                (Settlement::NoActiveBets, SettlementKind::DealerCollectsAll) => {
                    write!(f, "No active bets to collect")
                }
                (Settlement::NoActiveBets, _) => write!(f, "No active bets to settle"),
            },
            LedgerEvent::BetsReset { .. } => write!(f, "All bets have been reset"),
            LedgerEvent::LoanCreated { loan } => write!(
                f,
                "Loan of {} points created with {}% interest, due in {} rounds",
                loan.amount,
                loan.interest_rate.normalize(),
                loan.duration_rounds,
            ),
            LedgerEvent::LoanRepaid { repayment } => {
                write!(f, "Loan has been repaid ({} points)", repayment.amount)
            }
            LedgerEvent::RoundAdvanced { report } => {
                write!(f, "Round {} started", report.round)?;
                if !report.auto_repaid.is_empty() {
                    write!(f, "; {} loan(s) automatically repaid", report.auto_repaid.len())?;
                }
                Ok(())
            }
            LedgerEvent::GameReset { dealer_points } => {
                write!(f, "New game started, dealer holds {dealer_points} points")
            }
        }
    }
}
