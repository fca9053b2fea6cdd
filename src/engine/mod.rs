//! Ledger engine — the accounting rules for one table.
//!
//! `Ledger` owns a `GameState` and applies roster, settlement and loan
//! operations to it. Every operation validates before it mutates, so a
//! rejected call leaves the state exactly as it was. `Session` adds
//! write-through persistence and event fan-out on top.

pub mod events;
pub mod loans;
pub mod roster;
pub mod session;
pub mod settlement;

use crate::types::{Account, AccountId, GameState, HistoryEntry, LedgerError, Points};

/// In-memory model of one table.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    state: GameState,
}

impl Ledger {
    /// Fresh dealer-only table.
    pub fn new(dealer_points: Points) -> Self {
        Self {
            state: GameState::new(dealer_points),
        }
    }

    /// Adopt a previously saved state after checking its invariants.
    pub fn from_state(state: GameState) -> Result<Self, LedgerError> {
        state.validate()?;
        Ok(Self { state })
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn into_state(self) -> GameState {
        self.state
    }

    pub fn round(&self) -> u64 {
        self.state.round
    }

    /// Swap in a whole new state. Used for rollbacks and table resets.
    pub(crate) fn replace_state(&mut self, state: GameState) {
        self.state = state;
    }

    fn require_account(&self, id: &AccountId) -> Result<&Account, LedgerError> {
        self.state
            .account(id)
            .ok_or_else(|| LedgerError::AccountNotFound(id.clone()))
    }

    fn require_player(&self, id: &AccountId) -> Result<&Account, LedgerError> {
        self.state
            .player(id)
            .ok_or_else(|| LedgerError::AccountNotFound(id.clone()))
    }

    /// Move points between two accounts. Callers resolve both ids first.
    /// Funds are not checked, balances may go negative; a result outside
    /// the `Points` range is refused before either side changes.
    fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: Points,
    ) -> Result<(), LedgerError> {
        if from == to {
            return Ok(());
        }
        let debited = self
            .require_account(from)?
            .points
            .checked_sub(amount)
            .ok_or_else(overflow)?;
        let credited = self
            .require_account(to)?
            .points
            .checked_add(amount)
            .ok_or_else(overflow)?;

        if let Some(payer) = self.state.account_mut(from) {
            payer.points = debited;
        }
        if let Some(payee) = self.state.account_mut(to) {
            payee.points = credited;
        }
        Ok(())
    }

    /// Prepend a settlement to the history.
    fn record(&mut self, winner: String, losers: Vec<String>, amount: Points) -> HistoryEntry {
        let entry = HistoryEntry::new(winner, losers, amount);
        self.state.history.insert(0, entry.clone());
        entry
    }
}

/// Refusal for a change that would push a balance or pot past the limits
/// of `Points`.
fn overflow() -> LedgerError {
    LedgerError::validation("Points would overflow")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
