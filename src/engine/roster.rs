//! Roster management: joining, leaving and placing bets.

use tracing::debug;

use super::Ledger;
use crate::types::{Account, AccountId, LedgerError, LoanId, Points};

impl Ledger {
    /// Seat a new player. The name is trimmed; it must not be blank and the
    /// starting balance must be positive.
    pub fn add_player(
        &mut self,
        name: &str,
        starting_points: Points,
    ) -> Result<AccountId, LedgerError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::validation("Player name cannot be empty"));
        }
        if starting_points <= 0 {
            return Err(LedgerError::validation(format!(
                "Starting points must be positive, got {starting_points}"
            )));
        }

        let mut id = AccountId::generate();
        while self.state.account(&id).is_some() {
            id = AccountId::generate();
        }

        self.state
            .players
            .push(Account::new(id.clone(), name, starting_points));
        debug!(player = %id, name, starting_points, "Player seated");
        Ok(id)
    }

    /// Remove a player from the table.
    ///
    /// Refused while any unpaid loan names the player as lender or
    /// borrower. A pending bet is simply dropped, it was never debited.
    pub fn remove_player(&mut self, id: &AccountId) -> Result<Account, LedgerError> {
        let index = self
            .state
            .players
            .iter()
            .position(|p| &p.id == id)
            .ok_or_else(|| LedgerError::AccountNotFound(id.clone()))?;

        let outstanding: Vec<LoanId> = self
            .state
            .active_loans()
            .filter(|loan| loan.involves(id))
            .map(|loan| loan.id)
            .collect();
        if !outstanding.is_empty() {
            return Err(LedgerError::OutstandingLoans {
                name: self.state.players[index].name.clone(),
                loans: outstanding,
            });
        }

        let removed = self.state.players.remove(index);
        debug!(player = %removed.id, name = %removed.name, "Player removed");
        Ok(removed)
    }

    /// Stake `amount` for the current round. Nothing is debited until the
    /// bet is settled.
    pub fn set_bet(&mut self, id: &AccountId, amount: Points) -> Result<(), LedgerError> {
        if id.is_dealer() {
            return Err(LedgerError::validation("The dealer does not place bets"));
        }
        let balance = self.require_player(id)?.points;
        if amount < 0 {
            return Err(LedgerError::validation("Bet cannot be negative"));
        }
        if amount > balance {
            return Err(LedgerError::validation(
                "Cannot bet more than available points",
            ));
        }

        if let Some(player) = self.state.player_mut(id) {
            player.current_bet = amount;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
