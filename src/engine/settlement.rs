//! Settlement — resolving a round's bets into transfers and history.
//!
//! Every settlement is zero-sum across the accounts it touches, clears the
//! bets it resolves and records at most one history entry. Balances are
//! allowed to go negative here: a balance can shrink (say, through a loan)
//! between placing a bet and settling it, and the debt is simply carried.

use serde::Serialize;
use tracing::debug;

use super::{overflow, Ledger};
use crate::types::{Account, AccountId, HistoryEntry, LedgerError, Points};

/// Which settlement was asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementKind {
    WinnerTakesAll,
    PlayerLoss,
    PlayerWin,
    DealerCollectsAll,
}

/// Result of a settlement call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Settlement {
    /// Points changed hands and this entry was recorded.
    Resolved(HistoryEntry),
    /// There was nothing to settle; no history was recorded.
    NoActiveBets,
}

impl Settlement {
    pub fn entry(&self) -> Option<&HistoryEntry> {
        match self {
            Settlement::Resolved(entry) => Some(entry),
            Settlement::NoActiveBets => None,
        }
    }
}

impl Ledger {
    /// `winner` (player or dealer) collects every other account's bet.
    ///
    /// The winner's own stake is kept: it is cleared without being debited,
    /// returned or doubled.
    pub fn settle_winner_takes_all(
        &mut self,
        winner: &AccountId,
    ) -> Result<Settlement, LedgerError> {
        let winner_name = self.require_account(winner)?.name.clone();
        let winner_points = self.require_account(winner)?.points;

        let pot = self.pot(|account| &account.id != winner)?;
        if pot > 0 {
            winner_points.checked_add(pot).ok_or_else(overflow)?;
        }

        let mut losers = Vec::new();
        for account in self.state.accounts_mut() {
            if &account.id == winner {
                account.current_bet = 0;
            } else if account.has_bet() {
                account.points -= account.current_bet;
                account.current_bet = 0;
                losers.push(account.name.clone());
            }
        }

        if pot == 0 {
            return Ok(Settlement::NoActiveBets);
        }
        if let Some(account) = self.state.account_mut(winner) {
            account.points += pot;
        }

        debug!(winner = %winner_name, pot, losers = losers.len(), "Winner takes all");
        Ok(Settlement::Resolved(self.record(winner_name, losers, pot)))
    }

    /// One player loses their stake to the dealer.
    pub fn settle_player_loss(&mut self, player: &AccountId) -> Result<Settlement, LedgerError> {
        let bet = self.require_player(player)?.current_bet;
        if bet <= 0 {
            return Ok(Settlement::NoActiveBets);
        }

        let dealer = AccountId::dealer();
        self.transfer(player, &dealer, bet)?;
        let loser = self.clear_bet(player);

        let winner = self.state.dealer.name.clone();
        Ok(Settlement::Resolved(self.record(winner, vec![loser], bet)))
    }

    /// One player beats the dealer and wins their stake from the house.
    pub fn settle_player_win(&mut self, player: &AccountId) -> Result<Settlement, LedgerError> {
        let bet = self.require_player(player)?.current_bet;
        if bet <= 0 {
            return Ok(Settlement::NoActiveBets);
        }

        let dealer = AccountId::dealer();
        self.transfer(&dealer, player, bet)?;
        let winner = self.clear_bet(player);

        let loser = self.state.dealer.name.clone();
        Ok(Settlement::Resolved(self.record(winner, vec![loser], bet)))
    }

    /// The dealer collects every player's active bet.
    pub fn settle_dealer_collects_all(&mut self) -> Result<Settlement, LedgerError> {
        let pot = self.pot(|account| !account.id.is_dealer())?;
        if pot == 0 {
            return Ok(Settlement::NoActiveBets);
        }
        let dealer_points = self
            .state
            .dealer
            .points
            .checked_add(pot)
            .ok_or_else(overflow)?;

        let mut losers = Vec::new();
        for player in self.state.players.iter_mut().filter(|p| p.has_bet()) {
            player.points -= player.current_bet;
            player.current_bet = 0;
            losers.push(player.name.clone());
        }
        self.state.dealer.points = dealer_points;

        let winner = self.state.dealer.name.clone();
        Ok(Settlement::Resolved(self.record(winner, losers, pot)))
    }

    /// Abandon the round: clear every bet, touch nothing else. Returns how
    /// many bets were cleared.
    pub fn reset_bets(&mut self) -> usize {
        let mut cleared = 0;
        for player in self.state.players.iter_mut().filter(|p| p.has_bet()) {
            player.current_bet = 0;
            cleared += 1;
        }
        cleared
    }

    /// Zero a resolved player's bet and hand back their name.
    fn clear_bet(&mut self, player: &AccountId) -> String {
        match self.state.player_mut(player) {
            Some(account) => {
                account.current_bet = 0;
                account.name.clone()
            }
            None => String::new(),
        }
    }

    /// Sum of the active bets of the accounts `include` picks, checking
    /// that the pot and every loser's debited balance stay in range.
    fn pot(&self, include: impl Fn(&Account) -> bool) -> Result<Points, LedgerError> {
        let mut pot: Points = 0;
        for account in self.state.accounts().filter(|a| include(a) && a.has_bet()) {
            pot = pot.checked_add(account.current_bet).ok_or_else(overflow)?;
            account
                .points
                .checked_sub(account.current_bet)
                .ok_or_else(overflow)?;
        }
        Ok(pot)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
