//! Shared types for the scorekeeper.
//!
//! These types form the data model used across all modules: the ledger
//! engine mutates them, the storage layer persists them and the HTTP
//! surface serialises them. They carry no accounting rules of their own
//! beyond derived queries.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Integer point amount. Balances may go negative; that is how debt shows.
pub type Points = i64;

/// Reserved id of the dealer account.
pub const DEALER_ID: &str = "dealer";

/// Display name of the dealer account.
pub const DEALER_NAME: &str = "Dealer";

/// Dealer balance on a fresh table.
pub const DEFAULT_DEALER_POINTS: Points = 1000;

/// Name shown for a loan party that has left the table.
pub const UNKNOWN_NAME: &str = "Unknown";

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Account identifier: the `dealer` sentinel or a generated player id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn dealer() -> Self {
        Self(DEALER_ID.to_string())
    }

    /// Fresh random player id. Never equal to the dealer sentinel.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn is_dealer(&self) -> bool {
        self.0 == DEALER_ID
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AccountId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for AccountId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Loan identifier, allocated sequentially per table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoanId(pub u64);

impl fmt::Display for LoanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// A balance holder at the table: the dealer or a player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub points: Points,
    /// Stake for the current round. Debited only at settlement.
    pub current_bet: Points,
    /// Loans this account takes part in, as lender or borrower.
    #[serde(default)]
    pub loans: Vec<LoanId>,
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} pts", self.name, self.points)?;
        if self.has_bet() {
            write!(f, " (bet {})", self.current_bet)?;
        }
        Ok(())
    }
}

impl Account {
    pub fn new(id: AccountId, name: impl Into<String>, points: Points) -> Self {
        Self {
            id,
            name: name.into(),
            points,
            current_bet: 0,
            loans: Vec::new(),
        }
    }

    pub fn dealer(points: Points) -> Self {
        Self::new(AccountId::dealer(), DEALER_NAME, points)
    }

    pub fn has_bet(&self) -> bool {
        self.current_bet > 0
    }
}

// ---------------------------------------------------------------------------
// Loans
// ---------------------------------------------------------------------------

/// Which side of a loan an account is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanRole {
    Lender,
    Borrower,
}

/// Derived lifecycle status of a loan. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Active,
    Overdue,
    Paid,
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoanStatus::Active => write!(f, "Active"),
            LoanStatus::Overdue => write!(f, "Overdue"),
            LoanStatus::Paid => write!(f, "Paid"),
        }
    }
}

/// A point loan between two accounts. Stored once, in the table's loan
/// ledger; accounts refer to it by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Loan {
    pub id: LoanId,
    /// Principal.
    pub amount: Points,
    /// Interest as a percentage of the principal (10 = 10%).
    pub interest_rate: Decimal,
    pub origin_round: u64,
    pub duration_rounds: u64,
    pub due_round: u64,
    pub lender: AccountId,
    pub borrower: AccountId,
    pub paid: bool,
    /// Set when the due-round auto-payment found the borrower short.
    /// The attempt is never repeated.
    pub auto_payment_attempted: bool,
}

impl fmt::Display for Loan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Loan {}: {} pts @ {}% from {} to {}, due round {}{}",
            self.id,
            self.amount,
            self.interest_rate.normalize(),
            self.lender,
            self.borrower,
            self.due_round,
            if self.paid { " (paid)" } else { "" },
        )
    }
}

impl Loan {
    /// Points the borrower owes back: principal plus interest. Terms are
    /// checked to fit when the loan is issued or loaded.
    pub fn repayment_total(&self) -> Points {
        repayment_total(self.amount, self.interest_rate).unwrap_or(Points::MAX)
    }

    /// Interest portion of the repayment.
    pub fn interest(&self) -> Points {
        self.repayment_total() - self.amount
    }

    pub fn is_active(&self) -> bool {
        !self.paid
    }

    /// Past its due round and still unpaid.
    pub fn is_overdue(&self, current_round: u64) -> bool {
        !self.paid && self.due_round < current_round
    }

    pub fn status(&self, current_round: u64) -> LoanStatus {
        if self.paid {
            LoanStatus::Paid
        } else if self.is_overdue(current_round) {
            LoanStatus::Overdue
        } else {
            LoanStatus::Active
        }
    }

    pub fn involves(&self, account: &AccountId) -> bool {
        &self.lender == account || &self.borrower == account
    }

    pub fn role_of(&self, account: &AccountId) -> Option<LoanRole> {
        if &self.lender == account {
            Some(LoanRole::Lender)
        } else if &self.borrower == account {
            Some(LoanRole::Borrower)
        } else {
            None
        }
    }
}

/// `amount + amount * rate / 100`, rounded to the nearest point with
/// halves rounded up. `None` if the result does not fit in `Points`.
pub fn repayment_total(amount: Points, interest_rate: Decimal) -> Option<Points> {
    let principal = Decimal::from(amount);
    let interest = principal
        .checked_mul(interest_rate)?
        .checked_div(dec!(100))?;
    principal
        .checked_add(interest)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// One resolved settlement. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub winner: String,
    pub losers: Vec<String>,
    pub amount: Points,
}

impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} won {} points from {}",
            self.winner,
            self.amount,
            self.losers.join(", "),
        )
    }
}

impl HistoryEntry {
    pub fn new(winner: impl Into<String>, losers: Vec<String>, amount: Points) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            winner: winner.into(),
            losers,
            amount,
        }
    }
}

// ---------------------------------------------------------------------------
// Game state
// ---------------------------------------------------------------------------

/// Everything about one table. This is the unit of persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GameState {
    pub dealer: Account,
    /// Players in join order.
    pub players: Vec<Account>,
    pub round: u64,
    /// Newest first.
    pub history: Vec<HistoryEntry>,
    pub loans: BTreeMap<LoanId, Loan>,
    pub next_loan_id: u64,
}

impl Default for GameState {
    fn default() -> Self {
        Self::new(DEFAULT_DEALER_POINTS)
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "round {} | dealer {} pts | players={} | active_loans={} | history={}",
            self.round,
            self.dealer.points,
            self.players.len(),
            self.active_loans().count(),
            self.history.len(),
        )
    }
}

impl GameState {
    /// A dealer-only table at round 0.
    pub fn new(dealer_points: Points) -> Self {
        Self {
            dealer: Account::dealer(dealer_points),
            players: Vec::new(),
            round: 0,
            history: Vec::new(),
            loans: BTreeMap::new(),
            next_loan_id: 1,
        }
    }

    /// Dealer first, then players in join order.
    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        std::iter::once(&self.dealer).chain(self.players.iter())
    }

    pub fn accounts_mut(&mut self) -> impl Iterator<Item = &mut Account> {
        std::iter::once(&mut self.dealer).chain(self.players.iter_mut())
    }

    /// Look up the dealer or a player.
    pub fn account(&self, id: &AccountId) -> Option<&Account> {
        self.accounts().find(|a| &a.id == id)
    }

    pub fn account_mut(&mut self, id: &AccountId) -> Option<&mut Account> {
        self.accounts_mut().find(|a| &a.id == id)
    }

    /// Look up a player. The dealer is not a player.
    pub fn player(&self, id: &AccountId) -> Option<&Account> {
        self.players.iter().find(|p| &p.id == id)
    }

    pub fn player_mut(&mut self, id: &AccountId) -> Option<&mut Account> {
        self.players.iter_mut().find(|p| &p.id == id)
    }

    /// Display name of an account, or `Unknown` if it has left.
    pub fn account_name(&self, id: &AccountId) -> &str {
        self.account(id).map(|a| a.name.as_str()).unwrap_or(UNKNOWN_NAME)
    }

    pub fn loan(&self, id: LoanId) -> Option<&Loan> {
        self.loans.get(&id)
    }

    pub fn active_loans(&self) -> impl Iterator<Item = &Loan> {
        self.loans.values().filter(|l| l.is_active())
    }

    pub fn paid_loans(&self) -> impl Iterator<Item = &Loan> {
        self.loans.values().filter(|l| l.paid)
    }

    /// Sum of every balance at the table. Wider than `Points` so a table
    /// near the limits still adds up.
    pub fn total_points(&self) -> i128 {
        self.accounts().map(|a| i128::from(a.points)).sum()
    }

    /// Check the structural invariants of a state read back from storage.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if !self.dealer.id.is_dealer() {
            return Err(invalid_state(format!(
                "dealer account has id {:?}",
                self.dealer.id.as_str()
            )));
        }

        if self.round == u64::MAX {
            return Err(invalid_state("round counter is exhausted".to_string()));
        }

        let mut seen = HashSet::new();
        seen.insert(&self.dealer.id);
        for player in &self.players {
            if player.id.is_dealer() {
                return Err(invalid_state("a player uses the dealer id".to_string()));
            }
            if !seen.insert(&player.id) {
                return Err(invalid_state(format!("duplicate account id {}", player.id)));
            }
            if player.name.trim().is_empty() {
                return Err(invalid_state(format!("player {} has no name", player.id)));
            }
        }

        for account in self.accounts() {
            if account.current_bet < 0 {
                return Err(invalid_state(format!("{} has a negative bet", account.name)));
            }
            for loan_id in &account.loans {
                match self.loans.get(loan_id) {
                    Some(loan) if loan.involves(&account.id) => {}
                    _ => {
                        return Err(invalid_state(format!(
                            "{} refers to loan {loan_id} it is not party to",
                            account.name
                        )))
                    }
                }
            }
        }

        for (key, loan) in &self.loans {
            if *key != loan.id {
                return Err(invalid_state(format!("loan {} stored under {key}", loan.id)));
            }
            if loan.id.0 >= self.next_loan_id {
                return Err(invalid_state(format!("loan {} is ahead of the id counter", loan.id)));
            }
            if loan.amount <= 0
                || loan.interest_rate.is_sign_negative()
                || loan.duration_rounds == 0
                || loan.origin_round.checked_add(loan.duration_rounds) != Some(loan.due_round)
                || loan.lender == loan.borrower
                || repayment_total(loan.amount, loan.interest_rate).is_none()
            {
                return Err(invalid_state(format!("loan {} has inconsistent terms", loan.id)));
            }
            for party in [&loan.lender, &loan.borrower] {
                match self.account(party) {
                    Some(account) if !account.loans.contains(&loan.id) => {
                        return Err(invalid_state(format!(
                            "{} does not list loan {}",
                            account.name, loan.id
                        )))
                    }
                    None if loan.is_active() => {
                        return Err(invalid_state(format!(
                            "active loan {} refers to missing account {party}",
                            loan.id
                        )))
                    }
                    _ => {}
                }
            }
        }

        Ok(())
    }
}

fn invalid_state(message: String) -> LedgerError {
    LedgerError::Persistence(format!("invalid saved state: {message}"))
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Broad category of a `LedgerError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Persistence,
}

/// Everything a ledger operation can refuse with. None of these are fatal;
/// the table stays usable afterwards.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    #[error("{0}")]
    Validation(String),

    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Loan not found: {0}")]
    LoanNotFound(LoanId),

    #[error("{name} still has active loans: {}", join_loan_ids(.loans))]
    OutstandingLoans { name: String, loans: Vec<LoanId> },

    #[error("Storage error: {0}")]
    Persistence(String),
}

impl LedgerError {
    pub fn validation(message: impl Into<String>) -> Self {
        LedgerError::Validation(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Validation(_) | LedgerError::OutstandingLoans { .. } => {
                ErrorKind::Validation
            }
            LedgerError::AccountNotFound(_) | LedgerError::LoanNotFound(_) => ErrorKind::NotFound,
            LedgerError::Persistence(_) => ErrorKind::Persistence,
        }
    }
}

fn join_loan_ids(loans: &[LoanId]) -> String {
    loans
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
