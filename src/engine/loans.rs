//! Loan lifecycle — issuing, repaying and the due-round auto-payment scan.
//!
//! A loan is `Active` until it is repaid, then `Paid` for good. The
//! `auto_payment_attempted` flag only matters while it is active: the
//! round scan tries each loan once, in the round it falls due, and never
//! again.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::Ledger;
use crate::types::{
    repayment_total, AccountId, LedgerError, Loan, LoanId, LoanRole, LoanStatus, Points,
};

/// Highest interest rate a loan may carry, in percent.
pub const MAX_INTEREST_RATE: Decimal = dec!(1000);

// ---------------------------------------------------------------------------
// Request / report types
// ---------------------------------------------------------------------------

/// Fully specified terms of a new loan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanTerms {
    pub lender: AccountId,
    pub borrower: AccountId,
    pub amount: Points,
    pub interest_rate: Decimal,
    pub duration_rounds: u64,
}

/// A completed repayment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Repayment {
    pub loan: LoanId,
    pub borrower: AccountId,
    pub lender: AccountId,
    pub amount: Points,
}

/// What happened when the round counter moved on.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RoundReport {
    /// The new round number.
    pub round: u64,
    /// Loans paid off automatically this round.
    pub auto_repaid: Vec<LoanId>,
    /// Loans due this round whose borrower came up short.
    pub deferred: Vec<LoanId>,
}

/// A loan together with what a reader needs to show it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoanView {
    #[serde(flatten)]
    pub loan: Loan,
    pub lender_name: String,
    pub borrower_name: String,
    pub repayment_total: Points,
    pub status: LoanStatus,
}

/// Check loan terms and work out what repaying them costs.
///
/// The amount must be positive, the rate within 0..=`MAX_INTEREST_RATE`,
/// and the total must fit in `Points`.
pub fn quote_repayment(amount: Points, interest_rate: Decimal) -> Result<Points, LedgerError> {
    if amount <= 0 {
        return Err(LedgerError::validation("Loan amount must be positive"));
    }
    if interest_rate.is_sign_negative() || interest_rate > MAX_INTEREST_RATE {
        return Err(LedgerError::validation(format!(
            "Interest rate must be between 0% and {MAX_INTEREST_RATE}%"
        )));
    }
    repayment_total(amount, interest_rate)
        .ok_or_else(|| LedgerError::validation("Repayment total would overflow"))
}

/// Whether `loan` is past due at `current_round`. Derived, never stored.
pub fn is_overdue(loan: &Loan, current_round: u64) -> bool {
    loan.is_overdue(current_round)
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

impl Ledger {
    /// Issue a loan: the principal moves from lender to borrower now and is
    /// due back, with interest, `duration_rounds` rounds from the current
    /// one.
    pub fn create_loan(&mut self, terms: LoanTerms) -> Result<LoanId, LedgerError> {
        if terms.lender == terms.borrower {
            return Err(LedgerError::validation(
                "Please select different lender and borrower",
            ));
        }
        let lender_points = self.require_account(&terms.lender)?.points;
        self.require_account(&terms.borrower)?;
        quote_repayment(terms.amount, terms.interest_rate)?;
        if terms.duration_rounds == 0 {
            return Err(LedgerError::validation(
                "Loan must run for at least one round",
            ));
        }
        if lender_points < terms.amount {
            return Err(LedgerError::validation(
                "Lender does not have enough points",
            ));
        }
        let due_round = self
            .state
            .round
            .checked_add(terms.duration_rounds)
            .ok_or_else(|| LedgerError::validation("Loan duration is too long"))?;

        let id = LoanId(self.state.next_loan_id);
        let next_loan_id = id
            .0
            .checked_add(1)
            .ok_or_else(|| LedgerError::validation("No loan ids left"))?;

        self.transfer(&terms.lender, &terms.borrower, terms.amount)?;
        self.state.next_loan_id = next_loan_id;
        for party in [&terms.lender, &terms.borrower] {
            if let Some(account) = self.state.account_mut(party) {
                account.loans.push(id);
            }
        }

        let loan = Loan {
            id,
            amount: terms.amount,
            interest_rate: terms.interest_rate,
            origin_round: self.state.round,
            duration_rounds: terms.duration_rounds,
            due_round,
            lender: terms.lender,
            borrower: terms.borrower,
            paid: false,
            auto_payment_attempted: false,
        };
        debug!(loan = %loan, "Loan issued");
        self.state.loans.insert(id, loan);
        Ok(id)
    }

    /// Repay an active loan in full.
    ///
    /// The caller states who pays whom and how much; all three must agree
    /// with the ledger. The borrower is debited even if that takes the
    /// balance below zero.
    pub fn repay_loan(
        &mut self,
        loan_id: LoanId,
        borrower: &AccountId,
        lender: &AccountId,
        total_amount: Points,
    ) -> Result<Repayment, LedgerError> {
        let loan = self
            .state
            .loan(loan_id)
            .ok_or(LedgerError::LoanNotFound(loan_id))?;
        if loan.paid {
            return Err(LedgerError::validation(format!(
                "Loan {loan_id} is already paid"
            )));
        }
        if &loan.borrower != borrower || &loan.lender != lender {
            return Err(LedgerError::validation(format!(
                "Loan {loan_id} is owed by {} to {}",
                loan.borrower, loan.lender
            )));
        }
        let expected = loan.repayment_total();
        if total_amount != expected {
            return Err(LedgerError::validation(format!(
                "Loan {loan_id} must be repaid with {expected} points, not {total_amount}"
            )));
        }
        self.require_account(borrower)?;
        self.require_account(lender)?;

        self.settle_loan(loan_id, borrower, lender, expected)
    }

    /// Repay a loan using the parties and total recorded in the ledger.
    pub fn repay_loan_in_full(&mut self, loan_id: LoanId) -> Result<Repayment, LedgerError> {
        let loan = self
            .state
            .loan(loan_id)
            .ok_or(LedgerError::LoanNotFound(loan_id))?;
        let (borrower, lender) = (loan.borrower.clone(), loan.lender.clone());
        let total = loan.repayment_total();
        self.repay_loan(loan_id, &borrower, &lender, total)
    }

    /// Start the next round and run the auto-payment scan.
    ///
    /// Every unpaid, not-yet-attempted loan due exactly this round is paid
    /// off if the borrower can cover it; otherwise it is marked attempted
    /// and left for manual repayment.
    pub fn advance_round(&mut self) -> RoundReport {
        self.state.round += 1;
        let round = self.state.round;
        let mut report = RoundReport {
            round,
            ..RoundReport::default()
        };

        let due: Vec<LoanId> = self
            .state
            .active_loans()
            .filter(|loan| loan.due_round == round && !loan.auto_payment_attempted)
            .map(|loan| loan.id)
            .collect();

        for loan_id in due {
            let Some(loan) = self.state.loan(loan_id) else {
                continue;
            };
            let (borrower, lender) = (loan.borrower.clone(), loan.lender.clone());
            let total = loan.repayment_total();

            let Some(balance) = self.state.account(&borrower).map(|a| a.points) else {
                warn!(
                    loan = %loan_id,
                    borrower = %borrower,
                    "Borrower has left the table, skipping auto-payment"
                );
                continue;
            };
            if self.state.account(&lender).is_none() {
                warn!(
                    loan = %loan_id,
                    lender = %lender,
                    "Lender has left the table, skipping auto-payment"
                );
                continue;
            }

            let repaid = balance >= total
                && self.settle_loan(loan_id, &borrower, &lender, total).is_ok();
            if repaid {
                report.auto_repaid.push(loan_id);
            } else {
                if let Some(loan) = self.state.loans.get_mut(&loan_id) {
                    loan.auto_payment_attempted = true;
                }
                warn!(
                    loan = %loan_id,
                    borrower = %self.state.account_name(&borrower),
                    balance,
                    owed = total,
                    "Auto-payment failed, loan stays active"
                );
                report.deferred.push(loan_id);
            }
        }

        report
    }

    // -- Queries --

    pub fn active_loans(&self) -> Vec<&Loan> {
        self.state.active_loans().collect()
    }

    pub fn paid_loans(&self) -> Vec<&Loan> {
        self.state.paid_loans().collect()
    }

    /// Loans where `account` plays `role`.
    pub fn loans_for(&self, account: &AccountId, role: LoanRole) -> Vec<&Loan> {
        self.state
            .loans
            .values()
            .filter(|loan| loan.role_of(account) == Some(role))
            .collect()
    }

    pub fn loan_view(&self, loan: &Loan) -> LoanView {
        LoanView {
            loan: loan.clone(),
            lender_name: self.state.account_name(&loan.lender).to_string(),
            borrower_name: self.state.account_name(&loan.borrower).to_string(),
            repayment_total: loan.repayment_total(),
            status: loan.status(self.state.round),
        }
    }

    // -- Internals --

    /// Move the repayment and close the loan. Parties must already be
    /// resolved.
    fn settle_loan(
        &mut self,
        loan_id: LoanId,
        borrower: &AccountId,
        lender: &AccountId,
        total: Points,
    ) -> Result<Repayment, LedgerError> {
        self.transfer(borrower, lender, total)?;
        if let Some(loan) = self.state.loans.get_mut(&loan_id) {
            loan.paid = true;
        }
        debug!(loan = %loan_id, total, "Loan repaid");
        Ok(Repayment {
            loan: loan_id,
            borrower: borrower.clone(),
            lender: lender.clone(),
            amount: total,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
