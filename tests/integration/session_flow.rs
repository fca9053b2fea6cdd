//! Whole-table scenarios driven through `Session`.

use rust_decimal_macros::dec;

use scorekeeper::engine::events::LedgerEvent;
use scorekeeper::engine::session::{GameDefaults, LoanRequest, Session};
use scorekeeper::storage::{JsonFileStore, MemoryStore, StateStore};
use scorekeeper::types::{AccountId, ErrorKind, LedgerError, LoanId, LoanStatus, Points};

use crate::flaky_store::FlakyStore;

fn open_table() -> Session {
    Session::open(Box::new(MemoryStore::default()), GameDefaults::default()).unwrap()
}

fn join(session: &mut Session, name: &str, points: Points) -> AccountId {
    match session.add_player(name, Some(points)).unwrap() {
        LedgerEvent::PlayerJoined { id, .. } => id,
        other => panic!("unexpected event {other:?}"),
    }
}

fn points_of(session: &Session, id: &AccountId) -> Points {
    session.state().account(id).unwrap().points
}

#[test]
fn test_player_loses_to_dealer() {
    let mut table = open_table();
    let alice = join(&mut table, "Alice", 100);

    table.set_bet(&alice, 30).unwrap();
    let event = table.settle_player_loss(&alice).unwrap();

    assert_eq!(event.to_string(), "Dealer won 30 points from Alice");
    assert_eq!(points_of(&table, &alice), 70);
    assert_eq!(table.state().dealer.points, 1030);
    assert_eq!(table.state().player(&alice).unwrap().current_bet, 0);

    let history = &table.state().history;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].winner, "Dealer");
    assert_eq!(history[0].losers, vec!["Alice".to_string()]);
    assert_eq!(history[0].amount, 30);
}

#[test]
fn test_winner_takes_all_round() {
    let mut table = open_table();
    let alice = join(&mut table, "Alice", 100);
    let bob = join(&mut table, "Bob", 100);
    let carol = join(&mut table, "Carol", 100);

    table.set_bet(&alice, 20).unwrap();
    table.set_bet(&bob, 30).unwrap();
    table.set_bet(&carol, 10).unwrap();
    let event = table.settle_winner_takes_all(&alice).unwrap();

    assert_eq!(event.to_string(), "Alice won 40 points from Bob, Carol");
    assert_eq!(points_of(&table, &alice), 140);
    assert_eq!(points_of(&table, &bob), 70);
    assert_eq!(points_of(&table, &carol), 90);
    assert!(table.state().players.iter().all(|p| p.current_bet == 0));
}

#[test]
fn test_history_is_newest_first() {
    let mut table = open_table();
    let alice = join(&mut table, "Alice", 100);

    table.set_bet(&alice, 10).unwrap();
    table.settle_player_loss(&alice).unwrap();
    table.set_bet(&alice, 25).unwrap();
    table.settle_player_win(&alice).unwrap();

    let history = &table.state().history;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].winner, "Alice");
    assert_eq!(history[0].amount, 25);
    assert_eq!(history[1].winner, "Dealer");
}

#[test]
fn test_loan_auto_repaid_when_due() {
    let mut table = open_table();
    let alice = join(&mut table, "Alice", 100);

    table
        .create_loan(LoanRequest::new(AccountId::dealer(), alice.clone()))
        .unwrap();
    assert_eq!(points_of(&table, &alice), 150);
    assert_eq!(table.state().dealer.points, 950);

    for round in 1..5 {
        let event = table.advance_round().unwrap();
        assert_eq!(event.to_string(), format!("Round {round} started"));
    }
    assert_eq!(table.active_loans().len(), 1);

    let event = table.advance_round().unwrap();
    assert_eq!(event.to_string(), "Round 5 started; 1 loan(s) automatically repaid");
    assert_eq!(points_of(&table, &alice), 95);
    assert_eq!(table.state().dealer.points, 1005);

    let paid = table.paid_loans();
    assert_eq!(paid.len(), 1);
    assert_eq!(paid[0].status, LoanStatus::Paid);
    assert_eq!(paid[0].repayment_total, 55);
    assert!(table.active_loans().is_empty());
}

#[test]
fn test_short_borrower_is_attempted_once() {
    let mut table = open_table();
    let alice = join(&mut table, "Alice", 100);
    let bob = join(&mut table, "Bob", 100);

    let mut request = LoanRequest::new(bob.clone(), alice.clone());
    request.amount = Some(100);
    request.interest_rate = Some(dec!(20));
    request.duration_rounds = Some(1);
    table.create_loan(request).unwrap();

    // Alice gambles the principal away before the loan comes due.
    table.set_bet(&alice, 150).unwrap();
    table.settle_player_loss(&alice).unwrap();
    assert_eq!(points_of(&table, &alice), 50);

    let LedgerEvent::RoundAdvanced { report } = table.advance_round().unwrap() else {
        panic!("expected RoundAdvanced");
    };
    assert_eq!(report.deferred, vec![LoanId(1)]);
    assert!(report.auto_repaid.is_empty());

    let active = table.active_loans();
    assert_eq!(active.len(), 1);
    assert!(active[0].loan.auto_payment_attempted);

    // Overdue from the next round on, and never retried automatically.
    table.set_bet(&alice, 50).unwrap();
    table.settle_player_win(&alice).unwrap();
    let LedgerEvent::RoundAdvanced { report } = table.advance_round().unwrap() else {
        panic!("expected RoundAdvanced");
    };
    assert!(report.auto_repaid.is_empty());
    assert!(report.deferred.is_empty());
    assert_eq!(table.active_loans()[0].status, LoanStatus::Overdue);

    table.repay_loan_in_full(LoanId(1)).unwrap();
    assert_eq!(points_of(&table, &alice), -20);
    assert_eq!(points_of(&table, &bob), 120);
    assert!(table.active_loans().is_empty());
}

#[test]
fn test_repay_requires_matching_terms() {
    let mut table = open_table();
    let alice = join(&mut table, "Alice", 100);
    table
        .create_loan(LoanRequest::new(AccountId::dealer(), alice.clone()))
        .unwrap();

    let err = table
        .repay_loan(LoanId(1), &alice, &AccountId::dealer(), 50)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = table
        .repay_loan(LoanId(1), &AccountId::dealer(), &alice, 55)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    table
        .repay_loan(LoanId(1), &alice, &AccountId::dealer(), 55)
        .unwrap();
    let err = table.repay_loan_in_full(LoanId(1)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn test_removal_blocked_by_active_loan() {
    let mut table = open_table();
    let alice = join(&mut table, "Alice", 100);
    let bob = join(&mut table, "Bob", 100);
    table
        .create_loan(LoanRequest::new(alice.clone(), bob.clone()))
        .unwrap();

    let err = table.remove_player(&alice).unwrap_err();
    assert_eq!(
        err,
        LedgerError::OutstandingLoans {
            name: "Alice".into(),
            loans: vec![LoanId(1)],
        }
    );
    assert!(table.remove_player(&bob).is_err());
    assert_eq!(table.state().players.len(), 2);

    table.repay_loan_in_full(LoanId(1)).unwrap();
    table.remove_player(&bob).unwrap();

    // The paid loan outlives its borrower.
    let paid = table.paid_loans();
    assert_eq!(paid[0].lender_name, "Alice");
    assert_eq!(paid[0].borrower_name, "Unknown");
}

#[test]
fn test_points_are_conserved() {
    let mut table = open_table();
    let alice = join(&mut table, "Alice", 100);
    let bob = join(&mut table, "Bob", 200);
    let total = table.state().total_points();
    assert_eq!(total, 1300);

    table.set_bet(&alice, 40).unwrap();
    table.set_bet(&bob, 60).unwrap();
    table.settle_dealer_collects_all().unwrap();
    assert_eq!(table.state().total_points(), total);

    let mut request = LoanRequest::new(AccountId::dealer(), alice.clone());
    request.duration_rounds = Some(2);
    table.create_loan(request).unwrap();
    assert_eq!(table.state().total_points(), total);

    table.set_bet(&bob, 100).unwrap();
    table.settle_winner_takes_all(&alice).unwrap();
    table.advance_round().unwrap();
    table.advance_round().unwrap();
    assert_eq!(table.state().total_points(), total);

    table.set_bet(&alice, 10).unwrap();
    table.reset_bets().unwrap();
    assert_eq!(table.state().total_points(), total);
}

#[test]
fn test_rejections_leave_table_untouched() {
    let mut table = open_table();
    let alice = join(&mut table, "Alice", 100);
    let before = table.state().clone();

    assert!(table.set_bet(&alice, 101).is_err());
    assert!(table.set_bet(&AccountId::dealer(), 5).is_err());
    assert!(table.add_player("", None).is_err());
    assert!(table.settle_player_loss(&AccountId::from("ghost")).is_err());
    let mut request = LoanRequest::new(alice.clone(), alice.clone());
    request.amount = Some(10);
    assert!(table.create_loan(request).is_err());
    let mut request = LoanRequest::new(alice.clone(), AccountId::dealer());
    request.amount = Some(500);
    assert!(table.create_loan(request).is_err());

    assert_eq!(table.state(), &before);
}

#[test]
fn test_balance_at_the_limit_refuses_more_points() {
    let mut table = open_table();
    let rich = join(&mut table, "Rich", Points::MAX);
    let alice = join(&mut table, "Alice", 100);
    let before = table.state().clone();

    let mut request = LoanRequest::new(AccountId::dealer(), rich.clone());
    request.amount = Some(1);
    request.interest_rate = Some(dec!(0));
    let err = table.create_loan(request).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.to_string(), "Points would overflow");
    assert_eq!(table.state(), &before);

    table.set_bet(&alice, 40).unwrap();
    let before = table.state().clone();
    assert!(table.settle_winner_takes_all(&rich).is_err());
    assert_eq!(table.state(), &before);

    let event = table.settle_player_loss(&alice).unwrap();
    assert_eq!(event.to_string(), "Dealer won 40 points from Alice");
    assert_eq!(points_of(&table, &rich), Points::MAX);
}

#[test]
fn test_dealer_sweep_with_no_bets() {
    let mut table = open_table();
    join(&mut table, "Alice", 100);

    let event = table.settle_dealer_collects_all().unwrap();
    assert_eq!(event.to_string(), "No active bets to collect");
    assert!(table.state().history.is_empty());
}

#[test]
fn test_failed_write_rolls_back() {
    let store = FlakyStore::new();
    let mut table = Session::open(Box::new(store.clone()), GameDefaults::default()).unwrap();
    let alice = join(&mut table, "Alice", 100);
    table.set_bet(&alice, 30).unwrap();
    assert_eq!(store.saves(), 2);

    store.set_error("disk full");
    let err = table.settle_player_loss(&alice).unwrap_err();
    assert_eq!(err, LedgerError::Persistence("disk full".into()));
    assert_eq!(points_of(&table, &alice), 100);
    assert_eq!(table.state().player(&alice).unwrap().current_bet, 30);
    assert!(table.state().history.is_empty());

    store.clear_error();
    table.settle_player_loss(&alice).unwrap();
    assert_eq!(store.saves(), 3);
    assert_eq!(store.snapshot().unwrap(), table.state().clone());
}

#[test]
fn test_unreadable_store_refuses_to_open() {
    let store = FlakyStore::new();
    store.set_error("permission denied");

    let err = Session::open(Box::new(store), GameDefaults::default()).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Persistence);
}

#[test]
fn test_table_survives_restart() {
    let mut path = std::env::temp_dir();
    path.push(format!("scorekeeper_it_{}.json", uuid::Uuid::new_v4()));

    let alice = {
        let mut table =
            Session::open(Box::new(JsonFileStore::new(&path)), GameDefaults::default()).unwrap();
        let alice = join(&mut table, "Alice", 100);
        table.set_bet(&alice, 30).unwrap();
        table.settle_player_loss(&alice).unwrap();
        table
            .create_loan(LoanRequest::new(AccountId::dealer(), alice.clone()))
            .unwrap();
        table.advance_round().unwrap();
        alice
    };

    let mut table =
        Session::open(Box::new(JsonFileStore::new(&path)), GameDefaults::default()).unwrap();
    assert_eq!(table.state().round, 1);
    assert_eq!(points_of(&table, &alice), 120);
    assert_eq!(table.state().history.len(), 1);
    assert_eq!(table.active_loans().len(), 1);

    // Loan ids keep counting after a restart.
    let LedgerEvent::LoanCreated { loan } = table
        .create_loan(LoanRequest::new(AccountId::dealer(), alice))
        .unwrap()
    else {
        panic!("expected LoanCreated");
    };
    assert_eq!(loan.id, LoanId(2));

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_tampered_file_is_rejected() {
    let mut path = std::env::temp_dir();
    path.push(format!("scorekeeper_it_{}.json", uuid::Uuid::new_v4()));

    let store = JsonFileStore::new(&path);
    let mut state = scorekeeper::types::GameState::default();
    state.dealer.current_bet = -3;
    store.save(&state).unwrap();

    let err = Session::open(Box::new(JsonFileStore::new(&path)), GameDefaults::default())
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Persistence);

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_new_game_clears_the_table() {
    let mut table = open_table();
    let alice = join(&mut table, "Alice", 100);
    table
        .create_loan(LoanRequest::new(AccountId::dealer(), alice))
        .unwrap();
    table.advance_round().unwrap();

    table.new_game().unwrap();

    let state = table.state();
    assert!(state.players.is_empty());
    assert!(state.loans.is_empty());
    assert!(state.history.is_empty());
    assert_eq!(state.round, 0);
    assert_eq!(state.dealer.points, 1000);
}
