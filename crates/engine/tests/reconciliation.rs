use chrono::NaiveDate;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};

use engine::{
    AccountKind, Direction, Engine, EngineError, ExpenseCmd, IncomeCmd, MatchType,
    NewAccountCmd, SessionStatus, StatementRow,
};
use migration::MigratorTrait;
use uuid::Uuid;

async fn engine_with_db() -> (Engine, DatabaseConnection) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let backend = db.get_database_backend();
    for user in ["alice", "bob"] {
        db.execute(Statement::from_sql_and_values(
            backend,
            "INSERT INTO users (username, base_currency) VALUES (?, ?)",
            vec![user.into(), "EUR".into()],
        ))
        .await
        .unwrap();
    }
    let engine = Engine::builder()
        .database(db.clone())
        .build()
        .await
        .unwrap();
    (engine, db)
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn row(d: &str, amount: f64, direction: Direction) -> StatementRow {
    StatementRow {
        date: date(d),
        description: "BANK LINE".to_string(),
        amount,
        direction,
    }
}

struct Ledger {
    bank: Uuid,
    cash: Uuid,
    rent_paid: Uuid,
    salary_in: Uuid,
    coffee: Uuid,
}

/// Bank: rent 500.00 on Jan 5th, salary 2000.00 on Jan 10th.
/// Cash: coffee 3.50 on Jan 5th.
async fn ledger(engine: &Engine) -> Ledger {
    let bank = engine
        .new_account(NewAccountCmd::new("alice", "Bank", AccountKind::Asset))
        .await
        .unwrap();
    let cash = engine
        .new_account(NewAccountCmd::new("alice", "Cash", AccountKind::Asset))
        .await
        .unwrap();
    let rent = engine
        .new_account(NewAccountCmd::new("alice", "Rent", AccountKind::Expense))
        .await
        .unwrap();
    let salary = engine
        .new_account(NewAccountCmd::new("alice", "Salary", AccountKind::Income))
        .await
        .unwrap();

    let rent_paid = engine
        .record_expense(ExpenseCmd::new("alice", rent, bank, 50_000, date("2026-01-05")))
        .await
        .unwrap();
    let salary_in = engine
        .record_income(IncomeCmd::new("alice", salary, bank, 200_000, date("2026-01-10")))
        .await
        .unwrap();
    let coffee = engine
        .record_expense(ExpenseCmd::new("alice", rent, cash, 350, date("2026-01-05")))
        .await
        .unwrap();

    Ledger {
        bank,
        cash,
        rent_paid,
        salary_in,
        coffee,
    }
}

#[tokio::test]
async fn new_session_auto_matches_exact_rows_only() {
    let (engine, _db) = engine_with_db().await;
    let l = ledger(&engine).await;

    let session_id = engine
        .create_reconciliation_session(
            "alice",
            l.bank,
            "january.csv",
            vec![
                row("2026-01-05", 500.0, Direction::Debit),
                row("2026-01-10", 2000.004, Direction::Credit),
                row("2026-01-05", 3.5, Direction::Debit),
                row("2026-01-11", 500.0, Direction::Debit),
            ],
        )
        .await
        .unwrap();

    let session = engine
        .reconciliation_session("alice", session_id)
        .await
        .unwrap();
    assert_eq!(session.status, SessionStatus::InProgress);
    assert_eq!(session.filename, "january.csv");
    assert_eq!(session.rows.len(), 4);
    let matched: Vec<(usize, Option<Uuid>, MatchType)> = session
        .matches
        .iter()
        .map(|m| (m.row_index, m.transaction_id, m.match_type))
        .collect();
    assert_eq!(
        matched,
        vec![
            (0, Some(l.rent_paid), MatchType::Auto),
            (1, Some(l.salary_in), MatchType::Auto),
            // The coffee was paid in cash, not from the bank.
            (2, None, MatchType::None),
            (3, None, MatchType::None),
        ]
    );
    assert_eq!(session.unmatched_count(), 2);

    let candidates = engine
        .match_candidates("alice", session_id, 0)
        .await
        .unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].candidate.transaction_id, l.rent_paid);
    assert!(
        engine
            .match_candidates("alice", session_id, 3)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn completion_requires_every_row_matched() {
    let (engine, _db) = engine_with_db().await;
    let l = ledger(&engine).await;
    let session_id = engine
        .create_reconciliation_session(
            "alice",
            l.bank,
            "january.csv",
            vec![
                row("2026-01-05", 500.0, Direction::Debit),
                row("2026-01-12", 19.99, Direction::Debit),
            ],
        )
        .await
        .unwrap();

    let err = engine
        .complete_reconciliation_session("alice", session_id)
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::Unreconciled(1));

    engine
        .match_transaction("alice", session_id, 1, l.salary_in)
        .await
        .unwrap();
    engine
        .complete_reconciliation_session("alice", session_id)
        .await
        .unwrap();

    let session = engine
        .reconciliation_session("alice", session_id)
        .await
        .unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session.completed_at.is_some());
    assert_eq!(session.matches[1].match_type, MatchType::Manual);

    // Completed sessions are frozen.
    let err = engine
        .unmatch_transaction("alice", session_id, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
    let err = engine
        .auto_match_all_transactions("alice", session_id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
    let err = engine
        .complete_reconciliation_session("alice", session_id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));

    let summaries = engine.reconciliation_sessions("alice").await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].id, session_id);
    assert_eq!(summaries[0].row_count, 2);
    assert_eq!(summaries[0].matched_count, 2);
    assert_eq!(summaries[0].status, SessionStatus::Completed);
}

#[tokio::test]
async fn manual_matches_upsert_and_bulk_auto_match_replaces_them() {
    let (engine, _db) = engine_with_db().await;
    let l = ledger(&engine).await;
    let session_id = engine
        .create_reconciliation_session(
            "alice",
            l.bank,
            "january.csv",
            vec![
                row("2026-01-05", 500.0, Direction::Debit),
                row("2026-01-12", 19.99, Direction::Debit),
            ],
        )
        .await
        .unwrap();

    engine
        .match_transaction("alice", session_id, 0, l.coffee)
        .await
        .unwrap();
    engine
        .match_transaction("alice", session_id, 1, l.salary_in)
        .await
        .unwrap();
    let session = engine
        .reconciliation_session("alice", session_id)
        .await
        .unwrap();
    assert_eq!(session.matches.len(), 2);
    assert_eq!(session.matches[0].transaction_id, Some(l.coffee));
    assert_eq!(session.matches[0].match_type, MatchType::Manual);

    engine
        .unmatch_transaction("alice", session_id, 1)
        .await
        .unwrap();
    let session = engine
        .reconciliation_session("alice", session_id)
        .await
        .unwrap();
    assert_eq!(session.matches[1].transaction_id, None);
    assert_eq!(session.matches[1].match_type, MatchType::None);

    let matched = engine
        .auto_match_all_transactions("alice", session_id)
        .await
        .unwrap();
    assert_eq!(matched, 1);
    let session = engine
        .reconciliation_session("alice", session_id)
        .await
        .unwrap();
    assert_eq!(session.matches.len(), 2);
    assert_eq!(session.matches[0].transaction_id, Some(l.rent_paid));
    assert_eq!(session.matches[0].match_type, MatchType::Auto);
    assert_eq!(session.matches[1].match_type, MatchType::None);
}

#[tokio::test]
async fn deleting_a_transaction_unmatches_its_rows() {
    let (engine, _db) = engine_with_db().await;
    let l = ledger(&engine).await;
    let session_id = engine
        .create_reconciliation_session(
            "alice",
            l.bank,
            "january.csv",
            vec![row("2026-01-05", 500.0, Direction::Debit)],
        )
        .await
        .unwrap();

    engine
        .delete_transaction("alice", l.rent_paid)
        .await
        .unwrap();

    let session = engine
        .reconciliation_session("alice", session_id)
        .await
        .unwrap();
    assert_eq!(session.matches[0].transaction_id, None);
    assert_eq!(session.matches[0].match_type, MatchType::None);
}

#[tokio::test]
async fn session_inputs_are_validated() {
    let (engine, _db) = engine_with_db().await;
    let l = ledger(&engine).await;
    let rows = vec![row("2026-01-05", 500.0, Direction::Debit)];

    let err = engine
        .create_reconciliation_session("alice", l.bank, "empty.csv", Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));

    let err = engine
        .create_reconciliation_session(
            "alice",
            l.bank,
            "bad.csv",
            vec![row("2026-01-05", -1.0, Direction::Debit)],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));

    let rent = engine
        .accounts("alice")
        .await
        .unwrap()
        .into_iter()
        .find(|a| a.name == "Rent")
        .unwrap();
    let err = engine
        .create_reconciliation_session("alice", rent.id, "rent.csv", rows.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));

    let err = engine
        .create_reconciliation_session("bob", l.bank, "stolen.csv", rows.clone())
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::KeyNotFound("account not exists".to_string()));

    let err = engine
        .create_reconciliation_session("mallory", l.bank, "x.csv", rows.clone())
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::Unauthorized);

    let session_id = engine
        .create_reconciliation_session("alice", l.cash, "cash.csv", rows)
        .await
        .unwrap();

    let err = engine
        .match_transaction("alice", session_id, 5, l.coffee)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));

    let err = engine
        .reconciliation_session("bob", session_id)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::KeyNotFound("reconciliation session not exists".to_string())
    );
    assert!(engine.reconciliation_sessions("bob").await.unwrap().is_empty());

    let bobs_cash = engine
        .new_account(NewAccountCmd::new("bob", "Cash", AccountKind::Asset))
        .await
        .unwrap();
    let bobs_food = engine
        .new_account(NewAccountCmd::new("bob", "Food", AccountKind::Expense))
        .await
        .unwrap();
    let bobs_tx = engine
        .record_expense(ExpenseCmd::new("bob", bobs_food, bobs_cash, 350, date("2026-01-05")))
        .await
        .unwrap();
    let err = engine
        .match_transaction("alice", session_id, 0, bobs_tx)
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::KeyNotFound("transaction not exists".to_string()));
}
