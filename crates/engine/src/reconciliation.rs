//! Bank statement reconciliation.
//!
//! A statement is uploaded as ordered [`StatementRow`]s. Each row is matched
//! against the ledger transactions touching the reconciled account: a
//! transaction matches iff it happened on the same day and its displayed
//! amount differs from the row by less than [`AMOUNT_TOLERANCE`]. The row
//! direction is kept for display only, since transactions store an unsigned
//! amount.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Currency, EngineError, Money, ResultEngine, Transaction, TransactionKind};

/// Maximum amount difference, in major units (exclusive).
pub const AMOUNT_TOLERANCE: f64 = 0.01;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Credit,
    Debit,
}

/// One parsed statement line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatementRow {
    pub date: NaiveDate,
    pub description: String,
    /// Unsigned amount in major units.
    pub amount: f64,
    #[serde(rename = "type")]
    pub direction: Direction,
}

impl StatementRow {
    pub(crate) fn validate(&self, index: usize) -> ResultEngine<()> {
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "statement row {index}: amount must be a non-negative number"
            )));
        }
        Ok(())
    }
}

/// The parts of a ledger transaction the matcher looks at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerCandidate {
    pub transaction_id: Uuid,
    pub date: NaiveDate,
    pub amount_minor: i64,
    pub currency: Currency,
    pub kind: TransactionKind,
    pub description: String,
}

impl LedgerCandidate {
    /// Displayed amount in major units.
    #[must_use]
    pub fn amount(&self) -> f64 {
        Money::new(self.amount_minor).to_major(self.currency)
    }
}

impl From<&Transaction> for LedgerCandidate {
    fn from(tx: &Transaction) -> Self {
        Self {
            transaction_id: tx.id,
            date: tx.date,
            amount_minor: tx.amount_minor,
            currency: tx.currency,
            kind: tx.kind,
            description: tx.description.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchConfidence {
    Exact,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub candidate: LedgerCandidate,
    pub confidence: MatchConfidence,
}

/// Every candidate matching `row`, in the order they were given.
#[must_use]
pub fn find_matches(row: &StatementRow, candidates: &[LedgerCandidate]) -> Vec<MatchCandidate> {
    candidates
        .iter()
        .filter(|c| c.date == row.date && (row.amount - c.amount()).abs() < AMOUNT_TOLERANCE)
        .map(|c| MatchCandidate {
            candidate: c.clone(),
            confidence: MatchConfidence::Exact,
        })
        .collect()
}

/// First match, used as the default pairing for a row.
#[must_use]
pub fn auto_match(row: &StatementRow, candidates: &[LedgerCandidate]) -> Option<MatchCandidate> {
    find_matches(row, candidates).into_iter().next()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Auto,
    Manual,
    None,
}

impl MatchType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
            Self::None => "none",
        }
    }
}

impl TryFrom<&str> for MatchType {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "auto" => Ok(Self::Auto),
            "manual" => Ok(Self::Manual),
            "none" => Ok(Self::None),
            other => Err(EngineError::InvalidInput(format!(
                "invalid match type: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Completed,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

impl TryFrom<&str> for SessionStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            other => Err(EngineError::InvalidInput(format!(
                "invalid session status: {other}"
            ))),
        }
    }
}

/// Pairing of one statement row with (at most) one transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationMatch {
    pub row_index: usize,
    pub transaction_id: Option<Uuid>,
    pub match_type: MatchType,
}

impl ReconciliationMatch {
    #[must_use]
    pub fn is_matched(&self) -> bool {
        self.transaction_id.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationSession {
    pub id: Uuid,
    pub user_id: String,
    pub account_id: Uuid,
    pub filename: String,
    pub rows: Vec<StatementRow>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// One entry per row, ordered by `row_index`.
    pub matches: Vec<ReconciliationMatch>,
}

impl ReconciliationSession {
    #[must_use]
    pub fn unmatched_count(&self) -> usize {
        self.matches.iter().filter(|m| !m.is_matched()).count()
    }
}

/// Listing entry for a session, without its rows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    pub id: Uuid,
    pub account_id: Uuid,
    pub filename: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub row_count: usize,
    pub matched_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn row(d: &str, amount: f64) -> StatementRow {
        StatementRow {
            date: date(d),
            description: "TRANSFER".to_string(),
            amount,
            direction: Direction::Debit,
        }
    }

    fn candidate(d: &str, amount_minor: i64) -> LedgerCandidate {
        LedgerCandidate {
            transaction_id: Uuid::new_v4(),
            date: date(d),
            amount_minor,
            currency: Currency::EUR,
            kind: TransactionKind::Expense,
            description: String::new(),
        }
    }

    #[test]
    fn match_requires_same_date_and_amount() {
        let row = row("2026-01-05", 50_000.0);
        let same = candidate("2026-01-05", 5_000_000);
        let next_day = candidate("2026-01-06", 5_000_000);
        let one_more = candidate("2026-01-05", 5_000_100);

        let matches = find_matches(&row, &[next_day, same.clone(), one_more]);

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].candidate, same);
        assert_eq!(matches[0].confidence, MatchConfidence::Exact);
    }

    #[test]
    fn two_cents_apart_do_not_match() {
        let row = row("2026-01-05", 10.00);
        assert_eq!(find_matches(&row, &[candidate("2026-01-05", 1_000)]).len(), 1);
        assert!(find_matches(&row, &[candidate("2026-01-05", 1_002)]).is_empty());
        assert!(find_matches(&row, &[candidate("2026-01-05", 998)]).is_empty());
    }

    #[test]
    fn direction_does_not_filter() {
        let mut credit = row("2026-02-01", 25.5);
        credit.direction = Direction::Credit;
        let mut income = candidate("2026-02-01", 2_550);
        income.kind = TransactionKind::Income;
        let expense = candidate("2026-02-01", 2_550);

        assert_eq!(find_matches(&credit, &[income, expense]).len(), 2);
    }

    #[test]
    fn auto_match_takes_first_in_discovery_order() {
        let row = row("2026-03-10", 12.0);
        let first = candidate("2026-03-10", 1_200);
        let second = candidate("2026-03-10", 1_200);

        let picked = auto_match(&row, &[first.clone(), second]).unwrap();
        assert_eq!(picked.candidate.transaction_id, first.transaction_id);
        assert!(auto_match(&row, &[]).is_none());
    }

    #[test]
    fn statement_row_uses_type_field() {
        let parsed: StatementRow = serde_json::from_str(
            r#"{"date":"2026-01-05","description":"ATM","amount":50000,"type":"debit"}"#,
        )
        .unwrap();
        assert_eq!(parsed.direction, Direction::Debit);
        assert_eq!(parsed.amount, 50_000.0);
        assert!(parsed.validate(0).is_ok());
        assert!(row("2026-01-05", -1.0).validate(3).is_err());
    }
}
