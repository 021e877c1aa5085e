//! Double-entry line builders.
//!
//! Every change to balances is expressed as a set of [`LineDraft`]s whose
//! debits and credits sum to the same amount. The functions in this module
//! are pure: they never touch storage, so every write path can build and
//! validate its lines before opening a database transaction.
//!
//! Sign conventions follow the usual accounting rules:
//! - asset and expense accounts grow with debits
//! - liability, income and equity accounts grow with credits

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AccountKind, EngineError, ResultEngine};

/// Largest absolute difference between debits and credits that still counts
/// as balanced, in minor units (exclusive).
pub const BALANCE_TOLERANCE_MINOR: i64 = 1;

/// Which column of the ledger a line posts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "side", content = "amount_minor")]
pub enum LineSide {
    Debit(i64),
    Credit(i64),
}

impl LineSide {
    #[must_use]
    pub fn debit_minor(self) -> i64 {
        match self {
            Self::Debit(amount) => amount,
            Self::Credit(_) => 0,
        }
    }

    #[must_use]
    pub fn credit_minor(self) -> i64 {
        match self {
            Self::Debit(_) => 0,
            Self::Credit(amount) => amount,
        }
    }
}

/// A line that has not been persisted yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineDraft {
    pub account_id: Uuid,
    pub side: LineSide,
}

impl LineDraft {
    #[must_use]
    pub fn debit(account_id: Uuid, amount_minor: i64) -> Self {
        Self {
            account_id,
            side: LineSide::Debit(amount_minor),
        }
    }

    #[must_use]
    pub fn credit(account_id: Uuid, amount_minor: i64) -> Self {
        Self {
            account_id,
            side: LineSide::Credit(amount_minor),
        }
    }
}

/// Whether itemized categories are spent into or earned from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemDirection {
    Expense,
    Income,
}

impl ItemDirection {
    /// Account kind every item category must have.
    #[must_use]
    pub fn category_kind(self) -> AccountKind {
        match self {
            Self::Expense => AccountKind::Expense,
            Self::Income => AccountKind::Income,
        }
    }
}

/// One category entry of an itemized transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDraft {
    pub account_id: Uuid,
    pub amount_minor: i64,
    pub description: String,
}

impl ItemDraft {
    #[must_use]
    pub fn new(account_id: Uuid, amount_minor: i64) -> Self {
        Self {
            account_id,
            amount_minor,
            description: String::new(),
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Money flows in: the asset is debited, the income account credited.
#[must_use]
pub fn generate_income_lines(
    income_account_id: Uuid,
    asset_account_id: Uuid,
    amount_minor: i64,
) -> Vec<LineDraft> {
    vec![
        LineDraft::debit(asset_account_id, amount_minor),
        LineDraft::credit(income_account_id, amount_minor),
    ]
}

/// Money flows out: the expense account is debited, the asset credited.
#[must_use]
pub fn generate_expense_lines(
    expense_account_id: Uuid,
    asset_account_id: Uuid,
    amount_minor: i64,
) -> Vec<LineDraft> {
    vec![
        LineDraft::debit(expense_account_id, amount_minor),
        LineDraft::credit(asset_account_id, amount_minor),
    ]
}

/// Builds the lines of an itemized transaction.
///
/// Items are grouped by category account in first-seen order, so two items
/// on the same category become a single line. The asset side is one line
/// carrying the total of all items.
#[must_use]
pub fn generate_lines_from_items(
    items: &[ItemDraft],
    asset_account_id: Uuid,
    direction: ItemDirection,
) -> Vec<LineDraft> {
    let mut grouped: Vec<(Uuid, i64)> = Vec::new();
    for item in items {
        match grouped.iter_mut().find(|(id, _)| *id == item.account_id) {
            Some((_, sum)) => *sum += item.amount_minor,
            None => grouped.push((item.account_id, item.amount_minor)),
        }
    }
    let total: i64 = grouped.iter().map(|(_, sum)| sum).sum();

    let mut lines = Vec::with_capacity(grouped.len() + 1);
    match direction {
        ItemDirection::Expense => {
            lines.extend(grouped.iter().map(|(id, sum)| LineDraft::debit(*id, *sum)));
            lines.push(LineDraft::credit(asset_account_id, total));
        }
        ItemDirection::Income => {
            lines.push(LineDraft::debit(asset_account_id, total));
            lines.extend(grouped.iter().map(|(id, sum)| LineDraft::credit(*id, *sum)));
        }
    }
    lines
}

/// Moves `amount_minor` between two assets.
///
/// The source pays the fee too: it is credited `amount + fee`, the
/// destination is debited `amount` and the fee expense account is debited
/// `fee`.
#[must_use]
pub fn generate_transfer_lines(
    from_account_id: Uuid,
    to_account_id: Uuid,
    amount_minor: i64,
    fee: Option<(Uuid, i64)>,
) -> Vec<LineDraft> {
    let fee_minor = fee.map_or(0, |(_, fee_minor)| fee_minor);
    let mut lines = vec![
        LineDraft::credit(from_account_id, amount_minor + fee_minor),
        LineDraft::debit(to_account_id, amount_minor),
    ];
    if let Some((fee_account_id, fee_minor)) = fee {
        lines.push(LineDraft::debit(fee_account_id, fee_minor));
    }
    lines
}

/// Sums `(debits, credits)` of a set of lines.
#[must_use]
pub fn totals(lines: &[LineDraft]) -> (i64, i64) {
    lines.iter().fold((0, 0), |(debits, credits), line| {
        (
            debits + line.side.debit_minor(),
            credits + line.side.credit_minor(),
        )
    })
}

/// `true` iff debits and credits differ by less than one minor unit.
#[must_use]
pub fn validate_balance(lines: &[LineDraft]) -> bool {
    let (debits, credits) = totals(lines);
    (debits - credits).abs() < BALANCE_TOLERANCE_MINOR
}

/// Same as [`validate_balance`], as an engine error.
pub fn ensure_balanced(lines: &[LineDraft]) -> ResultEngine<()> {
    if validate_balance(lines) {
        return Ok(());
    }
    let (debits, credits) = totals(lines);
    Err(EngineError::Unbalanced(format!(
        "debits {debits} != credits {credits}"
    )))
}

/// Natural balance of an account given its debit and credit totals.
#[must_use]
pub fn calculate_account_balance(kind: AccountKind, debits_minor: i64, credits_minor: i64) -> i64 {
    if kind.is_debit_normal() {
        debits_minor - credits_minor
    } else {
        credits_minor - debits_minor
    }
}

/// [`calculate_account_balance`] that returns `None` instead of overflowing.
#[must_use]
pub fn checked_account_balance(
    kind: AccountKind,
    debits_minor: i64,
    credits_minor: i64,
) -> Option<i64> {
    if kind.is_debit_normal() {
        debits_minor.checked_sub(credits_minor)
    } else {
        credits_minor.checked_sub(debits_minor)
    }
}
