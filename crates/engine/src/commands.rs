//! Command structs for engine operations.
//!
//! These types group parameters for write operations
//! (income/expense/itemized/transfer/update, new accounts), keeping call sites
//! readable and avoiding long argument lists.

use chrono::NaiveDate;
use uuid::Uuid;

use crate::{AccountKind, Currency, ItemDirection, ItemDraft};

/// Common metadata for transaction creation.
#[derive(Clone, Debug, PartialEq)]
pub struct TxMeta {
    pub date: NaiveDate,
    pub description: String,
    pub payee: Option<String>,
    pub payer: Option<String>,
    pub external_ref: Option<String>,
    /// Informational rate shown next to the transaction (default 1.0).
    pub exchange_rate: f64,
    /// Display currency; defaults to the asset account currency.
    pub currency: Option<Currency>,
}

impl TxMeta {
    #[must_use]
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            description: String::new(),
            payee: None,
            payer: None,
            external_ref: None,
            exchange_rate: 1.0,
            currency: None,
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn payee(mut self, payee: impl Into<String>) -> Self {
        self.payee = Some(payee.into());
        self
    }

    #[must_use]
    pub fn payer(mut self, payer: impl Into<String>) -> Self {
        self.payer = Some(payer.into());
        self
    }

    #[must_use]
    pub fn external_ref(mut self, external_ref: impl Into<String>) -> Self {
        self.external_ref = Some(external_ref.into());
        self
    }

    #[must_use]
    pub fn exchange_rate(mut self, rate: f64) -> Self {
        self.exchange_rate = rate;
        self
    }

    #[must_use]
    pub fn currency(mut self, currency: Currency) -> Self {
        self.currency = Some(currency);
        self
    }
}

/// What a transaction posts, independent of its header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Posting {
    Income {
        income_account_id: Uuid,
        asset_account_id: Uuid,
        amount_minor: i64,
    },
    Expense {
        expense_account_id: Uuid,
        asset_account_id: Uuid,
        amount_minor: i64,
    },
    Itemized {
        asset_account_id: Uuid,
        direction: ItemDirection,
        items: Vec<ItemDraft>,
    },
    Transfer {
        from_account_id: Uuid,
        to_account_id: Uuid,
        amount_minor: i64,
        /// `(expense account, amount)` charged to the source.
        fee: Option<(Uuid, i64)>,
    },
}

/// Create an income transaction.
#[derive(Clone, Debug)]
pub struct IncomeCmd {
    pub user_id: String,
    pub income_account_id: Uuid,
    pub asset_account_id: Uuid,
    pub amount_minor: i64,
    pub meta: TxMeta,
}

impl IncomeCmd {
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        income_account_id: Uuid,
        asset_account_id: Uuid,
        amount_minor: i64,
        date: NaiveDate,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            income_account_id,
            asset_account_id,
            amount_minor,
            meta: TxMeta::new(date),
        }
    }

    #[must_use]
    pub fn meta(mut self, meta: TxMeta) -> Self {
        self.meta = meta;
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.meta.description = description.into();
        self
    }

    #[must_use]
    pub fn payer(mut self, payer: impl Into<String>) -> Self {
        self.meta.payer = Some(payer.into());
        self
    }
}

/// Create an expense transaction.
#[derive(Clone, Debug)]
pub struct ExpenseCmd {
    pub user_id: String,
    pub expense_account_id: Uuid,
    pub asset_account_id: Uuid,
    pub amount_minor: i64,
    pub meta: TxMeta,
}

impl ExpenseCmd {
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        expense_account_id: Uuid,
        asset_account_id: Uuid,
        amount_minor: i64,
        date: NaiveDate,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            expense_account_id,
            asset_account_id,
            amount_minor,
            meta: TxMeta::new(date),
        }
    }

    #[must_use]
    pub fn meta(mut self, meta: TxMeta) -> Self {
        self.meta = meta;
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.meta.description = description.into();
        self
    }

    #[must_use]
    pub fn payee(mut self, payee: impl Into<String>) -> Self {
        self.meta.payee = Some(payee.into());
        self
    }
}

/// Create a transaction split across several categories.
#[derive(Clone, Debug)]
pub struct ItemizedCmd {
    pub user_id: String,
    pub asset_account_id: Uuid,
    pub direction: ItemDirection,
    pub items: Vec<ItemDraft>,
    pub meta: TxMeta,
}

impl ItemizedCmd {
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        asset_account_id: Uuid,
        direction: ItemDirection,
        date: NaiveDate,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            asset_account_id,
            direction,
            items: Vec::new(),
            meta: TxMeta::new(date),
        }
    }

    #[must_use]
    pub fn item(mut self, item: ItemDraft) -> Self {
        self.items.push(item);
        self
    }

    #[must_use]
    pub fn meta(mut self, meta: TxMeta) -> Self {
        self.meta = meta;
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.meta.description = description.into();
        self
    }
}

/// Move money between two asset accounts.
#[derive(Clone, Debug)]
pub struct TransferCmd {
    pub user_id: String,
    pub from_account_id: Uuid,
    pub to_account_id: Uuid,
    pub amount_minor: i64,
    pub fee: Option<(Uuid, i64)>,
    pub meta: TxMeta,
}

impl TransferCmd {
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        from_account_id: Uuid,
        to_account_id: Uuid,
        amount_minor: i64,
        date: NaiveDate,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            from_account_id,
            to_account_id,
            amount_minor,
            fee: None,
            meta: TxMeta::new(date),
        }
    }

    /// Charge `amount_minor` to `expense_account_id` on top of the transfer.
    #[must_use]
    pub fn fee(mut self, expense_account_id: Uuid, amount_minor: i64) -> Self {
        self.fee = Some((expense_account_id, amount_minor));
        self
    }

    #[must_use]
    pub fn meta(mut self, meta: TxMeta) -> Self {
        self.meta = meta;
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.meta.description = description.into();
        self
    }
}

/// Rewrite an existing transaction: header and every line.
#[derive(Clone, Debug)]
pub struct UpdateTransactionCmd {
    pub user_id: String,
    pub transaction_id: Uuid,
    pub posting: Posting,
    pub meta: TxMeta,
}

impl UpdateTransactionCmd {
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        transaction_id: Uuid,
        posting: Posting,
        meta: TxMeta,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            transaction_id,
            posting,
            meta,
        }
    }
}

impl IncomeCmd {
    pub(crate) fn into_parts(self) -> (String, Posting, TxMeta) {
        let posting = Posting::Income {
            income_account_id: self.income_account_id,
            asset_account_id: self.asset_account_id,
            amount_minor: self.amount_minor,
        };
        (self.user_id, posting, self.meta)
    }
}

impl ExpenseCmd {
    pub(crate) fn into_parts(self) -> (String, Posting, TxMeta) {
        let posting = Posting::Expense {
            expense_account_id: self.expense_account_id,
            asset_account_id: self.asset_account_id,
            amount_minor: self.amount_minor,
        };
        (self.user_id, posting, self.meta)
    }
}

impl ItemizedCmd {
    pub(crate) fn into_parts(self) -> (String, Posting, TxMeta) {
        let posting = Posting::Itemized {
            asset_account_id: self.asset_account_id,
            direction: self.direction,
            items: self.items,
        };
        (self.user_id, posting, self.meta)
    }
}

impl TransferCmd {
    pub(crate) fn into_parts(self) -> (String, Posting, TxMeta) {
        let posting = Posting::Transfer {
            from_account_id: self.from_account_id,
            to_account_id: self.to_account_id,
            amount_minor: self.amount_minor,
            fee: self.fee,
        };
        (self.user_id, posting, self.meta)
    }
}

/// Create an account in the chart of accounts.
#[derive(Clone, Debug)]
pub struct NewAccountCmd {
    pub user_id: String,
    pub name: String,
    pub kind: AccountKind,
    pub parent_id: Option<Uuid>,
    pub currency: Option<Currency>,
    pub is_wallet: bool,
    pub opening_balance_minor: i64,
}

impl NewAccountCmd {
    #[must_use]
    pub fn new(user_id: impl Into<String>, name: impl Into<String>, kind: AccountKind) -> Self {
        Self {
            user_id: user_id.into(),
            name: name.into(),
            kind,
            parent_id: None,
            currency: None,
            is_wallet: false,
            opening_balance_minor: 0,
        }
    }

    #[must_use]
    pub fn parent(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    #[must_use]
    pub fn currency(mut self, currency: Currency) -> Self {
        self.currency = Some(currency);
        self
    }

    /// Mark an asset account as a wallet, optionally with an opening balance.
    #[must_use]
    pub fn wallet(mut self, opening_balance_minor: i64) -> Self {
        self.is_wallet = true;
        self.opening_balance_minor = opening_balance_minor;
        self
    }
}
