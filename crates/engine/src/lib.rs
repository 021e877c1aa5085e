//! Quaderno ledger engine.
//!
//! A personal, multi-currency, double-entry ledger:
//!
//! - [`ledger`]: pure builders for balanced transaction lines
//! - [`hierarchy`]: chart-of-accounts rollups
//! - [`rates`]: exchange rate cache and conversion batcher
//! - [`reconciliation`]: bank statement matching
//!
//! Every stateful operation is a method on [`Engine`] taking the
//! authenticated `user_id`.

pub use accounts::{Account, AccountKind, MAX_ACCOUNT_LEVEL, WalletBalance};
pub use attachments::{AttachmentStore, NoopAttachmentStore};
pub use commands::{
    ExpenseCmd, IncomeCmd, ItemizedCmd, NewAccountCmd, Posting, TransferCmd, TxMeta,
    UpdateTransactionCmd,
};
pub use currency::Currency;
pub use error::EngineError;
pub use hierarchy::{AccountNode, AccountTotals, build_account_tree, descendant_ids};
pub use ledger::{
    BALANCE_TOLERANCE_MINOR, ItemDirection, ItemDraft, LineDraft, LineSide,
    calculate_account_balance, checked_account_balance, generate_expense_lines,
    generate_income_lines, generate_lines_from_items, generate_transfer_lines, validate_balance,
};
pub use line_items::LineItem;
pub use lines::Line;
pub use money::Money;
pub use ops::{Engine, EngineBuilder, TransactionListFilter};
pub use rates::{
    ConversionBatcher, ConversionRequest, Converted, ExchangeRateCache, ProviderError,
    RateError, RateProvider,
};
pub use reconciliation::{
    Direction, LedgerCandidate, MatchCandidate, MatchConfidence, MatchType, ReconciliationMatch,
    ReconciliationSession, ReconciliationSummary, SessionStatus, StatementRow, auto_match,
    find_matches,
};
pub use settings::{RatesSettings, Settings};
pub use transactions::{Transaction, TransactionKind};

mod accounts;
mod attachments;
mod commands;
mod currency;
mod error;
mod exchange_rates;
pub mod hierarchy;
pub mod ledger;
mod line_items;
mod lines;
mod money;
mod ops;
pub mod rates;
pub mod reconciliation;
mod reconciliation_matches;
mod reconciliation_sessions;
mod settings;
mod transactions;
mod users;
mod util;

type ResultEngine<T> = Result<T, EngineError>;
