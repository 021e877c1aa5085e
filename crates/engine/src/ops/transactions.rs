use sea_orm::DatabaseTransaction;

use crate::{
    AccountKind, Currency, EngineError, ItemDirection, ItemDraft, LineDraft, Posting,
    ResultEngine, Transaction, TransactionKind, TxMeta,
    ledger::{
        ensure_balanced, generate_expense_lines, generate_income_lines, generate_lines_from_items,
        generate_transfer_lines,
    },
    util::{ensure_positive, normalize_optional_text},
};

use super::Engine;

mod list;
mod write;

pub use list::TransactionListFilter;

/// A posting checked against the accounts it references.
#[derive(Debug)]
struct ResolvedPosting {
    kind: TransactionKind,
    amount_minor: i64,
    /// Currency of the asset side.
    currency: Currency,
    lines: Vec<LineDraft>,
    items: Vec<ItemDraft>,
    direction: Option<ItemDirection>,
}

impl Engine {
    /// Validates `posting` and builds its (balanced) lines.
    ///
    /// Accounts must belong to `user_id` and be active; their kinds must fit
    /// the role they play in the posting.
    async fn resolve_posting(
        &self,
        db_tx: &DatabaseTransaction,
        user_id: &str,
        posting: &Posting,
        base: Currency,
    ) -> ResultEngine<ResolvedPosting> {
        let resolved = match posting {
            Posting::Income {
                income_account_id,
                asset_account_id,
                amount_minor,
            } => {
                ensure_positive(*amount_minor, "amount_minor")?;
                self.require_postable_account(
                    db_tx,
                    user_id,
                    *income_account_id,
                    AccountKind::Income,
                    "income",
                )
                .await?;
                let asset = self
                    .require_postable_account(
                        db_tx,
                        user_id,
                        *asset_account_id,
                        AccountKind::Asset,
                        "asset",
                    )
                    .await?;
                ResolvedPosting {
                    kind: TransactionKind::Income,
                    amount_minor: *amount_minor,
                    currency: asset.effective_currency(base),
                    lines: generate_income_lines(
                        *income_account_id,
                        *asset_account_id,
                        *amount_minor,
                    ),
                    items: Vec::new(),
                    direction: None,
                }
            }
            Posting::Expense {
                expense_account_id,
                asset_account_id,
                amount_minor,
            } => {
                ensure_positive(*amount_minor, "amount_minor")?;
                self.require_postable_account(
                    db_tx,
                    user_id,
                    *expense_account_id,
                    AccountKind::Expense,
                    "expense",
                )
                .await?;
                let asset = self
                    .require_postable_account(
                        db_tx,
                        user_id,
                        *asset_account_id,
                        AccountKind::Asset,
                        "asset",
                    )
                    .await?;
                ResolvedPosting {
                    kind: TransactionKind::Expense,
                    amount_minor: *amount_minor,
                    currency: asset.effective_currency(base),
                    lines: generate_expense_lines(
                        *expense_account_id,
                        *asset_account_id,
                        *amount_minor,
                    ),
                    items: Vec::new(),
                    direction: None,
                }
            }
            Posting::Itemized {
                asset_account_id,
                direction,
                items,
            } => {
                if items.is_empty() {
                    return Err(EngineError::InvalidInput(
                        "itemized transaction needs at least one item".to_string(),
                    ));
                }
                let mut total: i64 = 0;
                for item in items {
                    ensure_positive(item.amount_minor, "item amount_minor")?;
                    self.require_postable_account(
                        db_tx,
                        user_id,
                        item.account_id,
                        direction.category_kind(),
                        "category",
                    )
                    .await?;
                    total = total.checked_add(item.amount_minor).ok_or_else(|| {
                        EngineError::InvalidInput("items total is too large".to_string())
                    })?;
                }
                let asset = self
                    .require_postable_account(
                        db_tx,
                        user_id,
                        *asset_account_id,
                        AccountKind::Asset,
                        "asset",
                    )
                    .await?;
                let items: Vec<ItemDraft> = items
                    .iter()
                    .map(|item| ItemDraft {
                        account_id: item.account_id,
                        amount_minor: item.amount_minor,
                        description: item.description.trim().to_string(),
                    })
                    .collect();
                ResolvedPosting {
                    kind: match direction {
                        ItemDirection::Expense => TransactionKind::Expense,
                        ItemDirection::Income => TransactionKind::Income,
                    },
                    amount_minor: total,
                    currency: asset.effective_currency(base),
                    lines: generate_lines_from_items(&items, *asset_account_id, *direction),
                    items,
                    direction: Some(*direction),
                }
            }
            Posting::Transfer {
                from_account_id,
                to_account_id,
                amount_minor,
                fee,
            } => {
                ensure_positive(*amount_minor, "amount_minor")?;
                if from_account_id == to_account_id {
                    return Err(EngineError::InvalidInput(
                        "transfer accounts must differ".to_string(),
                    ));
                }
                let from = self
                    .require_postable_account(
                        db_tx,
                        user_id,
                        *from_account_id,
                        AccountKind::Asset,
                        "source",
                    )
                    .await?;
                self.require_postable_account(
                    db_tx,
                    user_id,
                    *to_account_id,
                    AccountKind::Asset,
                    "destination",
                )
                .await?;
                if let Some((fee_account_id, fee_minor)) = fee {
                    ensure_positive(*fee_minor, "fee")?;
                    self.require_postable_account(
                        db_tx,
                        user_id,
                        *fee_account_id,
                        AccountKind::Expense,
                        "fee",
                    )
                    .await?;
                    amount_minor.checked_add(*fee_minor).ok_or_else(|| {
                        EngineError::InvalidInput("transfer total is too large".to_string())
                    })?;
                }
                ResolvedPosting {
                    kind: TransactionKind::Transfer,
                    amount_minor: *amount_minor,
                    currency: from.effective_currency(base),
                    lines: generate_transfer_lines(
                        *from_account_id,
                        *to_account_id,
                        *amount_minor,
                        *fee,
                    ),
                    items: Vec::new(),
                    direction: None,
                }
            }
        };

        ensure_balanced(&resolved.lines)?;
        Ok(resolved)
    }
}

/// Builds a transaction header from a resolved posting and user metadata.
fn build_transaction(
    user_id: &str,
    resolved: &ResolvedPosting,
    meta: &TxMeta,
) -> ResultEngine<Transaction> {
    if !meta.exchange_rate.is_finite() || meta.exchange_rate <= 0.0 {
        return Err(EngineError::InvalidInput(
            "exchange_rate must be > 0".to_string(),
        ));
    }
    let mut tx = Transaction::new(
        user_id,
        resolved.kind,
        meta.date,
        resolved.amount_minor,
        meta.currency.unwrap_or(resolved.currency),
    )?;
    tx.description = meta.description.trim().to_string();
    tx.payee = normalize_optional_text(meta.payee.as_deref());
    tx.payer = normalize_optional_text(meta.payer.as_deref());
    tx.external_ref = normalize_optional_text(meta.external_ref.as_deref());
    tx.exchange_rate = meta.exchange_rate;
    Ok(tx)
}
