use std::collections::HashMap;

use chrono::NaiveDate;
use uuid::Uuid;

use sea_orm::{
    DatabaseTransaction, QueryFilter, QueryOrder, QuerySelect, TransactionTrait, prelude::*,
    sea_query::Query,
};

use crate::{
    EngineError, Line, LineItem, ResultEngine, Transaction, TransactionKind, attachments,
    line_items, lines, transactions,
};

use super::super::{Engine, with_tx};

/// Filters for listing transactions.
///
/// `from` is inclusive and `to` is exclusive (`[from, to)`).
#[derive(Clone, Debug, Default)]
pub struct TransactionListFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    /// Only transactions with a line on this account.
    pub account_id: Option<Uuid>,
    /// If present, acts as an allow-list of kinds to return.
    pub kinds: Option<Vec<TransactionKind>>,
    pub limit: Option<u64>,
}

fn validate_list_filter(filter: &TransactionListFilter) -> ResultEngine<()> {
    if let (Some(from), Some(to)) = (filter.from, filter.to)
        && from >= to
    {
        return Err(EngineError::InvalidInput(
            "invalid range: from must be < to".to_string(),
        ));
    }
    if filter.kinds.as_ref().is_some_and(|k| k.is_empty()) {
        return Err(EngineError::InvalidInput(
            "kinds must not be empty".to_string(),
        ));
    }
    if filter.limit == Some(0) {
        return Err(EngineError::InvalidInput("limit must be > 0".to_string()));
    }
    Ok(())
}

trait ApplyTxFilters: QueryFilter + Sized {
    fn apply_tx_filters(self, filter: &TransactionListFilter) -> Self;
}

impl<T> ApplyTxFilters for T
where
    T: QueryFilter + Sized,
{
    fn apply_tx_filters(mut self, filter: &TransactionListFilter) -> Self {
        if let Some(from) = filter.from {
            self = self.filter(transactions::Column::Date.gte(from));
        }
        if let Some(to) = filter.to {
            self = self.filter(transactions::Column::Date.lt(to));
        }
        if let Some(kinds) = &filter.kinds {
            let kinds: Vec<String> = kinds.iter().map(|k| k.as_str().to_string()).collect();
            self = self.filter(transactions::Column::Kind.is_in(kinds));
        }
        if let Some(account_id) = filter.account_id {
            self = self.filter(
                transactions::Column::Id.in_subquery(
                    Query::select()
                        .column(lines::Column::TransactionId)
                        .from(lines::Entity)
                        .and_where(lines::Column::AccountId.eq(account_id.to_string()))
                        .to_owned(),
                ),
            );
        }
        self
    }
}

impl Engine {
    /// Returns a transaction with its lines, line items and attachments.
    pub async fn transaction(
        &self,
        user_id: &str,
        transaction_id: Uuid,
    ) -> ResultEngine<Transaction> {
        with_tx!(self, |db_tx| {
            self.require_user(&db_tx, user_id).await?;
            let model = self
                .require_transaction_model(&db_tx, user_id, transaction_id)
                .await?;
            let mut tx = Transaction::try_from(model)?;
            load_details(&db_tx, &mut tx).await?;
            Ok(tx)
        })
    }

    /// Lists transactions newest first, with their lines.
    ///
    /// Ordering is `(date DESC, created_at DESC, id DESC)`.
    pub async fn list_transactions(
        &self,
        user_id: &str,
        filter: &TransactionListFilter,
    ) -> ResultEngine<Vec<Transaction>> {
        with_tx!(self, |db_tx| {
            self.require_user(&db_tx, user_id).await?;
            validate_list_filter(filter)?;
            if let Some(account_id) = filter.account_id {
                self.require_account_model(&db_tx, user_id, account_id)
                    .await?;
            }

            let mut query = transactions::Entity::find()
                .filter(transactions::Column::UserId.eq(user_id.to_string()))
                .apply_tx_filters(filter)
                .order_by_desc(transactions::Column::Date)
                .order_by_desc(transactions::Column::CreatedAt)
                .order_by_desc(transactions::Column::Id);
            if let Some(limit) = filter.limit {
                query = query.limit(limit);
            }

            let mut out = query
                .all(&db_tx)
                .await?
                .into_iter()
                .map(Transaction::try_from)
                .collect::<ResultEngine<Vec<_>>>()?;

            let ids: Vec<String> = out.iter().map(|tx| tx.id.to_string()).collect();
            let mut lines_by_tx: HashMap<Uuid, Vec<Line>> = HashMap::new();
            for model in lines::Entity::find()
                .filter(lines::Column::TransactionId.is_in(ids))
                .order_by_asc(lines::Column::TransactionId)
                .all(&db_tx)
                .await?
            {
                let line = Line::try_from(model)?;
                lines_by_tx.entry(line.transaction_id).or_default().push(line);
            }
            for tx in &mut out {
                tx.lines = lines_by_tx.remove(&tx.id).unwrap_or_default();
            }

            Ok(out)
        })
    }
}

/// Fills lines, line items and attachment ids of `tx`.
pub(super) async fn load_details(
    db_tx: &DatabaseTransaction,
    tx: &mut Transaction,
) -> ResultEngine<()> {
    let tx_id = tx.id.to_string();
    tx.lines = lines::Entity::find()
        .filter(lines::Column::TransactionId.eq(tx_id.clone()))
        .all(db_tx)
        .await?
        .into_iter()
        .map(Line::try_from)
        .collect::<ResultEngine<Vec<_>>>()?;
    tx.items = line_items::Entity::find()
        .filter(line_items::Column::TransactionId.eq(tx_id.clone()))
        .all(db_tx)
        .await?
        .into_iter()
        .map(LineItem::try_from)
        .collect::<ResultEngine<Vec<_>>>()?;
    tx.attachments = attachments::Entity::find()
        .filter(attachments::Column::TransactionId.eq(tx_id))
        .order_by_asc(attachments::Column::FileId)
        .all(db_tx)
        .await?
        .into_iter()
        .map(|model| model.file_id)
        .collect();
    Ok(())
}
