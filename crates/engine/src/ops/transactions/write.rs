use uuid::Uuid;

use sea_orm::{ActiveValue, DatabaseTransaction, QueryFilter, TransactionTrait, prelude::*};

use crate::{
    EngineError, ExpenseCmd, IncomeCmd, ItemizedCmd, Line, LineItem, MatchType, Posting,
    ResultEngine, Transaction, TransferCmd, TxMeta, UpdateTransactionCmd, attachments,
    line_items, lines, reconciliation_matches, transactions,
};

use super::super::{Engine, with_tx};
use super::{ResolvedPosting, build_transaction};

impl Engine {
    /// Records income: asset debited, income credited.
    pub async fn record_income(&self, cmd: IncomeCmd) -> ResultEngine<Uuid> {
        let (user_id, posting, meta) = cmd.into_parts();
        self.record_posting(&user_id, posting, meta).await
    }

    /// Records an expense: expense debited, asset credited.
    pub async fn record_expense(&self, cmd: ExpenseCmd) -> ResultEngine<Uuid> {
        let (user_id, posting, meta) = cmd.into_parts();
        self.record_posting(&user_id, posting, meta).await
    }

    /// Records a transaction split across category accounts.
    pub async fn record_itemized(&self, cmd: ItemizedCmd) -> ResultEngine<Uuid> {
        let (user_id, posting, meta) = cmd.into_parts();
        self.record_posting(&user_id, posting, meta).await
    }

    /// Moves money between two asset accounts, with an optional fee.
    pub async fn record_transfer(&self, cmd: TransferCmd) -> ResultEngine<Uuid> {
        let (user_id, posting, meta) = cmd.into_parts();
        self.record_posting(&user_id, posting, meta).await
    }

    async fn record_posting(
        &self,
        user_id: &str,
        posting: Posting,
        meta: TxMeta,
    ) -> ResultEngine<Uuid> {
        with_tx!(self, |db_tx| {
            let base = self.require_base_currency(&db_tx, user_id).await?;
            let resolved = self
                .resolve_posting(&db_tx, user_id, &posting, base)
                .await?;
            let tx = build_transaction(user_id, &resolved, &meta)?;
            let (lines, items) = materialize(tx.id, &resolved);

            insert_transaction_with_lines(&db_tx, &tx, &lines).await?;
            insert_items(&db_tx, &items).await?;

            tracing::debug!(
                transaction_id = %tx.id,
                kind = tx.kind.as_str(),
                lines = lines.len(),
                "transaction recorded"
            );
            Ok(tx.id)
        })
    }

    /// Rewrites a transaction: header fields are replaced and every line and
    /// line item is swapped for the new posting.
    pub async fn update_transaction(&self, cmd: UpdateTransactionCmd) -> ResultEngine<()> {
        let UpdateTransactionCmd {
            user_id,
            transaction_id,
            posting,
            meta,
        } = cmd;
        with_tx!(self, |db_tx| {
            let base = self.require_base_currency(&db_tx, &user_id).await?;
            let existing = self
                .require_transaction_model(&db_tx, &user_id, transaction_id)
                .await?;
            let resolved = self
                .resolve_posting(&db_tx, &user_id, &posting, base)
                .await?;

            let mut tx = build_transaction(&user_id, &resolved, &meta)?;
            tx.id = transaction_id;
            tx.created_at = existing.created_at;
            transactions::ActiveModel::from(&tx).update(&db_tx).await?;

            let tx_id = transaction_id.to_string();
            lines::Entity::delete_many()
                .filter(lines::Column::TransactionId.eq(tx_id.clone()))
                .exec(&db_tx)
                .await?;
            line_items::Entity::delete_many()
                .filter(line_items::Column::TransactionId.eq(tx_id))
                .exec(&db_tx)
                .await?;

            let (lines, items) = materialize(tx.id, &resolved);
            for line in &lines {
                lines::ActiveModel::from(line).insert(&db_tx).await?;
            }
            insert_items(&db_tx, &items).await?;

            tracing::debug!(transaction_id = %tx.id, "transaction updated");
            Ok(())
        })
    }

    /// Deletes a transaction with its lines, items and attachments.
    ///
    /// Reconciliation rows matched to it fall back to unmatched. Attached
    /// files are released after the commit.
    pub async fn delete_transaction(
        &self,
        user_id: &str,
        transaction_id: Uuid,
    ) -> ResultEngine<()> {
        let file_ids: ResultEngine<Vec<String>> = with_tx!(self, |db_tx| {
            self.require_user(&db_tx, user_id).await?;
            self.require_transaction_model(&db_tx, user_id, transaction_id)
                .await?;
            let tx_id = transaction_id.to_string();

            let file_ids: Vec<String> = attachments::Entity::find()
                .filter(attachments::Column::TransactionId.eq(tx_id.clone()))
                .all(&db_tx)
                .await?
                .into_iter()
                .map(|model| model.file_id)
                .collect();

            reconciliation_matches::Entity::update_many()
                .col_expr(
                    reconciliation_matches::Column::TransactionId,
                    Expr::value(Option::<String>::None),
                )
                .col_expr(
                    reconciliation_matches::Column::MatchType,
                    Expr::value(MatchType::None.as_str()),
                )
                .filter(reconciliation_matches::Column::TransactionId.eq(tx_id.clone()))
                .exec(&db_tx)
                .await?;

            lines::Entity::delete_many()
                .filter(lines::Column::TransactionId.eq(tx_id.clone()))
                .exec(&db_tx)
                .await?;
            line_items::Entity::delete_many()
                .filter(line_items::Column::TransactionId.eq(tx_id.clone()))
                .exec(&db_tx)
                .await?;
            attachments::Entity::delete_many()
                .filter(attachments::Column::TransactionId.eq(tx_id.clone()))
                .exec(&db_tx)
                .await?;
            transactions::Entity::delete_by_id(tx_id).exec(&db_tx).await?;

            Ok(file_ids)
        });

        for file_id in file_ids? {
            if let Err(err) = self.attachments.release(&file_id).await {
                tracing::warn!(
                    transaction_id = %transaction_id,
                    file_id = %file_id,
                    error = %err,
                    "failed to release attachment"
                );
            }
        }
        tracing::debug!(transaction_id = %transaction_id, "transaction deleted");
        Ok(())
    }

    /// Links an externally stored file to a transaction.
    pub async fn attach_file(
        &self,
        user_id: &str,
        transaction_id: Uuid,
        file_id: &str,
    ) -> ResultEngine<Uuid> {
        let file_id = file_id.trim();
        with_tx!(self, |db_tx| {
            self.require_user(&db_tx, user_id).await?;
            if file_id.is_empty() {
                return Err(EngineError::InvalidInput(
                    "file_id must not be empty".to_string(),
                ));
            }
            self.require_transaction_model(&db_tx, user_id, transaction_id)
                .await?;
            let id = Uuid::new_v4();
            attachments::ActiveModel {
                id: ActiveValue::Set(id.to_string()),
                transaction_id: ActiveValue::Set(transaction_id.to_string()),
                file_id: ActiveValue::Set(file_id.to_string()),
            }
            .insert(&db_tx)
            .await?;
            Ok(id)
        })
    }
}

/// Lines and line items of a resolved posting, bound to `transaction_id`.
fn materialize(transaction_id: Uuid, resolved: &ResolvedPosting) -> (Vec<Line>, Vec<LineItem>) {
    let lines = resolved
        .lines
        .iter()
        .map(|draft| Line::from_draft(transaction_id, draft))
        .collect();
    let items = match resolved.direction {
        Some(direction) => resolved
            .items
            .iter()
            .map(|item| LineItem {
                id: Uuid::new_v4(),
                transaction_id,
                description: item.description.clone(),
                amount_minor: item.amount_minor,
                account_id: item.account_id,
                direction,
            })
            .collect(),
        None => Vec::new(),
    };
    (lines, items)
}

async fn insert_items(db_tx: &DatabaseTransaction, items: &[LineItem]) -> ResultEngine<()> {
    for item in items {
        line_items::ActiveModel::from(item).insert(db_tx).await?;
    }
    Ok(())
}

/// Inserts the transaction row, then its lines.
///
/// When a line fails, the transaction row is deleted again before
/// returning `PartialWrite` with the original cause.
pub(super) async fn insert_transaction_with_lines(
    db_tx: &DatabaseTransaction,
    tx: &Transaction,
    lines: &[Line],
) -> ResultEngine<()> {
    transactions::ActiveModel::from(tx).insert(db_tx).await?;
    for line in lines {
        if let Err(err) = lines::ActiveModel::from(line).insert(db_tx).await {
            if let Err(cleanup_err) = transactions::Entity::delete_by_id(tx.id.to_string())
                .exec(db_tx)
                .await
            {
                tracing::error!(
                    transaction_id = %tx.id,
                    error = %cleanup_err,
                    cause = %err,
                    "transaction row left without lines, manual cleanup required"
                );
            }
            return Err(EngineError::PartialWrite(err.to_string()));
        }
    }
    Ok(())
}
