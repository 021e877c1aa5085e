use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;

use sea_orm::{
    ActiveValue, DatabaseTransaction, QueryFilter, QueryOrder, Statement, TransactionTrait,
    prelude::*, sea_query::{OnConflict, Query},
};

use crate::{
    AccountKind, EngineError, LedgerCandidate, MatchCandidate, MatchType, ReconciliationSession,
    ReconciliationSummary, ResultEngine, SessionStatus, StatementRow, Transaction, auto_match,
    find_matches, lines, reconciliation_matches, reconciliation_sessions, transactions,
    util::normalize_required_name,
};

use super::{Engine, with_tx};

impl Engine {
    /// Opens a reconciliation session for an asset account and auto-matches
    /// every statement row against the account's transactions.
    pub async fn create_reconciliation_session(
        &self,
        user_id: &str,
        account_id: Uuid,
        filename: &str,
        rows: Vec<StatementRow>,
    ) -> ResultEngine<Uuid> {
        with_tx!(self, |db_tx| {
            self.require_user(&db_tx, user_id).await?;
            self.require_postable_account(
                &db_tx,
                user_id,
                account_id,
                AccountKind::Asset,
                "reconciled",
            )
            .await?;
            let filename = normalize_required_name(filename, "statement file")?;
            if rows.is_empty() {
                return Err(EngineError::InvalidInput(
                    "statement has no rows".to_string(),
                ));
            }
            for (index, row) in rows.iter().enumerate() {
                row.validate(index)?;
            }

            let session = ReconciliationSession {
                id: Uuid::new_v4(),
                user_id: user_id.to_string(),
                account_id,
                filename,
                rows,
                status: SessionStatus::InProgress,
                created_at: Utc::now(),
                completed_at: None,
                matches: Vec::new(),
            };
            reconciliation_sessions::ActiveModel::try_from(&session)?
                .insert(&db_tx)
                .await?;

            let candidates = ledger_candidates(&db_tx, user_id, account_id).await?;
            let matched = insert_auto_matches(&db_tx, &session, &candidates).await?;

            tracing::info!(
                session_id = %session.id,
                rows = session.rows.len(),
                matched,
                "reconciliation session created"
            );
            Ok(session.id)
        })
    }

    /// Recomputes every match of the session from scratch.
    ///
    /// Existing matches, manual ones included, are discarded. Returns the
    /// number of rows that found a transaction.
    pub async fn auto_match_all_transactions(
        &self,
        user_id: &str,
        session_id: Uuid,
    ) -> ResultEngine<usize> {
        with_tx!(self, |db_tx| {
            self.require_user(&db_tx, user_id).await?;
            let session = self.require_open_session(&db_tx, user_id, session_id).await?;

            reconciliation_matches::Entity::delete_many()
                .filter(reconciliation_matches::Column::SessionId.eq(session_id.to_string()))
                .exec(&db_tx)
                .await?;
            let candidates = ledger_candidates(&db_tx, user_id, session.account_id).await?;
            let matched = insert_auto_matches(&db_tx, &session, &candidates).await?;

            tracing::info!(
                session_id = %session_id,
                rows = session.rows.len(),
                matched,
                "reconciliation session re-matched"
            );
            Ok(matched)
        })
    }

    /// Pairs a statement row with a transaction chosen by the user.
    pub async fn match_transaction(
        &self,
        user_id: &str,
        session_id: Uuid,
        row_index: usize,
        transaction_id: Uuid,
    ) -> ResultEngine<()> {
        with_tx!(self, |db_tx| {
            self.require_user(&db_tx, user_id).await?;
            let session = self.require_open_session(&db_tx, user_id, session_id).await?;
            ensure_row_exists(&session, row_index)?;
            self.require_transaction_model(&db_tx, user_id, transaction_id)
                .await?;
            upsert_match(
                &db_tx,
                reconciliation_matches::ActiveModel::for_row(
                    session_id,
                    row_index,
                    Some(transaction_id),
                    MatchType::Manual,
                )?,
            )
            .await
        })
    }

    pub async fn unmatch_transaction(
        &self,
        user_id: &str,
        session_id: Uuid,
        row_index: usize,
    ) -> ResultEngine<()> {
        with_tx!(self, |db_tx| {
            self.require_user(&db_tx, user_id).await?;
            let session = self.require_open_session(&db_tx, user_id, session_id).await?;
            ensure_row_exists(&session, row_index)?;
            upsert_match(
                &db_tx,
                reconciliation_matches::ActiveModel::for_row(
                    session_id,
                    row_index,
                    None,
                    MatchType::None,
                )?,
            )
            .await
        })
    }

    /// Transactions that would match one statement row, in ledger order.
    pub async fn match_candidates(
        &self,
        user_id: &str,
        session_id: Uuid,
        row_index: usize,
    ) -> ResultEngine<Vec<MatchCandidate>> {
        with_tx!(self, |db_tx| {
            self.require_user(&db_tx, user_id).await?;
            let model = self
                .require_session_model(&db_tx, user_id, session_id)
                .await?;
            let session = ReconciliationSession::try_from(model)?;
            ensure_row_exists(&session, row_index)?;
            let candidates = ledger_candidates(&db_tx, user_id, session.account_id).await?;
            Ok(find_matches(&session.rows[row_index], &candidates))
        })
    }

    /// Marks the session completed once every row is matched.
    pub async fn complete_reconciliation_session(
        &self,
        user_id: &str,
        session_id: Uuid,
    ) -> ResultEngine<()> {
        with_tx!(self, |db_tx| {
            self.require_user(&db_tx, user_id).await?;
            let mut session = self.require_open_session(&db_tx, user_id, session_id).await?;
            session.matches = load_matches(&db_tx, session_id).await?;

            let matched = session.matches.iter().filter(|m| m.is_matched()).count();
            let unmatched = session.rows.len().saturating_sub(matched);
            if unmatched > 0 {
                return Err(EngineError::Unreconciled(unmatched));
            }

            reconciliation_sessions::ActiveModel {
                id: ActiveValue::Set(session_id.to_string()),
                status: ActiveValue::Set(SessionStatus::Completed.as_str().to_string()),
                completed_at: ActiveValue::Set(Some(Utc::now())),
                ..Default::default()
            }
            .update(&db_tx)
            .await?;

            tracing::info!(
                session_id = %session_id,
                rows = session.rows.len(),
                "reconciliation session completed"
            );
            Ok(())
        })
    }

    /// A session with its statement rows and one match entry per row.
    pub async fn reconciliation_session(
        &self,
        user_id: &str,
        session_id: Uuid,
    ) -> ResultEngine<ReconciliationSession> {
        with_tx!(self, |db_tx| {
            self.require_user(&db_tx, user_id).await?;
            let model = self
                .require_session_model(&db_tx, user_id, session_id)
                .await?;
            let mut session = ReconciliationSession::try_from(model)?;
            session.matches = load_matches(&db_tx, session_id).await?;
            Ok(session)
        })
    }

    /// Sessions of the user, newest first.
    pub async fn reconciliation_sessions(
        &self,
        user_id: &str,
    ) -> ResultEngine<Vec<ReconciliationSummary>> {
        with_tx!(self, |db_tx| {
            self.require_user(&db_tx, user_id).await?;

            let stmt = Statement::from_sql_and_values(
                db_tx.get_database_backend(),
                "SELECT m.session_id AS session_id, COUNT(*) AS matched \
                 FROM reconciliation_matches m \
                 JOIN reconciliation_sessions s ON s.id = m.session_id \
                 WHERE s.user_id = ? AND m.transaction_id IS NOT NULL \
                 GROUP BY m.session_id",
                vec![user_id.into()],
            );
            let mut matched_by_session: HashMap<String, usize> = HashMap::new();
            for row in db_tx.query_all(stmt).await? {
                let session_id: String = row.try_get("", "session_id")?;
                let matched: i64 = row.try_get("", "matched")?;
                matched_by_session.insert(session_id, usize::try_from(matched).unwrap_or(0));
            }

            let models = reconciliation_sessions::Entity::find()
                .filter(reconciliation_sessions::Column::UserId.eq(user_id.to_string()))
                .order_by_desc(reconciliation_sessions::Column::CreatedAt)
                .order_by_desc(reconciliation_sessions::Column::Id)
                .all(&db_tx)
                .await?;

            let mut out = Vec::with_capacity(models.len());
            for model in models {
                let matched_count = matched_by_session.get(&model.id).copied().unwrap_or(0);
                let session = ReconciliationSession::try_from(model)?;
                out.push(ReconciliationSummary {
                    id: session.id,
                    account_id: session.account_id,
                    filename: session.filename,
                    status: session.status,
                    created_at: session.created_at,
                    completed_at: session.completed_at,
                    row_count: session.rows.len(),
                    matched_count,
                });
            }
            Ok(out)
        })
    }

    /// Owned session that still accepts match changes.
    async fn require_open_session(
        &self,
        db_tx: &DatabaseTransaction,
        user_id: &str,
        session_id: Uuid,
    ) -> ResultEngine<ReconciliationSession> {
        let model = self
            .require_session_model(db_tx, user_id, session_id)
            .await?;
        let session = ReconciliationSession::try_from(model)?;
        if session.status == SessionStatus::Completed {
            return Err(EngineError::InvalidInput(
                "reconciliation session is already completed".to_string(),
            ));
        }
        Ok(session)
    }
}

fn ensure_row_exists(session: &ReconciliationSession, row_index: usize) -> ResultEngine<()> {
    if row_index >= session.rows.len() {
        return Err(EngineError::InvalidInput(format!(
            "row index {row_index} out of range (statement has {} rows)",
            session.rows.len()
        )));
    }
    Ok(())
}

/// The user's transactions with a line on `account_id`, oldest first.
async fn ledger_candidates(
    db_tx: &DatabaseTransaction,
    user_id: &str,
    account_id: Uuid,
) -> ResultEngine<Vec<LedgerCandidate>> {
    transactions::Entity::find()
        .filter(transactions::Column::UserId.eq(user_id.to_string()))
        .filter(
            transactions::Column::Id.in_subquery(
                Query::select()
                    .column(lines::Column::TransactionId)
                    .from(lines::Entity)
                    .and_where(lines::Column::AccountId.eq(account_id.to_string()))
                    .to_owned(),
            ),
        )
        .order_by_asc(transactions::Column::Date)
        .order_by_asc(transactions::Column::CreatedAt)
        .order_by_asc(transactions::Column::Id)
        .all(db_tx)
        .await?
        .into_iter()
        .map(|model| Transaction::try_from(model).map(|tx| LedgerCandidate::from(&tx)))
        .collect()
}

/// Inserts one match row per statement row and returns how many matched.
async fn insert_auto_matches(
    db_tx: &DatabaseTransaction,
    session: &ReconciliationSession,
    candidates: &[LedgerCandidate],
) -> ResultEngine<usize> {
    let mut matched = 0;
    for (index, row) in session.rows.iter().enumerate() {
        let active = match auto_match(row, candidates) {
            Some(found) => {
                matched += 1;
                reconciliation_matches::ActiveModel::for_row(
                    session.id,
                    index,
                    Some(found.candidate.transaction_id),
                    MatchType::Auto,
                )?
            }
            None => reconciliation_matches::ActiveModel::for_row(
                session.id,
                index,
                None,
                MatchType::None,
            )?,
        };
        reconciliation_matches::Entity::insert(active)
            .exec_without_returning(db_tx)
            .await?;
    }
    Ok(matched)
}

async fn upsert_match(
    db_tx: &DatabaseTransaction,
    active: reconciliation_matches::ActiveModel,
) -> ResultEngine<()> {
    reconciliation_matches::Entity::insert(active)
        .on_conflict(
            OnConflict::columns([
                reconciliation_matches::Column::SessionId,
                reconciliation_matches::Column::CsvRowIndex,
            ])
            .update_columns([
                reconciliation_matches::Column::TransactionId,
                reconciliation_matches::Column::MatchType,
            ])
            .to_owned(),
        )
        .exec_without_returning(db_tx)
        .await?;
    Ok(())
}

async fn load_matches(
    db_tx: &DatabaseTransaction,
    session_id: Uuid,
) -> ResultEngine<Vec<crate::ReconciliationMatch>> {
    reconciliation_matches::Entity::find()
        .filter(reconciliation_matches::Column::SessionId.eq(session_id.to_string()))
        .order_by_asc(reconciliation_matches::Column::CsvRowIndex)
        .all(db_tx)
        .await?
        .into_iter()
        .map(crate::ReconciliationMatch::try_from)
        .collect()
}
