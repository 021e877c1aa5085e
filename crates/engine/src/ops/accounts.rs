use std::collections::HashMap;

use uuid::Uuid;

use sea_orm::{
    ActiveValue, DatabaseTransaction, QueryFilter, QueryOrder, Statement, TransactionTrait,
    prelude::*,
};

use crate::{
    Account, AccountKind, AccountNode, AccountTotals, ConversionRequest, Currency, EngineError,
    MAX_ACCOUNT_LEVEL, NewAccountCmd, ResultEngine, WalletBalance, accounts, build_account_tree,
    checked_account_balance, descendant_ids,
    util::{normalize_required_name, parse_uuid},
};

use super::{Engine, with_tx};

impl Engine {
    /// Creates an account, optionally below a parent of the same kind.
    pub async fn new_account(&self, cmd: NewAccountCmd) -> ResultEngine<Uuid> {
        with_tx!(self, |db_tx| {
            self.require_user(&db_tx, &cmd.user_id).await?;
            let name = normalize_required_name(&cmd.name, "account")?;
            if cmd.is_wallet && cmd.kind != AccountKind::Asset {
                return Err(EngineError::InvalidInput(
                    "only asset accounts can be wallets".to_string(),
                ));
            }
            if !cmd.is_wallet && cmd.opening_balance_minor != 0 {
                return Err(EngineError::InvalidInput(
                    "opening balance requires a wallet account".to_string(),
                ));
            }

            let level = match cmd.parent_id {
                Some(parent_id) => {
                    let parent = self
                        .require_account(&db_tx, &cmd.user_id, parent_id)
                        .await?;
                    ensure_same_kind(&parent, cmd.kind)?;
                    if parent.level >= MAX_ACCOUNT_LEVEL {
                        return Err(EngineError::InvalidHierarchy(format!(
                            "accounts cannot be nested deeper than {MAX_ACCOUNT_LEVEL} levels"
                        )));
                    }
                    parent.level + 1
                }
                None => 1,
            };
            ensure_unique_sibling_name(&db_tx, &cmd.user_id, cmd.parent_id, &name, None).await?;

            let mut account = Account::new(cmd.user_id.as_str(), name, cmd.kind);
            account.parent_id = cmd.parent_id;
            account.level = level;
            account.currency = cmd.currency;
            account.is_wallet = cmd.is_wallet;
            account.opening_balance_minor = cmd.opening_balance_minor;
            accounts::ActiveModel::from(&account).insert(&db_tx).await?;

            tracing::debug!(account_id = %account.id, level, "account created");
            Ok(account.id)
        })
    }

    pub async fn rename_account(
        &self,
        user_id: &str,
        account_id: Uuid,
        name: &str,
    ) -> ResultEngine<()> {
        with_tx!(self, |db_tx| {
            self.require_user(&db_tx, user_id).await?;
            let name = normalize_required_name(name, "account")?;
            let model = self
                .require_account_model(&db_tx, user_id, account_id)
                .await?;
            let parent_id = model
                .parent_id
                .as_deref()
                .map(|id| parse_uuid(id, "parent account"))
                .transpose()?;
            ensure_unique_sibling_name(&db_tx, user_id, parent_id, &name, Some(account_id))
                .await?;

            let mut active: accounts::ActiveModel = model.into();
            active.name = ActiveValue::Set(name);
            active.update(&db_tx).await?;
            Ok(())
        })
    }

    /// Inactive accounts keep their history but accept no new postings.
    pub async fn set_account_active(
        &self,
        user_id: &str,
        account_id: Uuid,
        is_active: bool,
    ) -> ResultEngine<()> {
        with_tx!(self, |db_tx| {
            self.require_user(&db_tx, user_id).await?;
            let model = self
                .require_account_model(&db_tx, user_id, account_id)
                .await?;
            let mut active: accounts::ActiveModel = model.into();
            active.is_active = ActiveValue::Set(is_active);
            active.update(&db_tx).await?;
            Ok(())
        })
    }

    /// Re-parents an account together with its subtree.
    ///
    /// `None` makes it a root. The new parent must share the account kind and
    /// must not sit inside the moved subtree; the subtree must still fit in
    /// [`MAX_ACCOUNT_LEVEL`] levels once moved.
    pub async fn move_account(
        &self,
        user_id: &str,
        account_id: Uuid,
        new_parent_id: Option<Uuid>,
    ) -> ResultEngine<()> {
        with_tx!(self, |db_tx| {
            self.require_user(&db_tx, user_id).await?;
            let by_id: HashMap<Uuid, Account> = load_accounts(&db_tx, user_id)
                .await?
                .into_iter()
                .map(|account| (account.id, account))
                .collect();
            let account = by_id
                .get(&account_id)
                .ok_or_else(|| EngineError::KeyNotFound("account not exists".to_string()))?;
            let descendants = descendant_ids(&by_id, account_id);

            let new_level = match new_parent_id {
                Some(parent_id) => {
                    if parent_id == account_id {
                        return Err(EngineError::InvalidHierarchy(
                            "account cannot be its own parent".to_string(),
                        ));
                    }
                    let parent = by_id.get(&parent_id).ok_or_else(|| {
                        EngineError::KeyNotFound("account not exists".to_string())
                    })?;
                    ensure_same_kind(parent, account.kind)?;
                    if descendants.contains(&parent_id) {
                        return Err(EngineError::InvalidHierarchy(
                            "account cannot be moved below its own descendant".to_string(),
                        ));
                    }
                    parent.level + 1
                }
                None => 1,
            };

            let subtree_depth = descendants
                .iter()
                .filter_map(|id| by_id.get(id))
                .map(|d| d.level.saturating_sub(account.level))
                .max()
                .unwrap_or(0);
            if new_level + subtree_depth > MAX_ACCOUNT_LEVEL {
                return Err(EngineError::InvalidHierarchy(format!(
                    "moved subtree would exceed {MAX_ACCOUNT_LEVEL} levels"
                )));
            }
            ensure_unique_sibling_name(
                &db_tx,
                user_id,
                new_parent_id,
                &account.name,
                Some(account_id),
            )
            .await?;

            let shift = i32::from(new_level) - i32::from(account.level);
            accounts::ActiveModel {
                id: ActiveValue::Set(account_id.to_string()),
                parent_id: ActiveValue::Set(new_parent_id.map(|id| id.to_string())),
                level: ActiveValue::Set(i32::from(new_level)),
                ..Default::default()
            }
            .update(&db_tx)
            .await?;
            if shift != 0 {
                for id in &descendants {
                    let Some(descendant) = by_id.get(id) else {
                        continue;
                    };
                    accounts::ActiveModel {
                        id: ActiveValue::Set(id.to_string()),
                        level: ActiveValue::Set(i32::from(descendant.level) + shift),
                        ..Default::default()
                    }
                    .update(&db_tx)
                    .await?;
                }
            }

            tracing::debug!(
                account_id = %account_id,
                moved = descendants.len() + 1,
                "account moved"
            );
            Ok(())
        })
    }

    /// All accounts of the user, ordered by level then name.
    pub async fn accounts(&self, user_id: &str) -> ResultEngine<Vec<Account>> {
        with_tx!(self, |db_tx| {
            self.require_user(&db_tx, user_id).await?;
            load_accounts(&db_tx, user_id).await
        })
    }

    pub async fn account(&self, user_id: &str, account_id: Uuid) -> ResultEngine<Account> {
        with_tx!(self, |db_tx| {
            self.require_user(&db_tx, user_id).await?;
            self.require_account(&db_tx, user_id, account_id).await
        })
    }

    /// Chart of accounts with own and subtree totals on every node.
    ///
    /// Amounts are summed as posted, without currency conversion.
    pub async fn account_tree(&self, user_id: &str) -> ResultEngine<Vec<AccountNode>> {
        with_tx!(self, |db_tx| {
            self.require_user(&db_tx, user_id).await?;
            let accounts = load_accounts(&db_tx, user_id).await?;
            let mut totals = posted_totals(&db_tx, user_id).await?;
            for account in accounts.iter().filter(|a| a.is_wallet) {
                let own = totals.entry(account.id).or_default();
                own.debits_minor = with_opening_balance(account, own.debits_minor)?;
            }
            build_account_tree(&accounts, &totals)
        })
    }

    /// Balance of every active wallet, natively and in the base currency.
    ///
    /// A wallet whose rate cannot be obtained is returned with
    /// `converted_minor: None` instead of failing the whole call.
    pub async fn wallet_balances(&self, user_id: &str) -> ResultEngine<Vec<WalletBalance>> {
        let loaded: ResultEngine<(Currency, Vec<(Account, i64)>)> = with_tx!(self, |db_tx| {
            let base = self.require_base_currency(&db_tx, user_id).await?;
            let totals = posted_totals(&db_tx, user_id).await?;
            let wallets: Vec<(Account, i64)> = load_accounts(&db_tx, user_id)
                .await?
                .into_iter()
                .filter(|a| a.is_wallet && a.is_active)
                .map(|account| -> ResultEngine<(Account, i64)> {
                    let posted = totals.get(&account.id).copied().unwrap_or_default();
                    let debits = with_opening_balance(&account, posted.debits_minor)?;
                    let balance =
                        checked_account_balance(account.kind, debits, posted.credits_minor)
                            .ok_or_else(|| balance_overflow(&account))?;
                    Ok((account, balance))
                })
                .collect::<ResultEngine<_>>()?;
            Ok((base, wallets))
        });
        let (base, mut wallets) = loaded?;
        wallets.sort_by(|(a, _), (b, _)| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

        let requests: Vec<ConversionRequest> = wallets
            .iter()
            .map(|(account, balance)| {
                ConversionRequest::new(*balance, account.effective_currency(base), base)
            })
            .collect();
        let converted = self.converter.convert_batch(&requests).await;

        Ok(wallets
            .into_iter()
            .zip(converted)
            .map(|((account, balance), result)| {
                let currency = account.effective_currency(base);
                let (converted_minor, rate) = match result {
                    Ok(c) => (Some(c.converted_minor), Some(c.rate)),
                    Err(err) => {
                        tracing::warn!(
                            account_id = %account.id,
                            error = %err,
                            "wallet left unconverted"
                        );
                        (None, None)
                    }
                };
                WalletBalance {
                    account_id: account.id,
                    name: account.name,
                    currency,
                    balance_minor: balance,
                    base_currency: base,
                    converted_minor,
                    rate,
                }
            })
            .collect())
    }
}

fn ensure_same_kind(parent: &Account, kind: AccountKind) -> ResultEngine<()> {
    if parent.kind != kind {
        return Err(EngineError::InvalidHierarchy(format!(
            "parent account is {}, child would be {}",
            parent.kind.as_str(),
            kind.as_str()
        )));
    }
    Ok(())
}

fn balance_overflow(account: &Account) -> EngineError {
    EngineError::InvalidInput(format!("balance of account {} overflows", account.name))
}

/// Posted debits plus the wallet's opening balance.
fn with_opening_balance(account: &Account, debits_minor: i64) -> ResultEngine<i64> {
    debits_minor
        .checked_add(account.opening_balance_minor)
        .ok_or_else(|| balance_overflow(account))
}

/// Sibling names are unique per parent, ignoring case.
async fn ensure_unique_sibling_name(
    db_tx: &DatabaseTransaction,
    user_id: &str,
    parent_id: Option<Uuid>,
    name: &str,
    exclude: Option<Uuid>,
) -> ResultEngine<()> {
    let mut query = accounts::Entity::find()
        .filter(accounts::Column::UserId.eq(user_id.to_string()))
        .filter(Expr::cust("LOWER(name)").eq(name.to_lowercase()));
    query = match parent_id {
        Some(parent_id) => query.filter(accounts::Column::ParentId.eq(parent_id.to_string())),
        None => query.filter(accounts::Column::ParentId.is_null()),
    };
    if let Some(id) = exclude {
        query = query.filter(accounts::Column::Id.ne(id.to_string()));
    }
    if query.one(db_tx).await?.is_some() {
        return Err(EngineError::ExistingKey(name.to_string()));
    }
    Ok(())
}

async fn load_accounts(db_tx: &DatabaseTransaction, user_id: &str) -> ResultEngine<Vec<Account>> {
    accounts::Entity::find()
        .filter(accounts::Column::UserId.eq(user_id.to_string()))
        .order_by_asc(accounts::Column::Level)
        .order_by_asc(accounts::Column::Name)
        .all(db_tx)
        .await?
        .into_iter()
        .map(Account::try_from)
        .collect()
}

/// Debit and credit sums of every account the user has posted to.
async fn posted_totals(
    db_tx: &DatabaseTransaction,
    user_id: &str,
) -> ResultEngine<HashMap<Uuid, AccountTotals>> {
    let stmt = Statement::from_sql_and_values(
        db_tx.get_database_backend(),
        "SELECT l.account_id AS account_id, \
                COALESCE(SUM(l.debit_minor), 0) AS debits, \
                COALESCE(SUM(l.credit_minor), 0) AS credits \
         FROM transaction_lines l \
         JOIN transactions t ON t.id = l.transaction_id \
         WHERE t.user_id = ? \
         GROUP BY l.account_id",
        vec![user_id.into()],
    );
    let mut totals = HashMap::new();
    for row in db_tx.query_all(stmt).await? {
        let account_id: String = row.try_get("", "account_id")?;
        let debits: i64 = row.try_get("", "debits")?;
        let credits: i64 = row.try_get("", "credits")?;
        totals.insert(
            parse_uuid(&account_id, "account")?,
            AccountTotals::new(debits, credits),
        );
    }
    Ok(totals)
}
