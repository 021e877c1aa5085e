use sea_orm::{DatabaseTransaction, QueryFilter, prelude::*};
use uuid::Uuid;

use crate::{
    Account, AccountKind, Currency, EngineError, ResultEngine, accounts, reconciliation_sessions,
    transactions, users, util::model_currency,
};

use super::Engine;

/// Generates a `require_*` lookup that hides rows owned by other users behind
/// a `KeyNotFound`.
macro_rules! impl_require_owned {
    ($fn_name:ident, $entity:path, $user_col:expr, $err_msg:literal) => {
        pub(super) async fn $fn_name(
            &self,
            db: &DatabaseTransaction,
            user_id: &str,
            id: Uuid,
        ) -> ResultEngine<<$entity as EntityTrait>::Model> {
            <$entity>::find_by_id(id.to_string())
                .filter($user_col.eq(user_id.to_string()))
                .one(db)
                .await?
                .ok_or_else(|| EngineError::KeyNotFound($err_msg.to_string()))
        }
    };
}

impl Engine {
    /// Fails with `Unauthorized` unless `user_id` names a known user.
    pub(super) async fn require_user(
        &self,
        db: &DatabaseTransaction,
        user_id: &str,
    ) -> ResultEngine<users::Model> {
        if user_id.trim().is_empty() {
            return Err(EngineError::Unauthorized);
        }
        users::Entity::find_by_id(user_id.to_string())
            .one(db)
            .await?
            .ok_or(EngineError::Unauthorized)
    }

    pub(super) async fn require_base_currency(
        &self,
        db: &DatabaseTransaction,
        user_id: &str,
    ) -> ResultEngine<Currency> {
        let user = self.require_user(db, user_id).await?;
        model_currency(&user.base_currency)
    }

    impl_require_owned!(
        require_account_model,
        accounts::Entity,
        accounts::Column::UserId,
        "account not exists"
    );

    impl_require_owned!(
        require_transaction_model,
        transactions::Entity,
        transactions::Column::UserId,
        "transaction not exists"
    );

    impl_require_owned!(
        require_session_model,
        reconciliation_sessions::Entity,
        reconciliation_sessions::Column::UserId,
        "reconciliation session not exists"
    );

    pub(super) async fn require_account(
        &self,
        db: &DatabaseTransaction,
        user_id: &str,
        account_id: Uuid,
    ) -> ResultEngine<Account> {
        Account::try_from(self.require_account_model(db, user_id, account_id).await?)
    }

    /// Account usable in a new posting: owned, active and of `kind`.
    pub(super) async fn require_postable_account(
        &self,
        db: &DatabaseTransaction,
        user_id: &str,
        account_id: Uuid,
        kind: AccountKind,
        role: &str,
    ) -> ResultEngine<Account> {
        let account = self.require_account(db, user_id, account_id).await?;
        if account.kind != kind {
            return Err(EngineError::InvalidInput(format!(
                "{role} account must be of kind {}, got {}",
                kind.as_str(),
                account.kind.as_str()
            )));
        }
        if !account.is_active {
            return Err(EngineError::InvalidInput(format!(
                "{role} account '{}' is not active",
                account.name
            )));
        }
        Ok(account)
    }
}
