use sea_orm::{ActiveValue, TransactionTrait, prelude::*};

use crate::{Currency, ResultEngine, users};

use super::{Engine, with_tx};

impl Engine {
    /// Currency wallets are valued in.
    pub async fn base_currency(&self, user_id: &str) -> ResultEngine<Currency> {
        with_tx!(self, |db_tx| {
            self.require_base_currency(&db_tx, user_id).await
        })
    }

    /// Changes the valuation currency. Stored amounts are untouched.
    pub async fn set_base_currency(&self, user_id: &str, currency: Currency) -> ResultEngine<()> {
        with_tx!(self, |db_tx| {
            self.require_user(&db_tx, user_id).await?;
            users::ActiveModel {
                username: ActiveValue::Set(user_id.to_string()),
                base_currency: ActiveValue::Set(currency.code().to_string()),
            }
            .update(&db_tx)
            .await?;
            Ok(())
        })
    }
}
