//! Chart of accounts.
//!
//! Accounts form a forest per user: every account has a [`AccountKind`], an
//! optional parent of the same kind and a `level` (roots are level 1, a child
//! is `parent.level + 1`, never deeper than [`MAX_ACCOUNT_LEVEL`]).
//!
//! Asset accounts flagged as wallets carry an opening balance that counts as
//! a debit when balances are aggregated.

use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    Currency, EngineError, ResultEngine,
    util::{model_currency, parse_uuid},
};

/// Deepest level an account may live at.
pub const MAX_ACCOUNT_LEVEL: u8 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    Asset,
    Liability,
    Income,
    Expense,
    Equity,
}

impl AccountKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asset => "asset",
            Self::Liability => "liability",
            Self::Income => "income",
            Self::Expense => "expense",
            Self::Equity => "equity",
        }
    }

    /// `true` for kinds whose balance grows with debits.
    #[must_use]
    pub fn is_debit_normal(self) -> bool {
        matches!(self, Self::Asset | Self::Expense)
    }
}

impl TryFrom<&str> for AccountKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "asset" => Ok(Self::Asset),
            "liability" => Ok(Self::Liability),
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            "equity" => Ok(Self::Equity),
            other => Err(EngineError::InvalidInput(format!(
                "invalid account kind: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub kind: AccountKind,
    pub parent_id: Option<Uuid>,
    pub level: u8,
    /// `None` means the owner's base currency.
    pub currency: Option<Currency>,
    pub is_wallet: bool,
    pub opening_balance_minor: i64,
    pub is_active: bool,
}

impl Account {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>, kind: AccountKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            name: name.into(),
            kind,
            parent_id: None,
            level: 1,
            currency: None,
            is_wallet: false,
            opening_balance_minor: 0,
            is_active: true,
        }
    }

    /// Currency the account is denominated in.
    #[must_use]
    pub fn effective_currency(&self, base: Currency) -> Currency {
        self.currency.unwrap_or(base)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub kind: String,
    pub parent_id: Option<String>,
    pub level: i32,
    pub currency: Option<String>,
    pub is_wallet: bool,
    pub opening_balance_minor: i64,
    pub is_active: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::lines::Entity")]
    Lines,
}

impl Related<super::lines::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Account> for ActiveModel {
    fn from(account: &Account) -> Self {
        Self {
            id: ActiveValue::Set(account.id.to_string()),
            user_id: ActiveValue::Set(account.user_id.clone()),
            name: ActiveValue::Set(account.name.clone()),
            kind: ActiveValue::Set(account.kind.as_str().to_string()),
            parent_id: ActiveValue::Set(account.parent_id.map(|id| id.to_string())),
            level: ActiveValue::Set(i32::from(account.level)),
            currency: ActiveValue::Set(account.currency.map(|c| c.code().to_string())),
            is_wallet: ActiveValue::Set(account.is_wallet),
            opening_balance_minor: ActiveValue::Set(account.opening_balance_minor),
            is_active: ActiveValue::Set(account.is_active),
        }
    }
}

impl TryFrom<Model> for Account {
    type Error = EngineError;

    fn try_from(model: Model) -> ResultEngine<Self> {
        let level = u8::try_from(model.level)
            .ok()
            .filter(|level| (1..=MAX_ACCOUNT_LEVEL).contains(level))
            .ok_or_else(|| {
                EngineError::InvalidHierarchy(format!("invalid account level: {}", model.level))
            })?;
        Ok(Self {
            id: parse_uuid(&model.id, "account")?,
            user_id: model.user_id,
            name: model.name,
            kind: AccountKind::try_from(model.kind.as_str())?,
            parent_id: model
                .parent_id
                .as_deref()
                .map(|id| parse_uuid(id, "parent account"))
                .transpose()?,
            level,
            currency: model.currency.as_deref().map(model_currency).transpose()?,
            is_wallet: model.is_wallet,
            opening_balance_minor: model.opening_balance_minor,
            is_active: model.is_active,
        })
    }
}

/// Balance of a wallet in its own currency and in the owner's base currency.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WalletBalance {
    pub account_id: Uuid,
    pub name: String,
    pub currency: Currency,
    pub balance_minor: i64,
    pub base_currency: Currency,
    /// `None` when no exchange rate could be obtained.
    pub converted_minor: Option<i64>,
    pub rate: Option<f64>,
}
