//! Transaction headers.
//!
//! A `Transaction` is an atomic ledger event. The header carries what a user
//! sees (date, description, displayed amount); balances only ever change via
//! its [`Line`]s, which always sum to zero.

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    Currency, EngineError, Line, LineItem, ResultEngine,
    util::{model_currency, parse_uuid},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Income,
    Expense,
    Transfer,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
            Self::Transfer => "transfer",
        }
    }
}

impl TryFrom<&str> for TransactionKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            "transfer" => Ok(Self::Transfer),
            other => Err(EngineError::InvalidInput(format!(
                "invalid transaction kind: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: String,
    pub date: NaiveDate,
    pub kind: TransactionKind,
    pub description: String,
    /// Displayed total, in `currency` minor units.
    pub amount_minor: i64,
    pub currency: Currency,
    /// Informational only; lines are never converted with it.
    pub exchange_rate: f64,
    pub payee: Option<String>,
    pub payer: Option<String>,
    pub external_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub lines: Vec<Line>,
    pub items: Vec<LineItem>,
    /// Ids of externally stored files.
    pub attachments: Vec<String>,
}

impl Transaction {
    pub fn new(
        user_id: impl Into<String>,
        kind: TransactionKind,
        date: NaiveDate,
        amount_minor: i64,
        currency: Currency,
    ) -> ResultEngine<Self> {
        if amount_minor <= 0 {
            return Err(EngineError::InvalidInput(
                "amount_minor must be > 0".to_string(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            date,
            kind,
            description: String::new(),
            amount_minor,
            currency,
            exchange_rate: 1.0,
            payee: None,
            payer: None,
            external_ref: None,
            created_at: Utc::now(),
            lines: Vec::new(),
            items: Vec::new(),
            attachments: Vec::new(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_id: String,
    pub date: Date,
    pub kind: String,
    pub description: String,
    pub amount_minor: i64,
    pub currency: String,
    pub exchange_rate: f64,
    pub payee: Option<String>,
    pub payer: Option<String>,
    pub external_ref: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::lines::Entity")]
    Lines,
    #[sea_orm(has_many = "super::line_items::Entity")]
    LineItems,
    #[sea_orm(has_many = "super::attachments::Entity")]
    Attachments,
}

impl Related<super::lines::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lines.def()
    }
}

impl Related<super::line_items::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LineItems.def()
    }
}

impl Related<super::attachments::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Attachments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Transaction> for ActiveModel {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: ActiveValue::Set(tx.id.to_string()),
            user_id: ActiveValue::Set(tx.user_id.clone()),
            date: ActiveValue::Set(tx.date),
            kind: ActiveValue::Set(tx.kind.as_str().to_string()),
            description: ActiveValue::Set(tx.description.clone()),
            amount_minor: ActiveValue::Set(tx.amount_minor),
            currency: ActiveValue::Set(tx.currency.code().to_string()),
            exchange_rate: ActiveValue::Set(tx.exchange_rate),
            payee: ActiveValue::Set(tx.payee.clone()),
            payer: ActiveValue::Set(tx.payer.clone()),
            external_ref: ActiveValue::Set(tx.external_ref.clone()),
            created_at: ActiveValue::Set(tx.created_at),
        }
    }
}

impl TryFrom<Model> for Transaction {
    type Error = EngineError;

    fn try_from(model: Model) -> ResultEngine<Self> {
        Ok(Self {
            id: parse_uuid(&model.id, "transaction")?,
            user_id: model.user_id,
            date: model.date,
            kind: TransactionKind::try_from(model.kind.as_str())?,
            description: model.description,
            amount_minor: model.amount_minor,
            currency: model_currency(&model.currency)?,
            exchange_rate: model.exchange_rate,
            payee: model.payee,
            payer: model.payer,
            external_ref: model.external_ref,
            created_at: model.created_at,
            lines: Vec::new(),
            items: Vec::new(),
            attachments: Vec::new(),
        })
    }
}
