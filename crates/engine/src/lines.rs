//! Transaction lines.
//!
//! A [`Line`] posts one amount to one account, either as a debit or as a
//! credit, as part of a [`Transaction`](crate::Transaction). Storage keeps two
//! nullable columns and exactly one of them is set.

use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, LineDraft, LineSide, ResultEngine, util::parse_uuid};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub account_id: Uuid,
    pub side: LineSide,
}

impl Line {
    pub fn from_draft(transaction_id: Uuid, draft: &LineDraft) -> Self {
        Self {
            id: Uuid::new_v4(),
            transaction_id,
            account_id: draft.account_id,
            side: draft.side,
        }
    }

    #[must_use]
    pub fn draft(&self) -> LineDraft {
        LineDraft {
            account_id: self.account_id,
            side: self.side,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transaction_lines")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub transaction_id: String,
    pub account_id: String,
    pub debit_minor: Option<i64>,
    pub credit_minor: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::transactions::Entity",
        from = "Column::TransactionId",
        to = "super::transactions::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Transactions,
    #[sea_orm(
        belongs_to = "super::accounts::Entity",
        from = "Column::AccountId",
        to = "super::accounts::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Accounts,
}

impl Related<super::transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl Related<super::accounts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Accounts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Line> for ActiveModel {
    fn from(line: &Line) -> Self {
        let (debit_minor, credit_minor) = match line.side {
            LineSide::Debit(amount) => (Some(amount), None),
            LineSide::Credit(amount) => (None, Some(amount)),
        };
        Self {
            id: ActiveValue::Set(line.id.to_string()),
            transaction_id: ActiveValue::Set(line.transaction_id.to_string()),
            account_id: ActiveValue::Set(line.account_id.to_string()),
            debit_minor: ActiveValue::Set(debit_minor),
            credit_minor: ActiveValue::Set(credit_minor),
        }
    }
}

impl TryFrom<Model> for Line {
    type Error = EngineError;

    fn try_from(model: Model) -> ResultEngine<Self> {
        let side = match (model.debit_minor, model.credit_minor) {
            (Some(amount), None) => LineSide::Debit(amount),
            (None, Some(amount)) => LineSide::Credit(amount),
            _ => {
                return Err(EngineError::InvalidInput(format!(
                    "line {} must carry exactly one of debit/credit",
                    model.id
                )));
            }
        };
        Ok(Self {
            id: parse_uuid(&model.id, "line")?,
            transaction_id: parse_uuid(&model.transaction_id, "transaction")?,
            account_id: parse_uuid(&model.account_id, "account")?,
            side,
        })
    }
}
