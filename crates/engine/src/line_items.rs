//! Category breakdown of itemized transactions.

use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, ItemDirection, ResultEngine, util::parse_uuid};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub description: String,
    pub amount_minor: i64,
    /// Expense or income category account.
    pub account_id: Uuid,
    pub direction: ItemDirection,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transaction_line_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub transaction_id: String,
    pub description: String,
    pub amount_minor: i64,
    pub expense_account_id: Option<String>,
    pub income_account_id: Option<String>,
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
}

impl Related<super::transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&LineItem> for ActiveModel {
    fn from(item: &LineItem) -> Self {
        let account_id = Some(item.account_id.to_string());
        let (expense_account_id, income_account_id) = match item.direction {
            ItemDirection::Expense => (account_id, None),
            ItemDirection::Income => (None, account_id),
        };
        Self {
            id: ActiveValue::Set(item.id.to_string()),
            transaction_id: ActiveValue::Set(item.transaction_id.to_string()),
            description: ActiveValue::Set(item.description.clone()),
            amount_minor: ActiveValue::Set(item.amount_minor),
            expense_account_id: ActiveValue::Set(expense_account_id),
            income_account_id: ActiveValue::Set(income_account_id),
        }
    }
}

impl TryFrom<Model> for LineItem {
    type Error = EngineError;

    fn try_from(model: Model) -> ResultEngine<Self> {
        let (account_id, direction) = match (&model.expense_account_id, &model.income_account_id)
        {
            (Some(id), None) => (id, ItemDirection::Expense),
            (None, Some(id)) => (id, ItemDirection::Income),
            _ => {
                return Err(EngineError::InvalidInput(format!(
                    "line item {} must reference exactly one category",
                    model.id
                )));
            }
        };
        Ok(Self {
            id: parse_uuid(&model.id, "line item")?,
            transaction_id: parse_uuid(&model.transaction_id, "transaction")?,
            description: model.description,
            amount_minor: model.amount_minor,
            account_id: parse_uuid(account_id, "category account")?,
            direction,
        })
    }
}
