//! Per-row match records, keyed by `(session_id, csv_row_index)`.

use sea_orm::{ActiveValue, entity::prelude::*};
use uuid::Uuid;

use crate::{EngineError, MatchType, ReconciliationMatch, ResultEngine, util::parse_uuid};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "reconciliation_matches")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub session_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub csv_row_index: i32,
    pub transaction_id: Option<String>,
    pub match_type: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::reconciliation_sessions::Entity",
        from = "Column::SessionId",
        to = "super::reconciliation_sessions::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Sessions,
}

impl Related<super::reconciliation_sessions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sessions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

pub(crate) fn row_index_column(row_index: usize) -> ResultEngine<i32> {
    i32::try_from(row_index)
        .map_err(|_| EngineError::InvalidInput(format!("row index {row_index} out of range")))
}

impl ActiveModel {
    pub(crate) fn for_row(
        session_id: Uuid,
        row_index: usize,
        transaction_id: Option<Uuid>,
        match_type: MatchType,
    ) -> ResultEngine<Self> {
        Ok(Self {
            session_id: ActiveValue::Set(session_id.to_string()),
            csv_row_index: ActiveValue::Set(row_index_column(row_index)?),
            transaction_id: ActiveValue::Set(transaction_id.map(|id| id.to_string())),
            match_type: ActiveValue::Set(match_type.as_str().to_string()),
        })
    }
}

impl TryFrom<Model> for ReconciliationMatch {
    type Error = EngineError;

    fn try_from(model: Model) -> ResultEngine<Self> {
        let row_index = usize::try_from(model.csv_row_index).map_err(|_| {
            EngineError::InvalidInput(format!("invalid row index {}", model.csv_row_index))
        })?;
        Ok(Self {
            row_index,
            transaction_id: model
                .transaction_id
                .as_deref()
                .map(|id| parse_uuid(id, "transaction"))
                .transpose()?,
            match_type: MatchType::try_from(model.match_type.as_str())?,
        })
    }
}
