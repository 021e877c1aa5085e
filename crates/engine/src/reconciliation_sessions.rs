//! Reconciliation sessions table.
//!
//! Statement rows are kept verbatim as a JSON array in `rows_json`; row
//! indexes in `reconciliation_matches` point into it.

use sea_orm::{ActiveValue, entity::prelude::*};

use crate::{
    EngineError, ReconciliationSession, ResultEngine, SessionStatus, StatementRow,
    util::parse_uuid,
};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "reconciliation_sessions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_id: String,
    pub account_id: String,
    pub filename: String,
    pub rows_json: String,
    pub status: String,
    pub created_at: DateTimeUtc,
    pub completed_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::reconciliation_matches::Entity")]
    Matches,
}

impl Related<super::reconciliation_matches::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Matches.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<&ReconciliationSession> for ActiveModel {
    type Error = EngineError;

    fn try_from(session: &ReconciliationSession) -> ResultEngine<Self> {
        Ok(Self {
            id: ActiveValue::Set(session.id.to_string()),
            user_id: ActiveValue::Set(session.user_id.clone()),
            account_id: ActiveValue::Set(session.account_id.to_string()),
            filename: ActiveValue::Set(session.filename.clone()),
            rows_json: ActiveValue::Set(serde_json::to_string(&session.rows)?),
            status: ActiveValue::Set(session.status.as_str().to_string()),
            created_at: ActiveValue::Set(session.created_at),
            completed_at: ActiveValue::Set(session.completed_at),
        })
    }
}

impl TryFrom<Model> for ReconciliationSession {
    type Error = EngineError;

    fn try_from(model: Model) -> ResultEngine<Self> {
        let rows: Vec<StatementRow> = serde_json::from_str(&model.rows_json)?;
        Ok(Self {
            id: parse_uuid(&model.id, "reconciliation session")?,
            user_id: model.user_id,
            account_id: parse_uuid(&model.account_id, "account")?,
            filename: model.filename,
            rows,
            status: SessionStatus::try_from(model.status.as_str())?,
            created_at: model.created_at,
            completed_at: model.completed_at,
            matches: Vec::new(),
        })
    }
}
