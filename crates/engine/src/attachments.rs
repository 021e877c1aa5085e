//! Transaction attachments.
//!
//! The engine only keeps a reference (`file_id`) to files living in an
//! external store. When a transaction goes away its rows are deleted and the
//! files are handed to an [`AttachmentStore`] for release.

use async_trait::async_trait;
use sea_orm::entity::prelude::*;

use crate::ResultEngine;

/// External file storage, as seen by the ledger.
#[async_trait]
pub trait AttachmentStore: Send + Sync + std::fmt::Debug {
    /// Releases a file that is no longer referenced by any transaction.
    async fn release(&self, file_id: &str) -> ResultEngine<()>;
}

/// Store used when the host application keeps no files.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopAttachmentStore;

#[async_trait]
impl AttachmentStore for NoopAttachmentStore {
    async fn release(&self, _file_id: &str) -> ResultEngine<()> {
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transaction_attachments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub transaction_id: String,
    pub file_id: String,
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
