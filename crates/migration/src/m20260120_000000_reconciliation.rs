//! Bank statement reconciliation sessions and their per-row matches.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ReconciliationSessions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ReconciliationSessions::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ReconciliationSessions::UserId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReconciliationSessions::AccountId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReconciliationSessions::Filename)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReconciliationSessions::RowsJson)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReconciliationSessions::Status)
                            .string()
                            .not_null()
                            .default("in_progress"),
                    )
                    .col(
                        ColumnDef::new(ReconciliationSessions::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ReconciliationSessions::CompletedAt).timestamp())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-reconciliation_sessions-account_id")
                            .from(
                                ReconciliationSessions::Table,
                                ReconciliationSessions::AccountId,
                            )
                            .to(Accounts::Table, Accounts::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-reconciliation_sessions-user_id")
                    .table(ReconciliationSessions::Table)
                    .col(ReconciliationSessions::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ReconciliationMatches::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ReconciliationMatches::SessionId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReconciliationMatches::CsvRowIndex)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ReconciliationMatches::TransactionId).string())
                    .col(
                        ColumnDef::new(ReconciliationMatches::MatchType)
                            .string()
                            .not_null()
                            .default("none"),
                    )
                    .primary_key(
                        Index::create()
                            .col(ReconciliationMatches::SessionId)
                            .col(ReconciliationMatches::CsvRowIndex),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-reconciliation_matches-session_id")
                            .from(
                                ReconciliationMatches::Table,
                                ReconciliationMatches::SessionId,
                            )
                            .to(ReconciliationSessions::Table, ReconciliationSessions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-reconciliation_matches-transaction_id")
                    .table(ReconciliationMatches::Table)
                    .col(ReconciliationMatches::TransactionId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ReconciliationMatches::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ReconciliationSessions::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Accounts {
    Table,
    Id,
}

#[derive(Iden)]
enum ReconciliationSessions {
    Table,
    Id,
    UserId,
    AccountId,
    Filename,
    RowsJson,
    Status,
    CreatedAt,
    CompletedAt,
}

#[derive(Iden)]
enum ReconciliationMatches {
    Table,
    SessionId,
    CsvRowIndex,
    TransactionId,
    MatchType,
}
