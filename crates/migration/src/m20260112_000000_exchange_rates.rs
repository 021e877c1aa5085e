//! Persistent tier of the exchange rate cache.
//!
//! One row per directional `(base_currency, target_currency)` pair.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ExchangeRates::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ExchangeRates::BaseCurrency)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ExchangeRates::TargetCurrency)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ExchangeRates::Rate).double().not_null())
                    .col(
                        ColumnDef::new(ExchangeRates::FetchedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(ExchangeRates::BaseCurrency)
                            .col(ExchangeRates::TargetCurrency),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ExchangeRates::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum ExchangeRates {
    Table,
    BaseCurrency,
    TargetCurrency,
    Rate,
    FetchedAt,
}
