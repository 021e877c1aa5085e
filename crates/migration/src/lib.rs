pub use sea_orm_migration::prelude::*;

mod m20260105_000000_init;
mod m20260112_000000_exchange_rates;
mod m20260120_000000_reconciliation;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260105_000000_init::Migration),
            Box::new(m20260112_000000_exchange_rates::Migration),
            Box::new(m20260120_000000_reconciliation::Migration),
        ]
    }
}
