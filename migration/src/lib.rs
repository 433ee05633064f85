pub use sea_orm_migration::prelude::*;

mod m20250301_000001_create_market_operations;
mod m20250301_000002_create_currencies;
mod m20250301_000003_create_currency_prices;
mod m20250301_000004_create_focal_points;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_market_operations::Migration),
            Box::new(m20250301_000002_create_currencies::Migration),
            Box::new(m20250301_000003_create_currency_prices::Migration),
            Box::new(m20250301_000004_create_focal_points::Migration),
        ]
    }
}
