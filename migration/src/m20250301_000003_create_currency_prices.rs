use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CurrencyPrices::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CurrencyPrices::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CurrencyPrices::Currency).string().not_null())
                    .col(
                        ColumnDef::new(CurrencyPrices::Start)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CurrencyPrices::End)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(CurrencyPrices::Open).decimal().not_null())
                    .col(ColumnDef::new(CurrencyPrices::High).decimal().not_null())
                    .col(ColumnDef::new(CurrencyPrices::Low).decimal().not_null())
                    .col(ColumnDef::new(CurrencyPrices::Close).decimal().not_null())
                    .col(ColumnDef::new(CurrencyPrices::Avg).decimal().not_null())
                    .col(ColumnDef::new(CurrencyPrices::Volume).decimal().not_null())
                    .col(
                        ColumnDef::new(CurrencyPrices::MarketCap)
                            .decimal()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Interval lookups scan one currency ordered by start
        manager
            .create_index(
                Index::create()
                    .name("idx_currency_prices_currency_start")
                    .table(CurrencyPrices::Table)
                    .col(CurrencyPrices::Currency)
                    .col(CurrencyPrices::Start)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CurrencyPrices::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CurrencyPrices {
    Table,
    Id,
    Currency,
    Start,
    End,
    Open,
    High,
    Low,
    Close,
    Avg,
    Volume,
    MarketCap,
}
