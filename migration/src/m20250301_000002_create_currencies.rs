use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Currencies::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Currencies::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Currencies::Blockchain).string().not_null())
                    .col(ColumnDef::new(Currencies::Contract).string().not_null())
                    .col(
                        ColumnDef::new(Currencies::Decimals)
                            .big_integer()
                            .not_null()
                            .default(18),
                    )
                    .col(ColumnDef::new(Currencies::Name).string().not_null())
                    .col(ColumnDef::new(Currencies::Symbols).string().not_null())
                    .col(
                        ColumnDef::new(Currencies::MainCurrency)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_currencies_blockchain_contract")
                    .table(Currencies::Table)
                    .col(Currencies::Blockchain)
                    .col(Currencies::Contract)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Currencies::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Currencies {
    Table,
    Id,
    Blockchain,
    Contract,
    Decimals,
    Name,
    Symbols,
    MainCurrency,
}
