use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MarketOperations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MarketOperations::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(MarketOperations::OperationId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MarketOperations::DownloadedFrom)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(MarketOperations::Type).string().not_null())
                    .col(ColumnDef::new(MarketOperations::Source).string().not_null())
                    .col(
                        ColumnDef::new(MarketOperations::Date)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MarketOperations::LastUpdatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(MarketOperations::Metaverse)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MarketOperations::Blockchain)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(MarketOperations::Cursor).string().not_null())
                    .col(
                        ColumnDef::new(MarketOperations::Reverted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(MarketOperations::OrderId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MarketOperations::OrderHash)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MarketOperations::TransactionHash)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MarketOperations::TransactionType)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(MarketOperations::Maker).string().not_null())
                    .col(ColumnDef::new(MarketOperations::Taker).string().not_null())
                    .col(ColumnDef::new(MarketOperations::Buyer).string().not_null())
                    .col(ColumnDef::new(MarketOperations::Seller).string().not_null())
                    .col(
                        ColumnDef::new(MarketOperations::AssetContract)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MarketOperations::AssetType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MarketOperations::AssetId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MarketOperations::AssetLocation)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(MarketOperations::AssetLocX).integer().null())
                    .col(ColumnDef::new(MarketOperations::AssetLocY).integer().null())
                    .col(
                        ColumnDef::new(MarketOperations::AssetValue)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(MarketOperations::PaymentBlockchain)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MarketOperations::PaymentType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MarketOperations::PaymentToken)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MarketOperations::PaymentCurrency)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MarketOperations::PaymentAmount)
                            .decimal()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MarketOperations::PaymentAmountUsd)
                            .decimal()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(MarketOperations::PaymentCcyPrice)
                            .decimal()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(MarketOperations::BuyerOrderHash)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MarketOperations::SellerOrderHash)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MarketOperations::BlockHash)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MarketOperations::BlockNumber)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(MarketOperations::LogIndex)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(MarketOperations::Data)
                            .json_binary()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Natural key: one row per (operation_id, type, source, date)
        manager
            .create_index(
                Index::create()
                    .name("idx_market_operations_natural_key")
                    .table(MarketOperations::Table)
                    .col(MarketOperations::OperationId)
                    .col(MarketOperations::Type)
                    .col(MarketOperations::Source)
                    .col(MarketOperations::Date)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Checkpoint lookups (most recent operation per source/world/type)
        manager
            .create_index(
                Index::create()
                    .name("idx_market_operations_checkpoint")
                    .table(MarketOperations::Table)
                    .col(MarketOperations::DownloadedFrom)
                    .col(MarketOperations::Metaverse)
                    .col(MarketOperations::Type)
                    .col(MarketOperations::Date)
                    .to_owned(),
            )
            .await?;

        // Export grouping by asset
        manager
            .create_index(
                Index::create()
                    .name("idx_market_operations_asset_id")
                    .table(MarketOperations::Table)
                    .col(MarketOperations::AssetId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(MarketOperations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum MarketOperations {
    Table,
    Id,
    OperationId,
    DownloadedFrom,
    Type,
    Source,
    Date,
    LastUpdatedAt,
    Metaverse,
    Blockchain,
    Cursor,
    Reverted,
    OrderId,
    OrderHash,
    TransactionHash,
    TransactionType,
    Maker,
    Taker,
    Buyer,
    Seller,
    AssetContract,
    AssetType,
    AssetId,
    AssetLocation,
    AssetLocX,
    AssetLocY,
    AssetValue,
    PaymentBlockchain,
    PaymentType,
    PaymentToken,
    PaymentCurrency,
    PaymentAmount,
    PaymentAmountUsd,
    PaymentCcyPrice,
    BuyerOrderHash,
    SellerOrderHash,
    BlockHash,
    BlockNumber,
    LogIndex,
    Data,
}
