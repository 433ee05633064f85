use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(FocalPoints::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FocalPoints::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(FocalPoints::FocalPointId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FocalPoints::FocalPointType)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(FocalPoints::EstateId).string().not_null())
                    .col(ColumnDef::new(FocalPoints::DclId).string().not_null())
                    .col(ColumnDef::new(FocalPoints::Name).string().not_null())
                    .col(ColumnDef::new(FocalPoints::Description).text().not_null())
                    .col(
                        ColumnDef::new(FocalPoints::ParcelsLoc)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FocalPoints::ParcelsCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(FocalPoints::Category).string().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_focal_points_type")
                    .table(FocalPoints::Table)
                    .col(FocalPoints::FocalPointType)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FocalPoints::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum FocalPoints {
    Table,
    Id,
    FocalPointId,
    FocalPointType,
    EstateId,
    DclId,
    Name,
    Description,
    ParcelsLoc,
    ParcelsCount,
    Category,
}
