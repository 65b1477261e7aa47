//! table replays

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Replays::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Replays::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Replays::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Replays::Title).text().not_null())
                    .col(
                        ColumnDef::new(Replays::Year)
                            .integer()
                            .not_null()
                            .check(Expr::col(Replays::Year).gte(2011)),
                    )
                    .col(
                        ColumnDef::new(Replays::Runtime)
                            .integer()
                            .not_null()
                            .check(Expr::col(Replays::Runtime).gte(0)),
                    )
                    // tableau JSON de héros, portable postgres/sqlite
                    .col(ColumnDef::new(Replays::Heroes).text().not_null())
                    .col(
                        ColumnDef::new(Replays::Version)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_replays_title")
                    .table(Replays::Table)
                    .col(Replays::Title)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Replays::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Replays {
    Table,
    Id,
    CreatedAt,
    Title,
    Year,
    Runtime,
    Heroes,
    Version,
}
