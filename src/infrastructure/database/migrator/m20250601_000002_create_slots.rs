//! Create slots table
//!
//! One row per bookable tee time. Rows are closed, never deleted.

use sea_orm_migration::prelude::*;

use super::m20250601_000001_create_venues::Venues;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Slots::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Slots::SlotId).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Slots::VenueId).string().not_null())
                    .col(
                        ColumnDef::new(Slots::StartTime)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Slots::Capacity).integer().not_null())
                    .col(
                        ColumnDef::new(Slots::BookedCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Slots::Closed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Slots::BasePriceCents)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Slots::Currency)
                            .string_len(3)
                            .not_null()
                            .default("USD"),
                    )
                    .col(
                        ColumnDef::new(Slots::Version)
                            .big_integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(Slots::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .check(Expr::col(Slots::Capacity).gt(0))
                    .check(Expr::col(Slots::BookedCount).gte(0))
                    .check(Expr::col(Slots::BookedCount).lte(Expr::col(Slots::Capacity)))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_slots_venue")
                            .from(Slots::Table, Slots::VenueId)
                            .to(Venues::Table, Venues::VenueId)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_slots_venue_start")
                    .table(Slots::Table)
                    .col(Slots::VenueId)
                    .col(Slots::StartTime)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Slots::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Slots {
    Table,
    SlotId,
    VenueId,
    StartTime,
    Capacity,
    BookedCount,
    Closed,
    BasePriceCents,
    Currency,
    Version,
    UpdatedAt,
}
