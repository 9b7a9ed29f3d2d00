//! Create reservations table

use sea_orm_migration::prelude::*;

use super::m20250601_000002_create_slots::Slots;
use super::m20250601_000003_create_customers::Customers;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Reservations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Reservations::ReservationId)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Reservations::ConfirmationCode)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Reservations::SlotId).uuid().not_null())
                    .col(ColumnDef::new(Reservations::CustomerId).uuid())
                    .col(ColumnDef::new(Reservations::PartySize).integer().not_null())
                    .col(
                        ColumnDef::new(Reservations::RoundType)
                            .string()
                            .not_null()
                            .default("WALKING"),
                    )
                    .col(
                        ColumnDef::new(Reservations::Holes)
                            .integer()
                            .not_null()
                            .default(18),
                    )
                    .col(
                        ColumnDef::new(Reservations::Status)
                            .string()
                            .not_null()
                            .default("BOOKED"),
                    )
                    .col(
                        ColumnDef::new(Reservations::Version)
                            .big_integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(Reservations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Reservations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Reservations::CancelledAt).timestamp_with_time_zone())
                    .check(Expr::col(Reservations::PartySize).gt(0))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_reservations_slot")
                            .from(Reservations::Table, Reservations::SlotId)
                            .to(Slots::Table, Slots::SlotId)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_reservations_customer")
                            .from(Reservations::Table, Reservations::CustomerId)
                            .to(Customers::Table, Customers::CustomerId)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_reservations_slot")
                    .table(Reservations::Table)
                    .col(Reservations::SlotId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Reservations::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Reservations {
    Table,
    ReservationId,
    ConfirmationCode,
    SlotId,
    CustomerId,
    PartySize,
    RoundType,
    Holes,
    Status,
    Version,
    CreatedAt,
    UpdatedAt,
    CancelledAt,
}
