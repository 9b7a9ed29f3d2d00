//! Create reservation_changes table
//!
//! Append-only audit trail. `idempotency_key` is unique across all changes
//! and is the final guard against duplicate mutations.

use sea_orm_migration::prelude::*;

use super::m20250601_000004_create_reservations::Reservations;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ReservationChanges::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ReservationChanges::Seq)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ReservationChanges::ChangeId)
                            .uuid()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(ReservationChanges::ReservationId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReservationChanges::ChangeType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReservationChanges::ChangedFields)
                            .string()
                            .not_null()
                            .default("[]"),
                    )
                    .col(
                        ColumnDef::new(ReservationChanges::IdempotencyKey)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(ReservationChanges::RequestFingerprint)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ReservationChanges::BeforeState).text())
                    .col(
                        ColumnDef::new(ReservationChanges::AfterState)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ReservationChanges::PrevHash).string())
                    .col(
                        ColumnDef::new(ReservationChanges::EntryHash)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReservationChanges::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_reservation_changes_reservation")
                            .from(ReservationChanges::Table, ReservationChanges::ReservationId)
                            .to(Reservations::Table, Reservations::ReservationId)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_reservation_changes_reservation")
                    .table(ReservationChanges::Table)
                    .col(ReservationChanges::ReservationId)
                    .col(ReservationChanges::Seq)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ReservationChanges::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum ReservationChanges {
    Table,
    Seq,
    ChangeId,
    ReservationId,
    ChangeType,
    ChangedFields,
    IdempotencyKey,
    RequestFingerprint,
    BeforeState,
    AfterState,
    PrevHash,
    EntryHash,
    CreatedAt,
}
