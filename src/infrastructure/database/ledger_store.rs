//! SeaORM implementation of the ledger store
//!
//! Works on SQLite and PostgreSQL. A slot lock is taken by touching the row
//! with an `UPDATE` (a row lock on PostgreSQL, the database write lock on
//! SQLite), followed by `SELECT ... FOR UPDATE` on PostgreSQL. Lock waits are
//! bounded per transaction.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, DbErr,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RuntimeErr, Set, SqlErr,
    TransactionTrait,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{
    ChangeType, Contact, LedgerStore, LedgerTx, NewChange, NewSlot, Reservation,
    ReservationChange, ReservationId, Slot, SlotId, SlotQuery, Venue,
};
use crate::infrastructure::database::entities::{customer, reservation, reservation_change, slot, venue};
use crate::shared::errors::{LedgerError, LedgerResult};
use crate::shared::time::now_utc;

pub struct SeaOrmLedgerStore {
    db: DatabaseConnection,
    lock_timeout: Duration,
}

impl SeaOrmLedgerStore {
    pub fn new(db: DatabaseConnection, lock_timeout: Duration) -> Self {
        Self { db, lock_timeout }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

// ── Conversion helpers ──────────────────────────────────────────

fn slot_to_domain(m: slot::Model) -> LedgerResult<Slot> {
    Slot::new(
        m.slot_id,
        m.venue_id,
        m.start_time,
        m.capacity,
        m.booked_count,
        m.closed,
        m.base_price_cents,
        m.currency,
        m.version,
    )
}

fn venue_to_domain(m: venue::Model) -> Venue {
    Venue {
        venue_id: m.venue_id,
        name: m.name,
        utc_offset_minutes: m.utc_offset_minutes,
    }
}

fn reservation_to_domain(m: reservation::Model) -> LedgerResult<Reservation> {
    Ok(Reservation {
        reservation_id: m.reservation_id,
        confirmation_code: m.confirmation_code,
        slot_id: m.slot_id,
        customer_id: m.customer_id,
        party_size: m.party_size,
        round_type: m.round_type.parse().map_err(|_| {
            LedgerError::InvariantViolation(format!("unknown round_type '{}'", m.round_type))
        })?,
        holes: m.holes,
        status: m.status.parse()?,
        version: m.version,
        created_at: m.created_at,
        updated_at: m.updated_at,
        cancelled_at: m.cancelled_at,
        created_by_call_id: m.created_by_call_id,
        updated_by_call_id: m.updated_by_call_id,
    })
}

fn change_to_domain(m: reservation_change::Model) -> LedgerResult<ReservationChange> {
    let changed_fields: Vec<String> = serde_json::from_str(&m.changed_fields).map_err(|e| {
        LedgerError::InvariantViolation(format!("malformed changed_fields at seq {}: {e}", m.seq))
    })?;
    Ok(ReservationChange {
        seq: i64::from(m.seq),
        change_id: m.change_id,
        reservation_id: m.reservation_id,
        change_type: m.change_type.parse::<ChangeType>()?,
        changed_fields,
        idempotency_key: m.idempotency_key,
        request_fingerprint: m.request_fingerprint,
        call_id: m.call_id,
        before_state: m.before_state,
        after_state: m.after_state,
        prev_hash: m.prev_hash,
        entry_hash: m.entry_hash,
        created_at: m.created_at,
    })
}

fn sqlstate(e: &DbErr) -> Option<String> {
    match e {
        DbErr::Exec(RuntimeErr::SqlxError(err))
        | DbErr::Query(RuntimeErr::SqlxError(err))
        | DbErr::Conn(RuntimeErr::SqlxError(err)) => err
            .as_database_error()
            .and_then(|d| d.code())
            .map(|c| c.into_owned()),
        _ => None,
    }
}

/// Map lock waits and serialization failures to their ledger meaning;
/// everything else is a storage error.
fn db_err(e: DbErr) -> LedgerError {
    if matches!(e, DbErr::ConnectionAcquire(_)) {
        return LedgerError::LockTimeout(format!("connection pool: {e}"));
    }
    let code = sqlstate(&e);
    let message = e.to_string();
    match code.as_deref() {
        // PostgreSQL lock_not_available, deadlock_detected; SQLite BUSY, LOCKED
        Some("55P03") | Some("40P01") | Some("5") | Some("6") | Some("517") => {
            return LedgerError::LockTimeout(message)
        }
        Some("40001") => return LedgerError::StaleWrite(message),
        _ => {}
    }
    if message.contains("database is locked") || message.contains("lock timeout") {
        return LedgerError::LockTimeout(message);
    }
    LedgerError::Storage(message)
}

fn is_unique_violation(e: &DbErr) -> bool {
    matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

// ── LedgerStore impl ────────────────────────────────────────────

#[async_trait]
impl LedgerStore for SeaOrmLedgerStore {
    async fn begin(&self) -> LedgerResult<Box<dyn LedgerTx>> {
        let txn = self.db.begin().await.map_err(db_err)?;
        let backend = self.db.get_database_backend();
        let millis = self.lock_timeout.as_millis();
        let setup = match backend {
            DbBackend::Postgres => Some(format!("SET LOCAL lock_timeout = '{millis}ms'")),
            DbBackend::Sqlite => Some(format!("PRAGMA busy_timeout = {millis}")),
            _ => None,
        };
        if let Some(sql) = setup {
            txn.execute_unprepared(&sql).await.map_err(db_err)?;
        }
        Ok(Box::new(SeaOrmTx { txn, backend }))
    }

    async fn ping(&self) -> LedgerResult<()> {
        self.db.ping().await.map_err(db_err)
    }

    async fn venue(&self, venue_id: &str) -> LedgerResult<Option<Venue>> {
        let model = venue::Entity::find_by_id(venue_id.to_string())
            .one(&self.db)
            .await
            .map_err(db_err)?;
        Ok(model.map(venue_to_domain))
    }

    async fn slot(&self, slot_id: SlotId) -> LedgerResult<Option<Slot>> {
        slot::Entity::find_by_id(slot_id)
            .one(&self.db)
            .await
            .map_err(db_err)?
            .map(slot_to_domain)
            .transpose()
    }

    async fn slot_at(
        &self,
        venue_id: &str,
        start_time: DateTime<Utc>,
    ) -> LedgerResult<Option<Slot>> {
        slot::Entity::find()
            .filter(slot::Column::VenueId.eq(venue_id))
            .filter(slot::Column::StartTime.eq(start_time))
            .one(&self.db)
            .await
            .map_err(db_err)?
            .map(slot_to_domain)
            .transpose()
    }

    async fn available_slots(&self, query: &SlotQuery) -> LedgerResult<Vec<Slot>> {
        let models = slot::Entity::find()
            .filter(slot::Column::VenueId.eq(query.venue_id.as_str()))
            .filter(slot::Column::StartTime.gte(query.from))
            .filter(slot::Column::StartTime.lte(query.to))
            .filter(slot::Column::Closed.eq(false))
            .filter(
                Expr::expr(Expr::col(slot::Column::BookedCount).add(query.min_party_size))
                    .lte(Expr::col(slot::Column::Capacity)),
            )
            .order_by_asc(slot::Column::StartTime)
            .order_by_asc(slot::Column::SlotId)
            .limit(query.limit)
            .all(&self.db)
            .await
            .map_err(db_err)?;
        models.into_iter().map(slot_to_domain).collect()
    }

    async fn reservation_by_code(&self, code: &str) -> LedgerResult<Option<Reservation>> {
        find_reservation_by_code(&self.db, code).await
    }

    async fn change_by_key(&self, idempotency_key: &str) -> LedgerResult<Option<ReservationChange>> {
        find_change_by_key(&self.db, idempotency_key).await
    }

    async fn changes_for(&self, reservation_id: ReservationId) -> LedgerResult<Vec<ReservationChange>> {
        reservation_change::Entity::find()
            .filter(reservation_change::Column::ReservationId.eq(reservation_id))
            .order_by_asc(reservation_change::Column::Seq)
            .all(&self.db)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(change_to_domain)
            .collect()
    }

    async fn upsert_venue(&self, v: &Venue) -> LedgerResult<()> {
        let model = venue::ActiveModel {
            venue_id: Set(v.venue_id.clone()),
            name: Set(v.name.clone()),
            utc_offset_minutes: Set(v.utc_offset_minutes),
            created_at: Set(now_utc()),
        };
        venue::Entity::insert(model)
            .on_conflict(
                OnConflict::column(venue::Column::VenueId)
                    .update_columns([venue::Column::Name, venue::Column::UtcOffsetMinutes])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn ensure_slot(&self, s: &NewSlot) -> LedgerResult<(Slot, bool)> {
        if let Some(existing) = self.slot_at(&s.venue_id, s.start_time).await? {
            return Ok((existing, false));
        }
        let created = Slot::new(
            Uuid::new_v4(),
            s.venue_id.clone(),
            s.start_time,
            s.capacity,
            0,
            false,
            s.base_price_cents,
            s.currency.clone(),
            1,
        )?;
        let model = slot::ActiveModel {
            slot_id: Set(created.slot_id),
            venue_id: Set(created.venue_id.clone()),
            start_time: Set(created.start_time),
            capacity: Set(created.capacity),
            booked_count: Set(created.booked_count),
            closed: Set(created.closed),
            base_price_cents: Set(created.base_price_cents),
            currency: Set(created.currency.clone()),
            version: Set(created.version),
            updated_at: Set(now_utc()),
        };
        match slot::Entity::insert(model)
            .exec_without_returning(&self.db)
            .await
        {
            Ok(_) => Ok((created, true)),
            Err(e) if is_unique_violation(&e) => {
                // Lost a seeding race; the other writer's row stands.
                let existing = self
                    .slot_at(&s.venue_id, s.start_time)
                    .await?
                    .ok_or_else(|| LedgerError::Storage(e.to_string()))?;
                Ok((existing, false))
            }
            Err(e) => Err(db_err(e)),
        }
    }

    async fn set_slot_closed(&self, slot_id: SlotId, closed: bool) -> LedgerResult<Slot> {
        let result = slot::Entity::update_many()
            .col_expr(slot::Column::Closed, Expr::value(closed))
            .col_expr(slot::Column::UpdatedAt, Expr::value(now_utc()))
            .filter(slot::Column::SlotId.eq(slot_id))
            .exec(&self.db)
            .await
            .map_err(db_err)?;
        if result.rows_affected == 0 {
            return Err(LedgerError::not_found("Slot", "slot_id", slot_id));
        }
        self.slot(slot_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Slot", "slot_id", slot_id))
    }
}

async fn find_reservation_by_code<C: ConnectionTrait>(
    conn: &C,
    code: &str,
) -> LedgerResult<Option<Reservation>> {
    reservation::Entity::find()
        .filter(reservation::Column::ConfirmationCode.eq(code))
        .one(conn)
        .await
        .map_err(db_err)?
        .map(reservation_to_domain)
        .transpose()
}

async fn find_change_by_key<C: ConnectionTrait>(
    conn: &C,
    idempotency_key: &str,
) -> LedgerResult<Option<ReservationChange>> {
    reservation_change::Entity::find()
        .filter(reservation_change::Column::IdempotencyKey.eq(idempotency_key))
        .one(conn)
        .await
        .map_err(db_err)?
        .map(change_to_domain)
        .transpose()
}

// ── Transaction ─────────────────────────────────────────────────

struct SeaOrmTx {
    txn: DatabaseTransaction,
    backend: DbBackend,
}

#[async_trait]
impl LedgerTx for SeaOrmTx {
    async fn lock_slot(&mut self, slot_id: SlotId) -> LedgerResult<Option<Slot>> {
        let touched = slot::Entity::update_many()
            .col_expr(slot::Column::Version, Expr::col(slot::Column::Version).into())
            .filter(slot::Column::SlotId.eq(slot_id))
            .exec(&self.txn)
            .await
            .map_err(db_err)?;
        if touched.rows_affected == 0 {
            return Ok(None);
        }

        let mut select = slot::Entity::find_by_id(slot_id);
        if self.backend == DbBackend::Postgres {
            select = select.lock_exclusive();
        }
        let model = select.one(&self.txn).await.map_err(db_err)?;
        debug!(%slot_id, "Slot row locked");
        model.map(slot_to_domain).transpose()
    }

    async fn write_slot_booked(
        &mut self,
        slot_id: SlotId,
        booked_count: i32,
        expected_version: i64,
    ) -> LedgerResult<()> {
        let result = slot::Entity::update_many()
            .col_expr(slot::Column::BookedCount, Expr::value(booked_count))
            .col_expr(slot::Column::Version, Expr::value(expected_version + 1))
            .col_expr(slot::Column::UpdatedAt, Expr::value(now_utc()))
            .filter(slot::Column::SlotId.eq(slot_id))
            .filter(slot::Column::Version.eq(expected_version))
            .exec(&self.txn)
            .await
            .map_err(db_err)?;
        if result.rows_affected == 0 {
            warn!(%slot_id, expected_version, "Slot version moved under lock");
            return Err(LedgerError::StaleWrite(format!("slot {slot_id}")));
        }
        Ok(())
    }

    async fn reservation_by_code(&mut self, code: &str) -> LedgerResult<Option<Reservation>> {
        find_reservation_by_code(&self.txn, code).await
    }

    async fn confirmation_code_exists(&mut self, code: &str) -> LedgerResult<bool> {
        let count = reservation::Entity::find()
            .filter(reservation::Column::ConfirmationCode.eq(code))
            .count(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(count > 0)
    }

    async fn change_by_key(&mut self, idempotency_key: &str) -> LedgerResult<Option<ReservationChange>> {
        find_change_by_key(&self.txn, idempotency_key).await
    }

    async fn last_change_for(&mut self, reservation_id: ReservationId) -> LedgerResult<Option<ReservationChange>> {
        reservation_change::Entity::find()
            .filter(reservation_change::Column::ReservationId.eq(reservation_id))
            .order_by_desc(reservation_change::Column::Seq)
            .one(&self.txn)
            .await
            .map_err(db_err)?
            .map(change_to_domain)
            .transpose()
    }

    async fn upsert_customer(&mut self, contact: &Contact) -> LedgerResult<Uuid> {
        let now = now_utc();
        let existing = customer::Entity::find()
            .filter(customer::Column::PhoneE164.eq(contact.phone_e164.as_str()))
            .one(&self.txn)
            .await
            .map_err(db_err)?;

        if let Some(found) = existing {
            customer::Entity::update_many()
                .col_expr(customer::Column::FullName, Expr::value(contact.name.clone()))
                .col_expr(customer::Column::UpdatedAt, Expr::value(now))
                .filter(customer::Column::CustomerId.eq(found.customer_id))
                .exec(&self.txn)
                .await
                .map_err(db_err)?;
            return Ok(found.customer_id);
        }

        let customer_id = Uuid::new_v4();
        let model = customer::ActiveModel {
            customer_id: Set(customer_id),
            phone_e164: Set(contact.phone_e164.clone()),
            full_name: Set(contact.name.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        };
        customer::Entity::insert(model)
            .exec_without_returning(&self.txn)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    LedgerError::StaleWrite(format!("customer {}", contact.phone_e164))
                } else {
                    db_err(e)
                }
            })?;
        Ok(customer_id)
    }

    async fn insert_reservation(&mut self, r: &Reservation) -> LedgerResult<()> {
        let model = reservation::ActiveModel {
            reservation_id: Set(r.reservation_id),
            confirmation_code: Set(r.confirmation_code.clone()),
            slot_id: Set(r.slot_id),
            customer_id: Set(r.customer_id),
            party_size: Set(r.party_size),
            round_type: Set(r.round_type.as_str().to_string()),
            holes: Set(r.holes),
            status: Set(r.status.as_str().to_string()),
            version: Set(r.version),
            created_at: Set(r.created_at),
            updated_at: Set(r.updated_at),
            cancelled_at: Set(r.cancelled_at),
            created_by_call_id: Set(r.created_by_call_id.clone()),
            updated_by_call_id: Set(r.updated_by_call_id.clone()),
        };
        reservation::Entity::insert(model)
            .exec_without_returning(&self.txn)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    LedgerError::DuplicateConfirmationCode(r.confirmation_code.clone())
                } else {
                    db_err(e)
                }
            })?;
        Ok(())
    }

    async fn update_reservation(&mut self, r: &Reservation, expected_version: i64) -> LedgerResult<()> {
        let result = reservation::Entity::update_many()
            .col_expr(reservation::Column::SlotId, Expr::value(r.slot_id))
            .col_expr(reservation::Column::PartySize, Expr::value(r.party_size))
            .col_expr(
                reservation::Column::RoundType,
                Expr::value(r.round_type.as_str().to_string()),
            )
            .col_expr(reservation::Column::Holes, Expr::value(r.holes))
            .col_expr(
                reservation::Column::Status,
                Expr::value(r.status.as_str().to_string()),
            )
            .col_expr(reservation::Column::Version, Expr::value(r.version))
            .col_expr(reservation::Column::UpdatedAt, Expr::value(r.updated_at))
            .col_expr(reservation::Column::CancelledAt, Expr::value(r.cancelled_at))
            .col_expr(
                reservation::Column::UpdatedByCallId,
                Expr::value(r.updated_by_call_id.clone()),
            )
            .filter(reservation::Column::ReservationId.eq(r.reservation_id))
            .filter(reservation::Column::Version.eq(expected_version))
            .exec(&self.txn)
            .await
            .map_err(db_err)?;
        if result.rows_affected == 0 {
            return Err(LedgerError::StaleWrite(format!(
                "reservation {}",
                r.confirmation_code
            )));
        }
        Ok(())
    }

    async fn insert_change(&mut self, change: NewChange) -> LedgerResult<ReservationChange> {
        let changed_fields = serde_json::to_string(&change.changed_fields)
            .map_err(|e| LedgerError::InvariantViolation(e.to_string()))?;
        let model = reservation_change::ActiveModel {
            change_id: Set(change.change_id),
            reservation_id: Set(change.reservation_id),
            change_type: Set(change.change_type.as_str().to_string()),
            changed_fields: Set(changed_fields),
            idempotency_key: Set(change.idempotency_key.clone()),
            request_fingerprint: Set(change.request_fingerprint.clone()),
            call_id: Set(change.call_id.clone()),
            before_state: Set(change.before_state.clone()),
            after_state: Set(change.after_state.clone()),
            prev_hash: Set(change.prev_hash.clone()),
            entry_hash: Set(change.entry_hash.clone()),
            created_at: Set(change.created_at),
            ..Default::default()
        };
        let inserted = reservation_change::Entity::insert(model)
            .exec(&self.txn)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    LedgerError::DuplicateIdempotencyKey(change.idempotency_key.clone())
                } else {
                    db_err(e)
                }
            })?;
        Ok(ReservationChange::from_new(
            i64::from(inserted.last_insert_id),
            change,
        ))
    }

    async fn commit(self: Box<Self>) -> LedgerResult<()> {
        self.txn.commit().await.map_err(|e| {
            if is_unique_violation(&e) {
                LedgerError::DuplicateIdempotencyKey(e.to_string())
            } else {
                db_err(e)
            }
        })
    }

    async fn rollback(self: Box<Self>) -> LedgerResult<()> {
        self.txn.rollback().await.map_err(db_err)
    }
}
