//! Storage traits for the ledger
//!
//! Contains:
//! - `LedgerStore` — non-locking reads, inventory writes, and the entry point
//!   for units of work
//! - `LedgerTx` — row operations inside one storage transaction
//! - `SlotQuery` — filter for the availability read path

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::change::{NewChange, ReservationChange};
use super::reservation::{Contact, Reservation, ReservationId};
use super::slot::{NewSlot, Slot, SlotId, Venue};
use crate::shared::errors::LedgerResult;

/// Open slots at a venue with room for at least `min_party_size`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotQuery {
    pub venue_id: String,
    /// Inclusive bounds on `start_time`.
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub min_party_size: i32,
    pub limit: u64,
}

// ── LedgerStore ─────────────────────────────────────────────────

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open a unit of work. The returned transaction must be committed or
    /// rolled back explicitly.
    async fn begin(&self) -> LedgerResult<Box<dyn LedgerTx>>;

    /// Cheap reachability check for health probes.
    async fn ping(&self) -> LedgerResult<()>;

    async fn venue(&self, venue_id: &str) -> LedgerResult<Option<Venue>>;

    async fn slot(&self, slot_id: SlotId) -> LedgerResult<Option<Slot>>;

    /// Slot starting exactly at `start_time` at the venue
    async fn slot_at(&self, venue_id: &str, start_time: DateTime<Utc>)
        -> LedgerResult<Option<Slot>>;

    /// Ordered by start time, at most `query.limit` rows. Takes no locks.
    async fn available_slots(&self, query: &SlotQuery) -> LedgerResult<Vec<Slot>>;

    async fn reservation_by_code(&self, code: &str) -> LedgerResult<Option<Reservation>>;

    async fn change_by_key(&self, idempotency_key: &str)
        -> LedgerResult<Option<ReservationChange>>;

    /// Full history ordered by `seq`
    async fn changes_for(&self, reservation_id: ReservationId)
        -> LedgerResult<Vec<ReservationChange>>;

    async fn upsert_venue(&self, venue: &Venue) -> LedgerResult<()>;

    /// Insert the slot unless one already exists at the same venue and start
    /// time. Returns the stored slot and whether it was created.
    async fn ensure_slot(&self, slot: &NewSlot) -> LedgerResult<(Slot, bool)>;

    /// Open or close a slot. Booked count and version are left untouched.
    async fn set_slot_closed(&self, slot_id: SlotId, closed: bool) -> LedgerResult<Slot>;
}

// ── LedgerTx ────────────────────────────────────────────────────

#[async_trait]
pub trait LedgerTx: Send {
    /// Take the exclusive lock on a slot row for the rest of the transaction
    /// and return its current state. Fails with `LockTimeout` when the wait
    /// exceeds the configured bound.
    async fn lock_slot(&mut self, slot_id: SlotId) -> LedgerResult<Option<Slot>>;

    /// Persist a new booked count. `expected_version` is the version the
    /// caller read under lock.
    async fn write_slot_booked(
        &mut self,
        slot_id: SlotId,
        booked_count: i32,
        expected_version: i64,
    ) -> LedgerResult<()>;

    async fn reservation_by_code(&mut self, code: &str) -> LedgerResult<Option<Reservation>>;

    async fn confirmation_code_exists(&mut self, code: &str) -> LedgerResult<bool>;

    async fn change_by_key(&mut self, idempotency_key: &str)
        -> LedgerResult<Option<ReservationChange>>;

    async fn last_change_for(&mut self, reservation_id: ReservationId)
        -> LedgerResult<Option<ReservationChange>>;

    /// Insert or refresh the contact by phone number, returning its id.
    async fn upsert_customer(&mut self, contact: &Contact) -> LedgerResult<Uuid>;

    /// Fails with `DuplicateConfirmationCode` when the code is taken.
    async fn insert_reservation(&mut self, reservation: &Reservation) -> LedgerResult<()>;

    /// Fails with `StaleWrite` when the stored version is not `expected_version`.
    async fn update_reservation(
        &mut self,
        reservation: &Reservation,
        expected_version: i64,
    ) -> LedgerResult<()>;

    /// Fails with `DuplicateIdempotencyKey` when the key is taken.
    async fn insert_change(&mut self, change: NewChange) -> LedgerResult<ReservationChange>;

    async fn commit(self: Box<Self>) -> LedgerResult<()>;

    async fn rollback(self: Box<Self>) -> LedgerResult<()>;
}
