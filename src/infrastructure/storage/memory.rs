//! In-memory ledger store for development and testing
//!
//! Slot locks are per-slot async mutexes held for the lifetime of a
//! transaction. Writes are staged in the transaction and applied at commit,
//! where idempotency keys and confirmation codes are checked for uniqueness
//! the same way a unique index would.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{
    Contact, LedgerStore, LedgerTx, NewChange, NewSlot, Reservation, ReservationChange,
    ReservationId, Slot, SlotId, SlotQuery, Venue,
};
use crate::shared::errors::{LedgerError, LedgerResult};

#[derive(Debug, Default)]
struct State {
    venues: HashMap<String, Venue>,
    slots: HashMap<SlotId, Slot>,
    /// phone → (customer_id, full_name)
    customers: HashMap<String, (Uuid, String)>,
    reservations: HashMap<ReservationId, Reservation>,
    codes: HashMap<String, ReservationId>,
    changes: Vec<ReservationChange>,
    keys: HashMap<String, usize>,
}

impl State {
    fn reservation_by_code(&self, code: &str) -> Option<Reservation> {
        self.codes
            .get(code)
            .and_then(|id| self.reservations.get(id))
            .cloned()
    }

    fn change_by_key(&self, key: &str) -> Option<ReservationChange> {
        self.keys.get(key).map(|i| self.changes[*i].clone())
    }

    fn changes_for(&self, reservation_id: ReservationId) -> Vec<ReservationChange> {
        let mut history: Vec<_> = self
            .changes
            .iter()
            .filter(|c| c.reservation_id == reservation_id)
            .cloned()
            .collect();
        history.sort_by_key(|c| c.seq);
        history
    }
}

struct Shared {
    state: RwLock<State>,
    slot_locks: DashMap<SlotId, Arc<Mutex<()>>>,
    next_seq: AtomicI64,
    lock_timeout: Duration,
}

impl Shared {
    fn slot_mutex(&self, slot_id: SlotId) -> Arc<Mutex<()>> {
        // Clone the Arc out so the shard lock is released before awaiting.
        self.slot_locks.entry(slot_id).or_default().clone()
    }

    async fn acquire(&self, slot_id: SlotId) -> LedgerResult<OwnedMutexGuard<()>> {
        let mutex = self.slot_mutex(slot_id);
        tokio::time::timeout(self.lock_timeout, mutex.lock_owned())
            .await
            .map_err(|_| {
                warn!(%slot_id, timeout_ms = self.lock_timeout.as_millis() as u64, "Slot lock wait timed out");
                LedgerError::LockTimeout(format!("slot {slot_id}"))
            })
    }
}

/// In-memory `LedgerStore`
#[derive(Clone)]
pub struct InMemoryLedgerStore {
    shared: Arc<Shared>,
}

impl InMemoryLedgerStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(State::default()),
                slot_locks: DashMap::new(),
                next_seq: AtomicI64::new(1),
                lock_timeout,
            }),
        }
    }

    /// Overwrite a stored change. Exists so tests can simulate tampering.
    #[cfg(test)]
    pub(crate) fn tamper_change(&self, seq: i64, f: impl FnOnce(&mut ReservationChange)) {
        let mut state = self.shared.state.write();
        if let Some(change) = state.changes.iter_mut().find(|c| c.seq == seq) {
            f(change);
        }
    }
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn ping(&self) -> LedgerResult<()> {
        Ok(())
    }

    async fn begin(&self) -> LedgerResult<Box<dyn LedgerTx>> {
        Ok(Box::new(MemoryTx::new(self.shared.clone())))
    }

    async fn venue(&self, venue_id: &str) -> LedgerResult<Option<Venue>> {
        Ok(self.shared.state.read().venues.get(venue_id).cloned())
    }

    async fn slot(&self, slot_id: SlotId) -> LedgerResult<Option<Slot>> {
        Ok(self.shared.state.read().slots.get(&slot_id).cloned())
    }

    async fn slot_at(
        &self,
        venue_id: &str,
        start_time: DateTime<Utc>,
    ) -> LedgerResult<Option<Slot>> {
        Ok(self
            .shared
            .state
            .read()
            .slots
            .values()
            .find(|s| s.venue_id == venue_id && s.start_time == start_time)
            .cloned())
    }

    async fn available_slots(&self, query: &SlotQuery) -> LedgerResult<Vec<Slot>> {
        let state = self.shared.state.read();
        let mut slots: Vec<Slot> = state
            .slots
            .values()
            .filter(|s| {
                s.venue_id == query.venue_id
                    && s.start_time >= query.from
                    && s.start_time <= query.to
                    && !s.closed
                    && s.remaining() >= query.min_party_size
            })
            .cloned()
            .collect();
        slots.sort_by_key(|s| (s.start_time, s.slot_id));
        slots.truncate(query.limit as usize);
        Ok(slots)
    }

    async fn reservation_by_code(&self, code: &str) -> LedgerResult<Option<Reservation>> {
        Ok(self.shared.state.read().reservation_by_code(code))
    }

    async fn change_by_key(&self, idempotency_key: &str) -> LedgerResult<Option<ReservationChange>> {
        Ok(self.shared.state.read().change_by_key(idempotency_key))
    }

    async fn changes_for(&self, reservation_id: ReservationId) -> LedgerResult<Vec<ReservationChange>> {
        Ok(self.shared.state.read().changes_for(reservation_id))
    }

    async fn upsert_venue(&self, venue: &Venue) -> LedgerResult<()> {
        self.shared
            .state
            .write()
            .venues
            .insert(venue.venue_id.clone(), venue.clone());
        Ok(())
    }

    async fn ensure_slot(&self, slot: &NewSlot) -> LedgerResult<(Slot, bool)> {
        let mut state = self.shared.state.write();
        if let Some(existing) = state
            .slots
            .values()
            .find(|s| s.venue_id == slot.venue_id && s.start_time == slot.start_time)
        {
            return Ok((existing.clone(), false));
        }
        let created = Slot::new(
            Uuid::new_v4(),
            slot.venue_id.clone(),
            slot.start_time,
            slot.capacity,
            0,
            false,
            slot.base_price_cents,
            slot.currency.clone(),
            1,
        )?;
        state.slots.insert(created.slot_id, created.clone());
        Ok((created, true))
    }

    async fn set_slot_closed(&self, slot_id: SlotId, closed: bool) -> LedgerResult<Slot> {
        let _guard = self.shared.acquire(slot_id).await?;
        let mut state = self.shared.state.write();
        let slot = state
            .slots
            .get_mut(&slot_id)
            .ok_or_else(|| LedgerError::not_found("Slot", "slot_id", slot_id))?;
        slot.closed = closed;
        Ok(slot.clone())
    }
}

// ── Transaction ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct SlotWrite {
    booked_count: i32,
    /// Version of the committed row when this tx first wrote it.
    base_version: i64,
    version: i64,
}

struct MemoryTx {
    shared: Arc<Shared>,
    guards: HashMap<SlotId, OwnedMutexGuard<()>>,
    slot_writes: HashMap<SlotId, SlotWrite>,
    customers: HashMap<String, (Uuid, String)>,
    inserted: Vec<Reservation>,
    updated: Vec<(Reservation, i64)>,
    changes: Vec<ReservationChange>,
}

impl MemoryTx {
    fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            guards: HashMap::new(),
            slot_writes: HashMap::new(),
            customers: HashMap::new(),
            inserted: Vec::new(),
            updated: Vec::new(),
            changes: Vec::new(),
        }
    }

    fn slot_view(&self, state: &State, slot_id: SlotId) -> Option<Slot> {
        let mut slot = state.slots.get(&slot_id).cloned()?;
        if let Some(write) = self.slot_writes.get(&slot_id) {
            slot.booked_count = write.booked_count;
            slot.version = write.version;
        }
        Some(slot)
    }

    fn staged_reservation(&self, code: &str) -> Option<Reservation> {
        self.updated
            .iter()
            .rev()
            .map(|(r, _)| r)
            .chain(self.inserted.iter())
            .find(|r| r.confirmation_code == code)
            .cloned()
    }

    /// Verify staged rows against committed state. Nothing is written.
    fn check_conflicts(&self, state: &State) -> LedgerResult<()> {
        for change in &self.changes {
            if state.keys.contains_key(&change.idempotency_key) {
                return Err(LedgerError::DuplicateIdempotencyKey(
                    change.idempotency_key.clone(),
                ));
            }
        }
        for r in &self.inserted {
            if state.codes.contains_key(&r.confirmation_code) {
                return Err(LedgerError::DuplicateConfirmationCode(
                    r.confirmation_code.clone(),
                ));
            }
        }
        for (r, expected) in &self.updated {
            let stored = state.reservations.get(&r.reservation_id);
            if stored.map(|s| s.version) != Some(*expected) {
                return Err(LedgerError::StaleWrite(format!(
                    "reservation {}",
                    r.confirmation_code
                )));
            }
        }
        for (slot_id, write) in &self.slot_writes {
            let stored = state.slots.get(slot_id);
            if stored.map(|s| s.version) != Some(write.base_version) {
                return Err(LedgerError::StaleWrite(format!("slot {slot_id}")));
            }
        }
        for (phone, (id, _)) in &self.customers {
            if let Some((existing, _)) = state.customers.get(phone) {
                if existing != id {
                    return Err(LedgerError::StaleWrite(format!("customer {phone}")));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn lock_slot(&mut self, slot_id: SlotId) -> LedgerResult<Option<Slot>> {
        if !self.guards.contains_key(&slot_id) {
            let exists = self.shared.state.read().slots.contains_key(&slot_id);
            if !exists {
                return Ok(None);
            }
            let guard = self.shared.acquire(slot_id).await?;
            self.guards.insert(slot_id, guard);
            debug!(%slot_id, "Slot locked");
        }
        let state = self.shared.state.read();
        Ok(self.slot_view(&state, slot_id))
    }

    async fn write_slot_booked(
        &mut self,
        slot_id: SlotId,
        booked_count: i32,
        expected_version: i64,
    ) -> LedgerResult<()> {
        if !self.guards.contains_key(&slot_id) {
            return Err(LedgerError::InvariantViolation(format!(
                "write to slot {slot_id} without holding its lock"
            )));
        }
        let current_version = {
            let state = self.shared.state.read();
            self.slot_view(&state, slot_id).map(|s| s.version)
        };
        if current_version != Some(expected_version) {
            return Err(LedgerError::StaleWrite(format!("slot {slot_id}")));
        }
        let base_version = self
            .slot_writes
            .get(&slot_id)
            .map(|w| w.base_version)
            .unwrap_or(expected_version);
        self.slot_writes.insert(
            slot_id,
            SlotWrite {
                booked_count,
                base_version,
                version: expected_version + 1,
            },
        );
        Ok(())
    }

    async fn reservation_by_code(&mut self, code: &str) -> LedgerResult<Option<Reservation>> {
        if let Some(r) = self.staged_reservation(code) {
            return Ok(Some(r));
        }
        Ok(self.shared.state.read().reservation_by_code(code))
    }

    async fn confirmation_code_exists(&mut self, code: &str) -> LedgerResult<bool> {
        if self.inserted.iter().any(|r| r.confirmation_code == code) {
            return Ok(true);
        }
        Ok(self.shared.state.read().codes.contains_key(code))
    }

    async fn change_by_key(&mut self, idempotency_key: &str) -> LedgerResult<Option<ReservationChange>> {
        if let Some(c) = self
            .changes
            .iter()
            .find(|c| c.idempotency_key == idempotency_key)
        {
            return Ok(Some(c.clone()));
        }
        Ok(self.shared.state.read().change_by_key(idempotency_key))
    }

    async fn last_change_for(&mut self, reservation_id: ReservationId) -> LedgerResult<Option<ReservationChange>> {
        if let Some(c) = self
            .changes
            .iter()
            .rev()
            .find(|c| c.reservation_id == reservation_id)
        {
            return Ok(Some(c.clone()));
        }
        Ok(self
            .shared
            .state
            .read()
            .changes_for(reservation_id)
            .pop())
    }

    async fn upsert_customer(&mut self, contact: &Contact) -> LedgerResult<Uuid> {
        let phone = contact.phone_e164.clone();
        let id = match self.customers.get(&phone) {
            Some((id, _)) => *id,
            None => self
                .shared
                .state
                .read()
                .customers
                .get(&phone)
                .map(|(id, _)| *id)
                .unwrap_or_else(Uuid::new_v4),
        };
        self.customers.insert(phone, (id, contact.name.clone()));
        Ok(id)
    }

    async fn insert_reservation(&mut self, reservation: &Reservation) -> LedgerResult<()> {
        if self.confirmation_code_exists(&reservation.confirmation_code).await? {
            return Err(LedgerError::DuplicateConfirmationCode(
                reservation.confirmation_code.clone(),
            ));
        }
        self.inserted.push(reservation.clone());
        Ok(())
    }

    async fn update_reservation(
        &mut self,
        reservation: &Reservation,
        expected_version: i64,
    ) -> LedgerResult<()> {
        let current = self
            .reservation_by_code(&reservation.confirmation_code)
            .await?
            .ok_or_else(|| {
                LedgerError::not_found("Reservation", "confirmation_code", &reservation.confirmation_code)
            })?;
        if current.version != expected_version {
            return Err(LedgerError::StaleWrite(format!(
                "reservation {}",
                reservation.confirmation_code
            )));
        }
        // Committed state is checked against the first version this tx saw.
        let committed_version = self
            .updated
            .iter()
            .find(|(r, _)| r.reservation_id == reservation.reservation_id)
            .map(|(_, v)| *v)
            .unwrap_or(expected_version);
        self.updated
            .retain(|(r, _)| r.reservation_id != reservation.reservation_id);
        if let Some(inserted) = self
            .inserted
            .iter_mut()
            .find(|r| r.reservation_id == reservation.reservation_id)
        {
            *inserted = reservation.clone();
        } else {
            self.updated.push((reservation.clone(), committed_version));
        }
        Ok(())
    }

    async fn insert_change(&mut self, change: NewChange) -> LedgerResult<ReservationChange> {
        if self.change_by_key(&change.idempotency_key).await?.is_some() {
            return Err(LedgerError::DuplicateIdempotencyKey(
                change.idempotency_key.clone(),
            ));
        }
        let seq = self.shared.next_seq.fetch_add(1, Ordering::SeqCst);
        let stored = ReservationChange::from_new(seq, change);
        self.changes.push(stored.clone());
        Ok(stored)
    }

    async fn commit(self: Box<Self>) -> LedgerResult<()> {
        let mut state = self.shared.state.write();
        self.check_conflicts(&state)?;

        for (slot_id, write) in &self.slot_writes {
            if let Some(slot) = state.slots.get_mut(slot_id) {
                slot.booked_count = write.booked_count;
                slot.version = write.version;
            }
        }
        for (phone, customer) in &self.customers {
            state.customers.insert(phone.clone(), customer.clone());
        }
        for r in &self.inserted {
            state.codes.insert(r.confirmation_code.clone(), r.reservation_id);
            state.reservations.insert(r.reservation_id, r.clone());
        }
        for (r, _) in &self.updated {
            state.reservations.insert(r.reservation_id, r.clone());
        }
        for change in &self.changes {
            let index = state.changes.len();
            state.keys.insert(change.idempotency_key.clone(), index);
            state.changes.push(change.clone());
        }
        drop(state);
        // Guards drop with self, releasing slot locks after the state is visible.
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> LedgerResult<()> {
        debug!(locks = self.guards.len(), "Transaction rolled back");
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChangeType;
    use crate::shared::time::now_utc;

    async fn store_with_slot(timeout: Duration) -> (InMemoryLedgerStore, Slot) {
        let store = InMemoryLedgerStore::new(timeout);
        let (slot, created) = store
            .ensure_slot(&NewSlot {
                venue_id: "0".into(),
                start_time: now_utc(),
                capacity: 4,
                base_price_cents: 10_000,
                currency: "USD".into(),
            })
            .await
            .unwrap();
        assert!(created);
        (store, slot)
    }

    fn change(reservation_id: ReservationId, key: &str) -> NewChange {
        NewChange {
            change_id: Uuid::new_v4(),
            reservation_id,
            change_type: ChangeType::Create,
            changed_fields: vec![],
            idempotency_key: key.into(),
            request_fingerprint: "fp".into(),
            call_id: None,
            before_state: None,
            after_state: "{}".into(),
            prev_hash: None,
            entry_hash: "h".into(),
            created_at: now_utc(),
        }
    }

    #[tokio::test]
    async fn ensure_slot_is_keyed_by_venue_and_start() {
        let (store, slot) = store_with_slot(Duration::from_secs(1)).await;
        let (again, created) = store
            .ensure_slot(&NewSlot {
                venue_id: "0".into(),
                start_time: slot.start_time,
                capacity: 2,
                base_price_cents: 1,
                currency: "USD".into(),
            })
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(again.slot_id, slot.slot_id);
        assert_eq!(again.capacity, 4);
    }

    #[tokio::test]
    async fn second_locker_times_out() {
        let (store, slot) = store_with_slot(Duration::from_millis(50)).await;
        let mut first = store.begin().await.unwrap();
        assert!(first.lock_slot(slot.slot_id).await.unwrap().is_some());

        let mut second = store.begin().await.unwrap();
        let err = second.lock_slot(slot.slot_id).await.unwrap_err();
        assert!(matches!(err, LedgerError::LockTimeout(_)));

        first.rollback().await.unwrap();
        assert!(second.lock_slot(slot.slot_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn lock_is_reentrant_within_a_transaction() {
        let (store, slot) = store_with_slot(Duration::from_millis(50)).await;
        let mut tx = store.begin().await.unwrap();
        tx.lock_slot(slot.slot_id).await.unwrap();
        assert!(tx.lock_slot(slot.slot_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn rollback_discards_staged_writes() {
        let (store, slot) = store_with_slot(Duration::from_secs(1)).await;
        let mut tx = store.begin().await.unwrap();
        let locked = tx.lock_slot(slot.slot_id).await.unwrap().unwrap();
        tx.write_slot_booked(slot.slot_id, 3, locked.version)
            .await
            .unwrap();
        assert_eq!(
            tx.lock_slot(slot.slot_id).await.unwrap().unwrap().booked_count,
            3
        );
        tx.rollback().await.unwrap();

        assert_eq!(store.slot(slot.slot_id).await.unwrap().unwrap().booked_count, 0);
    }

    #[tokio::test]
    async fn commit_applies_slot_write_and_bumps_version() {
        let (store, slot) = store_with_slot(Duration::from_secs(1)).await;
        let mut tx = store.begin().await.unwrap();
        let locked = tx.lock_slot(slot.slot_id).await.unwrap().unwrap();
        tx.write_slot_booked(slot.slot_id, 2, locked.version)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let stored = store.slot(slot.slot_id).await.unwrap().unwrap();
        assert_eq!(stored.booked_count, 2);
        assert_eq!(stored.version, slot.version + 1);
    }

    #[tokio::test]
    async fn write_without_lock_is_rejected() {
        let (store, slot) = store_with_slot(Duration::from_secs(1)).await;
        let mut tx = store.begin().await.unwrap();
        let err = tx
            .write_slot_booked(slot.slot_id, 1, slot.version)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvariantViolation(_)));
    }

    #[tokio::test]
    async fn duplicate_key_is_detected_at_commit() {
        let store = InMemoryLedgerStore::default();
        let rid = Uuid::new_v4();

        let mut a = store.begin().await.unwrap();
        let mut b = store.begin().await.unwrap();
        a.insert_change(change(rid, "k1")).await.unwrap();
        b.insert_change(change(rid, "k1")).await.unwrap();

        a.commit().await.unwrap();
        let err = b.commit().await.unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateIdempotencyKey(_)));
        assert_eq!(store.changes_for(rid).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_key_is_detected_at_insert_once_committed() {
        let store = InMemoryLedgerStore::default();
        let rid = Uuid::new_v4();
        let mut a = store.begin().await.unwrap();
        a.insert_change(change(rid, "k1")).await.unwrap();
        a.commit().await.unwrap();

        let mut b = store.begin().await.unwrap();
        let err = b.insert_change(change(rid, "k1")).await.unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateIdempotencyKey(_)));
    }

    #[tokio::test]
    async fn available_slots_filters_closed_and_full() {
        let (store, slot) = store_with_slot(Duration::from_secs(1)).await;
        let query = SlotQuery {
            venue_id: "0".into(),
            from: slot.start_time - chrono::Duration::hours(1),
            to: slot.start_time + chrono::Duration::hours(1),
            min_party_size: 4,
            limit: 10,
        };
        assert_eq!(store.available_slots(&query).await.unwrap().len(), 1);

        store.set_slot_closed(slot.slot_id, true).await.unwrap();
        assert!(store.available_slots(&query).await.unwrap().is_empty());
    }
}
