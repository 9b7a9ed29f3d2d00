//! Locked access to slot rows

use std::sync::Arc;

use tracing::debug;

use super::unit_of_work::UnitOfWork;
use crate::domain::{LedgerStore, Slot, SlotId, SlotQuery};
use crate::shared::errors::{LedgerError, LedgerResult};

#[derive(Clone)]
pub struct SlotRepository {
    store: Arc<dyn LedgerStore>,
}

impl SlotRepository {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Exclusive lock on one slot for the rest of the unit of work.
    pub async fn lock_slot(&self, uow: &mut UnitOfWork, slot_id: SlotId) -> LedgerResult<Slot> {
        if let Some(slot) = uow.locked(slot_id) {
            return Ok(slot.clone());
        }
        let slot = uow
            .tx()
            .lock_slot(slot_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Slot", "slot_id", slot_id))?;
        slot.check_invariants()?;
        debug!(%slot_id, booked = slot.booked_count, capacity = slot.capacity, "Slot locked");
        uow.remember(slot.clone());
        Ok(slot)
    }

    /// Lock several slots in ascending id order. Duplicates are locked once.
    pub async fn lock_slots(&self, uow: &mut UnitOfWork, slot_ids: &[SlotId]) -> LedgerResult<Vec<Slot>> {
        let mut ids = slot_ids.to_vec();
        ids.sort();
        ids.dedup();

        let mut slots = Vec::with_capacity(ids.len());
        for id in ids {
            slots.push(self.lock_slot(uow, id).await?);
        }
        Ok(slots)
    }

    /// Add `party_delta` to the booked count of a slot this unit of work has
    /// locked.
    pub async fn apply_delta(
        &self,
        uow: &mut UnitOfWork,
        slot_id: SlotId,
        party_delta: i32,
    ) -> LedgerResult<Slot> {
        let current = uow.locked(slot_id).cloned().ok_or_else(|| {
            LedgerError::InvariantViolation(format!(
                "apply_delta on slot {slot_id} without holding its lock"
            ))
        })?;
        let updated = current.with_delta(party_delta)?;
        uow.tx()
            .write_slot_booked(slot_id, updated.booked_count, current.version)
            .await?;
        uow.remember(updated.clone());
        Ok(updated)
    }

    pub async fn find_available(&self, query: &SlotQuery) -> LedgerResult<Vec<Slot>> {
        if query.limit == 0 || query.from > query.to {
            return Ok(Vec::new());
        }
        self.store.available_slots(query).await
    }
}
