//! One storage transaction plus the slot locks it holds.

use std::collections::BTreeMap;

use tracing::warn;

use crate::domain::{LedgerStore, LedgerTx, Slot, SlotId};
use crate::shared::errors::LedgerResult;

pub struct UnitOfWork {
    tx: Box<dyn LedgerTx>,
    locked: BTreeMap<SlotId, Slot>,
}

impl UnitOfWork {
    pub async fn begin(store: &dyn LedgerStore) -> LedgerResult<Self> {
        Ok(Self {
            tx: store.begin().await?,
            locked: BTreeMap::new(),
        })
    }

    pub fn tx(&mut self) -> &mut dyn LedgerTx {
        self.tx.as_mut()
    }

    /// Latest state of a slot locked by this unit of work.
    pub fn locked(&self, slot_id: SlotId) -> Option<&Slot> {
        self.locked.get(&slot_id)
    }

    pub fn holds(&self, slot_id: SlotId) -> bool {
        self.locked.contains_key(&slot_id)
    }

    pub(crate) fn remember(&mut self, slot: Slot) {
        self.locked.insert(slot.slot_id, slot);
    }

    pub async fn commit(self) -> LedgerResult<()> {
        self.tx.commit().await
    }

    /// Roll back, logging rather than surfacing a failed rollback: the
    /// transaction is discarded either way.
    pub async fn rollback(self) {
        if let Err(e) = self.tx.rollback().await {
            warn!(error = %e, "Rollback failed");
        }
    }
}
