pub mod change;
pub mod repositories;
pub mod reservation;
pub mod slot;

// Re-export commonly used types
pub use change::{ChangeType, ChangedField, NewChange, ReservationChange};
pub use repositories::{LedgerStore, LedgerTx, SlotQuery};
pub use reservation::{
    Contact, Reservation, ReservationChanges, ReservationId, ReservationStatus, RoundType,
    SlotTarget,
};
pub use slot::{NewSlot, Slot, SlotId, Venue};

pub use crate::shared::errors::{LedgerError, LedgerResult};
