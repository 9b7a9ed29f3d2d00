//! Slot aggregate
//!
//! Tee-time inventory: venues and their bookable slots.

pub mod model;

pub use model::{NewSlot, Slot, SlotId, Venue};
