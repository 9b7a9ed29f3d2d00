//! Reservation aggregate
//!
//! Contains the Reservation entity, related types, and the confirmation code
//! generator.

pub mod changes;
pub mod confirmation;
pub mod model;

pub use changes::{ReservationChanges, SlotTarget};
pub use confirmation::{normalize_code, ConfirmationCodeGenerator};
pub use model::{
    validate_holes, validate_party_size, Contact, Reservation, ReservationId,
    ReservationStatus, RoundType,
};
