pub mod model;

pub use model::{ChangeType, ChangedField, NewChange, ReservationChange};
