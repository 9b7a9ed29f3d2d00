//! Database entities module

pub mod customer;
pub mod reservation;
pub mod reservation_change;
pub mod slot;
pub mod venue;

pub use customer::Entity as Customer;
pub use reservation::Entity as Reservation;
pub use reservation_change::Entity as ReservationChange;
pub use slot::Entity as Slot;
pub use venue::Entity as Venue;
