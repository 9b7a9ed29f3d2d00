//! Reservation ledger: slot locking, idempotency, audit, and the mutations
//! that tie them together.

pub mod audit;
pub mod idempotency;
pub mod service;
pub mod slots;
pub mod unit_of_work;

#[cfg(test)]
mod tests;

pub use audit::{AuditEntry, AuditTrail};
pub use idempotency::{fingerprint, GuardDecision, IdempotencyGuard};
pub use service::{
    BookRequest, CancelRequest, ChangeQuote, LedgerSettings, ModifyRequest, MutationResult,
    Outcome, ReservationLedger,
};
pub use slots::SlotRepository;
pub use unit_of_work::UnitOfWork;
