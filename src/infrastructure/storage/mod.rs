//! Ledger store implementations that live in process memory

mod memory;

pub use memory::InMemoryLedgerStore;
