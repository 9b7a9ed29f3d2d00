pub mod inventory;
pub mod ledger;
pub mod search;

// Re-export key types for convenience
pub use inventory::{InventoryService, SeedPlan, SeedReport};
pub use ledger::{
    AuditTrail, BookRequest, CancelRequest, ChangeQuote, LedgerSettings, ModifyRequest,
    MutationResult, Outcome, ReservationLedger,
};
pub use search::{
    AvailabilitySearch, CapacityCheck, SearchQuery, SearchResult, SearchSettings, TeeTimeOption,
    TimeWindow,
};
