//! # Tee-time reservation ledger
//!
//! Book, modify and cancel golf tee-time reservations against fixed-capacity
//! slots, with idempotent writes and a hash-chained change history per
//! reservation.
//!
//! ## Architecture
//!
//! - **domain**: slots, reservations, change records and the storage traits
//! - **application**: the ledger, availability search and inventory seeding
//! - **infrastructure**: SeaORM (SQLite/PostgreSQL) and in-memory stores
//! - **interfaces**: REST tool API with Swagger documentation
//! - **server**: runtime bootstrap shared by the binaries

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;
pub mod server;
pub mod shared;

pub use config::{default_config_path, AppConfig};

// Re-export database types for easy access
pub use infrastructure::{init_database, DatabaseConfig, InMemoryLedgerStore, SeaOrmLedgerStore};

// Re-export API router
pub use interfaces::http::create_api_router;
