pub mod entities;
pub mod ledger_store;
pub mod migrator;

pub use ledger_store::SeaOrmLedgerStore;

use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use tracing::info;

use crate::shared::retry::{retry_with_backoff, RetryConfig};
use migrator::Migrator;

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://./teetime.db?mode=rwc")
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    /// Connection attempts before giving up at startup
    pub connect_attempts: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./teetime.db?mode=rwc".to_string(),
            max_connections: 10,
            acquire_timeout_secs: 5,
            connect_attempts: 5,
        }
    }
}

impl DatabaseConfig {
    /// Create config for SQLite
    pub fn sqlite(path: &str) -> Self {
        Self {
            url: format!("sqlite://{}?mode=rwc", path),
            ..Self::default()
        }
    }

    fn connect_options(&self) -> ConnectOptions {
        let mut options = ConnectOptions::new(self.url.clone());
        options
            .max_connections(self.max_connections.max(1))
            .acquire_timeout(Duration::from_secs(self.acquire_timeout_secs.max(1)))
            .sqlx_logging(false);
        options
    }
}

/// Connect (retrying while the server comes up) and optionally migrate.
pub async fn init_database(config: &DatabaseConfig, migrate: bool) -> Result<DatabaseConnection, DbErr> {
    info!("Connecting to database: {}", redact_url(&config.url));
    let db = retry_with_backoff(
        RetryConfig::with_attempts(config.connect_attempts),
        || Database::connect(config.connect_options()),
        |e| matches!(e, DbErr::Conn(_) | DbErr::ConnectionAcquire(_)),
        "database_connect",
    )
    .await?;
    info!("Database connected successfully");

    if migrate {
        info!("Running database migrations...");
        Migrator::up(&db, None).await?;
        info!("Migrations completed");
    }
    Ok(db)
}

/// Hide the password part of a connection URL.
pub fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    match rest.split_once('@') {
        Some((credentials, host)) => {
            let user = credentials.split(':').next().unwrap_or_default();
            format!("{scheme}://{user}:***@{host}")
        }
        None => url.to_string(),
    }
}
