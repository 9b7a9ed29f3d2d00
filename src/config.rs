//! Application configuration
//!
//! Loaded from TOML (default `~/.config/teetime-ledger/config.toml`, or the
//! path in `TEETIME_CONFIG`). A few settings can be overridden from the
//! environment so secrets need not live in the file:
//!
//! | Variable                | Setting             |
//! |-------------------------|---------------------|
//! | `TEETIME_DATABASE_URL`  | `database.url`      |
//! | `TEETIME_API_KEY`       | `security.api_key`  |
//! | `TEETIME_READ_ONLY`     | `ledger.read_only`  |

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::application::{LedgerSettings, SearchSettings, SeedPlan};
use crate::infrastructure::DatabaseConfig;
use crate::shared::errors::ConfigError;

pub const CONFIG_ENV: &str = "TEETIME_CONFIG";
const DEFAULT_API_KEY: &str = "change-me";

/// Default config location under the user's config directory.
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("teetime-ledger")
        .join("config.toml")
}

/// `TEETIME_CONFIG` if set, otherwise [`default_config_path`].
pub fn resolve_config_path() -> PathBuf {
    std::env::var(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_config_path())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseSection,
    pub ledger: LedgerSection,
    pub search: SearchSettings,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
    pub seed: SeedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub api_host: String,
    pub api_port: u16,
    /// Seconds in-flight requests get once shutdown starts
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_host: "0.0.0.0".to_string(),
            api_port: 8080,
            shutdown_timeout: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    /// Full connection URL (`postgres://...` or `sqlite://...`). Wins over
    /// `sqlite_path` when set.
    pub url: Option<String>,
    pub sqlite_path: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub connect_attempts: u32,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: None,
            sqlite_path: "teetime.db".to_string(),
            max_connections: 10,
            acquire_timeout_secs: 5,
            connect_attempts: 5,
        }
    }
}

impl DatabaseSection {
    pub fn connection_url(&self) -> String {
        match &self.url {
            Some(url) if !url.trim().is_empty() => url.trim().to_string(),
            _ => format!("sqlite://{}?mode=rwc", self.sqlite_path),
        }
    }

    pub fn pool_config(&self) -> DatabaseConfig {
        DatabaseConfig {
            url: self.connection_url(),
            max_connections: self.max_connections,
            acquire_timeout_secs: self.acquire_timeout_secs,
            connect_attempts: self.connect_attempts,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSection {
    pub max_party_size: i32,
    pub confirmation_prefix: String,
    /// Attempts per mutation when a commit races another writer
    pub max_attempts: u32,
    /// How long a mutation waits for a slot lock
    pub lock_timeout_ms: u64,
    pub read_only: bool,
}

impl Default for LedgerSection {
    fn default() -> Self {
        let settings = LedgerSettings::default();
        Self {
            max_party_size: settings.max_party_size,
            confirmation_prefix: settings.confirmation_prefix,
            max_attempts: settings.max_attempts,
            lock_timeout_ms: 5_000,
            read_only: settings.read_only,
        }
    }
}

impl LedgerSection {
    pub fn settings(&self) -> LedgerSettings {
        LedgerSettings {
            max_party_size: self.max_party_size,
            confirmation_prefix: self.confirmation_prefix.clone(),
            max_attempts: self.max_attempts,
            read_only: self.read_only,
        }
    }

    pub fn lock_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.lock_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Bearer token expected on `/v1/*`
    pub api_key: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            api_key: DEFAULT_API_KEY.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// EnvFilter directive; `RUST_LOG` wins when set
    pub level: String,
    /// `text` or `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    /// Seed inventory every time the server starts
    pub on_startup: bool,
    #[serde(flatten)]
    pub plan: SeedPlan,
}

impl AppConfig {
    /// Read `path` and apply environment overrides. A missing file yields
    /// the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            toml::from_str::<AppConfig>(&raw)?
        } else {
            info!("No config at {}, using defaults", path.display());
            AppConfig::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("TEETIME_DATABASE_URL") {
            self.database.url = Some(url);
        }
        if let Some(key) = lookup("TEETIME_API_KEY") {
            self.security.api_key = key;
        }
        if let Some(flag) = lookup("TEETIME_READ_ONLY") {
            self.ledger.read_only = matches!(
                flag.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.security.api_key.trim().is_empty() {
            return invalid("security.api_key must not be empty".into());
        }
        if self.security.api_key == DEFAULT_API_KEY {
            warn!("security.api_key is the default value; set TEETIME_API_KEY");
        }
        if self.ledger.max_party_size < 1 {
            return invalid("ledger.max_party_size must be at least 1".into());
        }
        if self.ledger.max_attempts < 1 {
            return invalid("ledger.max_attempts must be at least 1".into());
        }
        if self.ledger.lock_timeout_ms == 0 {
            return invalid("ledger.lock_timeout_ms must be > 0".into());
        }
        let prefix = &self.ledger.confirmation_prefix;
        if prefix.is_empty()
            || prefix.len() > 8
            || !prefix.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        {
            return invalid(format!(
                "ledger.confirmation_prefix must be 1-8 of A-Z0-9, got '{prefix}'"
            ));
        }
        if self.search.max_results < 1 || self.search.default_results < 1 {
            return invalid("search.max_results and search.default_results must be >= 1".into());
        }
        if self.database.max_connections < 1 {
            return invalid("database.max_connections must be >= 1".into());
        }
        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return invalid(format!(
                "logging.format must be text or json, got '{}'",
                self.logging.format
            ));
        }
        self.seed
            .plan
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("seed: {e}")))
    }
}
