//! Tee-time ledger CLI server
//!
//! Headless reservation ledger suitable for deployment as a systemd
//! service, Docker container, or standalone process.
//!
//! ```sh
//! # Run with default config (~/.config/teetime-ledger/config.toml)
//! teetime-service
//!
//! # Custom config path
//! teetime-service --config /etc/teetime-ledger/config.toml
//!
//! # Seed the configured venue's tee sheet, then serve
//! teetime-service --seed
//!
//! # Validate config without starting
//! teetime-service --check
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use teetime_ledger::config::AppConfig;
use teetime_ledger::infrastructure::database::redact_url;
use teetime_ledger::server::{init_tracing, ServerHandle, ServerOptions};

/// Tee-time reservation ledger with an HTTP tool API.
#[derive(Parser, Debug)]
#[command(
    name = "teetime-service",
    version,
    about = "Tee-time reservation ledger",
    long_about = "REST tool API for searching, booking, modifying and cancelling \
                  golf tee times against fixed-capacity slots.\n\n\
                  Default config: ~/.config/teetime-ledger/config.toml"
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(short, long, env = "TEETIME_CONFIG")]
    config: Option<PathBuf>,

    /// Override the REST API listen port.
    #[arg(long)]
    api_port: Option<u16>,

    /// Override the database URL (postgres://... or sqlite://...).
    #[arg(long)]
    database_url: Option<String>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,

    /// Reject book, modify and cancel; reads keep working.
    #[arg(long)]
    read_only: bool,

    /// Seed inventory from the [seed] section before serving.
    #[arg(long)]
    seed: bool,

    /// Validate the configuration file and exit without starting the server.
    #[arg(long)]
    check: bool,

    /// Skip database migrations on startup.
    #[arg(long)]
    no_migrate: bool,

    /// Write the effective configuration to the config path and exit.
    #[arg(long)]
    write_config: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // ── Load configuration ─────────────────────────────────────
    let config_path = cli
        .config
        .unwrap_or_else(teetime_ledger::default_config_path);

    let mut config = match AppConfig::load(&config_path) {
        Ok(cfg) => {
            init_tracing(&cfg);
            info!("Configuration loaded from {}", config_path.display());
            cfg
        }
        Err(e) => {
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new("info"))
                .init();
            error!("Failed to load config from {}: {}", config_path.display(), e);
            error!("Using default configuration.");
            AppConfig::default()
        }
    };

    // ── Apply CLI overrides ────────────────────────────────────
    if let Some(port) = cli.api_port {
        info!("CLI override: api_port = {}", port);
        config.server.api_port = port;
    }
    if let Some(url) = cli.database_url {
        info!("CLI override: database_url = {}", redact_url(&url));
        config.database.url = Some(url);
    }
    if let Some(ref level) = cli.log_level {
        info!("CLI override: log_level = {}", level);
        config.logging.level = level.clone();
    }
    if cli.read_only {
        info!("CLI override: read_only = true");
        config.ledger.read_only = true;
    }

    if cli.write_config {
        config.save(&config_path)?;
        println!("Configuration written to {}", config_path.display());
        return Ok(());
    }

    // ── Config validation mode ─────────────────────────────────
    if cli.check {
        config.validate()?;
        println!("✅ Configuration is valid");
        println!("   Config file : {}", config_path.display());
        println!("   API address : {}:{}", config.server.api_host, config.server.api_port);
        println!("   Database    : {}", redact_url(&config.database.connection_url()));
        println!("   Read-only   : {}", config.ledger.read_only);
        println!("   Log level   : {}", config.logging.level);
        return Ok(());
    }

    // ── Start server ───────────────────────────────────────────
    let handle = ServerHandle::start(ServerOptions {
        config,
        auto_migrate: !cli.no_migrate,
        seed: cli.seed,
    })
    .await?;

    handle.install_signal_handler();

    info!("🚀 Press Ctrl+C to shutdown gracefully.");

    handle.shutdown_signal().wait().await;
    handle.wait().await;

    Ok(())
}
