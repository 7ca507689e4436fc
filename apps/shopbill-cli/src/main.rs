//! # shopbill CLI
//!
//! Command-line front end over the session and REST layers.
//!
//! ## Startup
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Tracing (RUST_LOG, default info,shopbill=debug,sqlx=warn)           │
//! │  2. ClientConfig::load (defaults → shopbill.toml → SHOPBILL_* env)      │
//! │  3. Store::open(<data dir>/shopbill.db)                                 │
//! │  4. SessionManager::initialize() (skipped for login/register)           │
//! │  5. Run the subcommand                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod cli;
mod commands;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use shopbill_client::{ApiClient, ClientConfig, SessionManager, ShopApi};
use shopbill_store::{Store, StoreConfig};

use crate::cli::{day_range, resolve_password, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = ClientConfig::load(cli.config.clone()).context("Failed to load configuration")?;
    let data_dir = config.data_dir();
    debug!(base_url = %config.api.base_url, ?data_dir, "Configuration loaded");

    let store = Store::open(StoreConfig::in_dir(&data_dir))
        .await
        .context("Failed to open device storage")?;

    let api = Arc::new(ApiClient::new(&config.api)?);
    let session = Arc::new(SessionManager::new(Arc::new(store.kv()), api.clone()));
    let shop = ShopApi::new(api, session.clone());

    if cli.command.needs_session() {
        session.initialize().await;
        let flags = session.flags();
        info!(phase = %flags.phase, authenticated = flags.is_authenticated, "Session checked");
    }

    let result = match cli.command {
        Commands::Status => commands::status(&session, &store).await,
        Commands::Login { email, password } => match password_from_env_or_stdin(password) {
            Ok(password) => commands::login(&session, email, password).await,
            Err(e) => Err(e),
        },
        Commands::Register(mut args) => match password_from_env_or_stdin(args.password.take()) {
            Ok(password) => commands::register(&session, args, password).await,
            Err(e) => Err(e),
        },
        Commands::Logout => commands::logout(&session).await,
        Commands::Bills(args) => commands::bills(&shop, args, cli.json).await,
        Commands::Transactions(args) => commands::transactions(&shop, args, cli.json).await,
        Commands::Summary { top, from, to, daily } => {
            commands::summary(&shop, top, day_range(from, to), daily, cli.json).await
        }
        Commands::Reminders { min_age_days, send } => {
            let min_age_days = min_age_days.unwrap_or(config.reminders.min_age_days);
            commands::reminders(&shop, min_age_days, send, cli.json).await
        }
    };

    store.close().await;
    result
}

fn password_from_env_or_stdin(flag: Option<String>) -> Result<String> {
    resolve_password(flag, |key| std::env::var(key).ok(), std::io::stdin().lock())
}

/// Initializes the tracing subscriber; `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose {
        "debug,sqlx=warn"
    } else {
        "info,shopbill=debug,sqlx=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
