//! Operator entry point for the user store.
//!
//! # Responsibility
//! - Verify backend reachability without application code.
//! - Re-provision indexes on a live database without restarting services.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use userstore_core::config::{DATABASE_URL_VAR, LOG_LEVEL_VAR};
use userstore_core::{
    core_version, init_logging, Database, DocumentUserRepository, StoreConfig, UserService,
};

#[derive(Parser, Debug)]
#[command(name = "userstore", about = "Operate the user document store")]
struct Cli {
    /// Connection URL, e.g. `sqlite:///var/lib/userstore/users.db`.
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// trace|debug|info|warn|error
    #[arg(long, env = "USERSTORE_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect and run the liveness probe.
    Ping,
    /// Create missing indexes on the users collection.
    EnsureIndexes,
    /// Print one user, looked up by phone number.
    FindByPhone { phone: String },
    /// Print the core library version.
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Command::Version = cli.command {
        println!("userstore_core version={}", core_version());
        return Ok(());
    }

    let config = StoreConfig::from_lookup(|name| match name {
        DATABASE_URL_VAR => cli.database_url.clone(),
        LOG_LEVEL_VAR => cli.log_level.clone(),
        _ => std::env::var(name).ok(),
    })?;

    let log_dir = config
        .log_dir
        .as_ref()
        .map(|dir| dir.to_string_lossy().into_owned());
    init_logging(&config.log_level, log_dir.as_deref()).map_err(anyhow::Error::msg)?;

    let db = Arc::new(
        Database::connect(&config.database_url, config.db_options())
            .with_context(|| format!("connect to {}", config.database_url))?,
    );
    let service = UserService::new(DocumentUserRepository::new(Arc::clone(&db)));

    let outcome = run(&cli.command, &db, &service);
    db.close();
    outcome
}

fn run(
    command: &Command,
    db: &Database,
    service: &UserService<DocumentUserRepository>,
) -> Result<()> {
    match command {
        Command::Ping => {
            db.ping().context("ping database")?;
            println!("ok url={}", db.url());
        }
        Command::EnsureIndexes => {
            service.ensure_indexes().context("ensure indexes")?;
            println!("indexes ok");
        }
        Command::FindByPhone { phone } => {
            let user = service
                .find_user_by_phone(phone)
                .with_context(|| format!("find user by phone {phone}"))?;
            println!(
                "id={} phone={} first_name={} last_name={} picture={} created_at={} updated_at={}",
                user.id,
                user.phone,
                user.first_name,
                user.last_name,
                user.picture,
                user.created_at,
                user.updated_at
            );
        }
        Command::Version => println!("userstore_core version={}", core_version()),
    }
    log::info!("event=cli_command module=cli status=ok command={command:?}");
    Ok(())
}
