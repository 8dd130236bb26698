mod config;
mod monitoring;
mod notify;
mod pool;
mod store;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use crate::config::Config;
use crate::monitoring::executor::Executors;
use crate::monitoring::runner::CheckContext;
use crate::monitoring::throttle::NotificationThrottle;
use crate::monitoring::Scheduler;
use crate::notify::Dispatcher;
use crate::pool::LibsqlManager;
use crate::store::Store;

/// Endpoint health monitoring daemon.
#[derive(Parser, Debug)]
#[command(name = "vigil", version, about)]
struct Cli {
    /// Path to the config file (defaults to $XDG_CONFIG_HOME/vigil/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the database path from the config file
    #[arg(short, long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    logger::init_tracing();

    let cli = Cli::parse();
    let mut config = Config::from_config(cli.config.as_deref()).context("failed to load config")?;
    if let Some(database) = cli.database {
        config.database.path = database.to_string_lossy().into_owned();
    }
    info!("Using database at {}", config.database.path);

    let db = libsql::Builder::new_local(&config.database.path)
        .build()
        .await
        .context("failed to open database")?;
    let pool: crate::pool::LibsqlPool = deadpool::managed::Pool::builder(LibsqlManager::new(db))
        .build()
        .context("failed to build connection pool")?;

    {
        let conn = pool.get().await.context("failed to acquire a connection")?;
        store::migrations::run_migrations(&conn).await.context("failed to run migrations")?;
    }

    let store = Arc::new(Store::new(pool));
    store.ensure_active_profile().await?;

    let executors = Executors::new(config.checks.default_timeout_seconds)?;
    let scheduler = Scheduler::new(CheckContext {
        monitors: store.clone(),
        logs: store.clone(),
        credentials: store.clone(),
        methods: store.clone(),
        notifier: Arc::new(Dispatcher::new()),
        executors: Arc::new(executors),
        throttle: Arc::new(NotificationThrottle::new()),
    })
    .with_reconcile_interval(Duration::from_secs(
        config.scheduler.reconcile_interval_seconds.max(1),
    ));

    scheduler.start().await;

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received");
    scheduler.stop().await;

    Ok(())
}
