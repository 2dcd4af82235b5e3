use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use calsync::config;
use calsync::db;
use calsync::logger::{LogCategory, SyncLogger};
use calsync::provider::CalendarClient;
use calsync::worker::{self, WorkerOptions};

/// Background worker syncing booking events to the external calendar provider.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Run one batch pass with console output
    #[arg(long)]
    manual: bool,

    /// Restrict processing to one specialist's entries
    #[arg(long)]
    specialist: Option<i64>,

    /// Echo log lines to stdout in addition to the log file
    #[arg(long)]
    verbose: bool,

    /// Run as a daemon polling for wake-up signals (near-real-time mode)
    #[arg(long)]
    signal_loop: bool,

    /// Run exactly one batch pass then exit. This is also the default
    /// behavior; the flag exists for the external scheduler's clarity.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let verbose = args.verbose || args.manual;
    let logger = Arc::new(SyncLogger::new(cfg.log_file(), verbose)?);
    logger.log(
        LogCategory::Startup,
        format!(
            "Calendar sync worker v{} starting",
            env!("CARGO_PKG_VERSION")
        ),
    );

    let pool = match db::init_pool(&cfg.database_url()).await {
        Ok(pool) => pool,
        Err(err) => {
            logger.error("WORKER_FATAL_ERROR", format!("{err:#}"));
            return Err(err);
        }
    };
    if let Err(err) = db::run_migrations(&pool).await {
        logger.error("WORKER_FATAL_ERROR", format!("{err:#}"));
        return Err(err);
    }

    let provider = CalendarClient::from_config(&cfg, logger.clone())?;
    let opts = WorkerOptions::from_config(&cfg, args.specialist);

    let result = if args.signal_loop {
        worker::run_signal_loop(&pool, &provider, &logger, &opts).await
    } else {
        info!(once = args.once, manual = args.manual, "running single batch pass");
        worker::run_batch(&pool, &provider, &logger, &opts).await
    };

    if let Err(err) = &result {
        logger.error("WORKER_FATAL_ERROR", format!("{err:#}"));
    }
    result
}
