//! Worker loop: drains the sync queue and consumes wake-up signals.
//!
//! Two invocation modes share one drain pass. Batch mode runs a single pass
//! and exits; it is the reliability backstop behind an external scheduler.
//! The signal loop polls the signal store every few seconds and drains on
//! demand, giving near-real-time latency. Correctness never depends on
//! signals arriving.

use anyhow::Result;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, instrument};

use crate::config::Config;
use crate::credentials;
use crate::db::{self, Pool};
use crate::executor;
use crate::executor::ExecOutcome;
use crate::logger::{LogCategory, SyncLogger};
use crate::model::SyncQueueEntry;
use crate::provider::{CalendarService, SyncError};

/// Tunables for one worker instance. Defaults mirror production pacing;
/// tests shrink the delays.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub specialist: Option<i64>,
    pub batch_limit: i64,
    pub max_attempts: i64,
    pub signal_poll_interval: Duration,
    /// Pacing between items, applied regardless of outcome.
    pub item_delay: Duration,
    /// Extra sleep after a rate-limited failure.
    pub rate_limit_backoff: Duration,
    /// Settle delay after provider deletions.
    pub delete_settle_delay: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            specialist: None,
            batch_limit: 50,
            max_attempts: 5,
            signal_poll_interval: Duration::from_secs(4),
            item_delay: Duration::from_millis(100),
            rate_limit_backoff: Duration::from_secs(2),
            delete_settle_delay: Duration::from_millis(500),
        }
    }
}

impl WorkerOptions {
    pub fn from_config(cfg: &Config, specialist: Option<i64>) -> Self {
        Self {
            specialist,
            batch_limit: cfg.app.batch_limit,
            max_attempts: cfg.app.max_attempts,
            signal_poll_interval: Duration::from_secs(cfg.app.signal_poll_secs),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// One full drain pass over the eligible queue entries, FIFO.
#[instrument(skip_all)]
pub async fn process_queue(
    pool: &Pool,
    provider: &dyn CalendarService,
    logger: &SyncLogger,
    opts: &WorkerOptions,
) -> Result<PassStats> {
    let entries = db::claim_batch(pool, opts.specialist, opts.max_attempts, opts.batch_limit).await?;
    let mut stats = PassStats::default();
    if entries.is_empty() {
        return Ok(stats);
    }
    logger.log(
        LogCategory::Queue,
        format!("Processing {} queue entries", entries.len()),
    );

    for entry in entries {
        if !db::try_claim(pool, entry.id, opts.max_attempts).await? {
            // No longer eligible: another instance claimed it, or its state
            // changed since selection.
            continue;
        }
        stats.processed += 1;
        let attempt = entry.attempts + 1;
        logger.log(
            LogCategory::Info,
            format!(
                "Processing entry {}: {} booking {} for specialist {} (attempt {attempt})",
                entry.id,
                entry.action.as_str(),
                entry.booking_id,
                entry.specialist_id
            ),
        );

        match process_entry(pool, provider, logger, &entry, opts).await {
            Ok(outcome) => {
                db::mark_done(pool, entry.id).await?;
                stats.succeeded += 1;
                logger.success(format!(
                    "Entry {} processed successfully: {outcome}",
                    entry.id
                ));
            }
            Err(err) => {
                stats.failed += 1;
                record_failure(pool, logger, &entry, attempt, &err, opts).await?;
            }
        }

        sleep(opts.item_delay).await;
    }
    Ok(stats)
}

async fn process_entry(
    pool: &Pool,
    provider: &dyn CalendarService,
    logger: &SyncLogger,
    entry: &SyncQueueEntry,
    opts: &WorkerOptions,
) -> Result<ExecOutcome, SyncError> {
    let credential = credentials::resolve(pool, provider, logger, entry.specialist_id).await?;
    let owner = credential
        .specialist_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "global".to_string());
    logger.log(
        LogCategory::Info,
        format!("Using calendar credentials for specialist {owner}"),
    );
    executor::execute(
        pool,
        provider,
        logger,
        entry.action,
        entry.booking_id,
        &credential,
        opts.delete_settle_delay,
    )
    .await
}

/// Retryable failures keep the entry eligible with an attempt-annotated
/// error; at the ceiling the entry becomes terminal. Rate-limited failures
/// cost an extra sleep before the next item.
async fn record_failure(
    pool: &Pool,
    logger: &SyncLogger,
    entry: &SyncQueueEntry,
    attempt: i64,
    err: &SyncError,
    opts: &WorkerOptions,
) -> Result<()> {
    if attempt >= opts.max_attempts {
        db::mark_permanently_failed(pool, entry.id, &format!("Final attempt failed: {err}")).await?;
        logger.error(
            "QUEUE_ENTRY",
            format!(
                "Entry {} permanently failed after {attempt} attempts: {err}",
                entry.id
            ),
        );
        return Ok(());
    }

    let summary = match err {
        SyncError::NoCredentials { .. } => "No active credentials",
        _ => "Provider sync failed",
    };
    db::mark_failed(
        pool,
        entry.id,
        summary,
        &format!("Attempt {attempt} of {}: {err}", opts.max_attempts),
    )
    .await?;
    logger.error(
        "QUEUE_ENTRY",
        format!(
            "Entry {} failed (attempt {attempt}/{}), will retry: {err}",
            entry.id, opts.max_attempts
        ),
    );

    if err.is_rate_limited() {
        logger.log(LogCategory::Info, "Rate limit detected, adding extra delay");
        sleep(opts.rate_limit_backoff).await;
    }
    Ok(())
}

/// Drain the queue if any signals are pending, then consume exactly the
/// signals observed before the drain and purge old processed ones. Returns
/// how many signals were consumed.
#[instrument(skip_all)]
pub async fn check_and_process_signals(
    pool: &Pool,
    provider: &dyn CalendarService,
    logger: &SyncLogger,
    opts: &WorkerOptions,
) -> Result<usize> {
    let signal_ids = db::pending_signal_ids(pool, opts.specialist).await?;
    if signal_ids.is_empty() {
        return Ok(0);
    }
    logger.log(
        LogCategory::Queue,
        format!(
            "Found {} unprocessed signals - triggering immediate queue drain",
            signal_ids.len()
        ),
    );

    process_queue(pool, provider, logger, opts).await?;

    db::consume_signals(pool, &signal_ids).await?;
    let purged = db::purge_old_signals(pool).await?;
    if purged > 0 {
        logger.log(
            LogCategory::Info,
            format!("Purged {purged} processed signals older than 24 hours"),
        );
    }
    Ok(signal_ids.len())
}

/// One batch pass: signals first, plain drain as the fallback.
#[instrument(skip_all)]
pub async fn run_batch(
    pool: &Pool,
    provider: &dyn CalendarService,
    logger: &SyncLogger,
    opts: &WorkerOptions,
) -> Result<()> {
    let consumed = check_and_process_signals(pool, provider, logger, opts).await?;
    if consumed > 0 {
        logger.log(
            LogCategory::Queue,
            format!("Processed {consumed} signals, queue drained"),
        );
        return Ok(());
    }

    let stats = process_queue(pool, provider, logger, opts).await?;
    if stats.processed == 0 {
        logger.log(LogCategory::Info, "No queue entries to process");
    } else {
        logger.log(
            LogCategory::Info,
            format!(
                "Pass complete: {} processed, {} succeeded, {} failed",
                stats.processed, stats.succeeded, stats.failed
            ),
        );
    }
    Ok(())
}

/// Daemon mode: poll the signal store until ctrl-c. Signal-check errors are
/// logged and the loop keeps polling; only startup errors are fatal.
#[instrument(skip_all)]
pub async fn run_signal_loop(
    pool: &Pool,
    provider: &dyn CalendarService,
    logger: &SyncLogger,
    opts: &WorkerOptions,
) -> Result<()> {
    logger.log(
        LogCategory::Startup,
        "Starting signal monitoring loop (near-real-time mode)",
    );
    let mut ticker = tokio::time::interval(opts.signal_poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match check_and_process_signals(pool, provider, logger, opts).await {
                    Ok(0) => {}
                    Ok(n) => logger.log(
                        LogCategory::Queue,
                        format!("Processed {n} signals, queue drained"),
                    ),
                    Err(err) => {
                        error!(?err, "signal check failed");
                        logger.error("SIGNAL_CHECK", format!("{err:#}"));
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                logger.log(LogCategory::Info, "Shutdown requested, stopping signal loop");
                break;
            }
        }
    }
    Ok(())
}
