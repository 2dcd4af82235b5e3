//! Sync executor: turns one queue entry into provider calls.
//!
//! Replaying is safe: creates fall through to updates when an event id is
//! already stored, updates fall back to creates when the provider lost the
//! event, deletes of unknown events succeed as no-ops.

use std::fmt;
use std::time::Duration;
use tokio::time::sleep;

use crate::db::{self, Pool};
use crate::event::{build_event, ProviderEvent};
use crate::logger::{LogCategory, SyncLogger};
use crate::model::{ActionKind, BookingSnapshot, Credential};
use crate::provider::{CalendarService, SyncError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    Created(String),
    Updated(String),
    Deleted(String),
    NothingToDelete,
}

impl fmt::Display for ExecOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecOutcome::Created(id) => write!(f, "created event {id}"),
            ExecOutcome::Updated(id) => write!(f, "updated event {id}"),
            ExecOutcome::Deleted(id) => write!(f, "deleted event {id}"),
            ExecOutcome::NothingToDelete => write!(f, "no event to delete"),
        }
    }
}

pub async fn execute(
    pool: &Pool,
    provider: &dyn CalendarService,
    logger: &SyncLogger,
    action: ActionKind,
    booking_id: i64,
    credential: &Credential,
    delete_settle_delay: Duration,
) -> Result<ExecOutcome, SyncError> {
    match action {
        ActionKind::Delete => {
            delete(pool, provider, logger, booking_id, credential, delete_settle_delay).await
        }
        ActionKind::Create | ActionKind::Update => {
            upsert(pool, provider, logger, booking_id, credential).await
        }
    }
}

async fn delete(
    pool: &Pool,
    provider: &dyn CalendarService,
    logger: &SyncLogger,
    booking_id: i64,
    credential: &Credential,
    settle_delay: Duration,
) -> Result<ExecOutcome, SyncError> {
    let stored = db::stored_event_id(pool, booking_id)
        .await
        .map_err(SyncError::from)?;
    let Some(event_id) = stored else {
        logger.log(
            LogCategory::Info,
            format!("No provider event id stored for booking {booking_id}, nothing to delete"),
        );
        return Ok(ExecOutcome::NothingToDelete);
    };

    logger.operation("DELETE", booking_id, &format!("event_id: {event_id}"));
    match provider.delete_event(credential, &event_id).await {
        Ok(()) => {
            db::clear_event_id(pool, booking_id)
                .await
                .map_err(SyncError::from)?;
            logger.deletion(booking_id, &event_id, "Event deleted from provider calendar");
        }
        Err(err) if err.is_not_found() => {
            db::clear_event_id(pool, booking_id)
                .await
                .map_err(SyncError::from)?;
            logger.deletion(
                booking_id,
                &event_id,
                "Event was already removed from provider calendar",
            );
        }
        Err(err) => {
            logger.deletion(booking_id, &event_id, "Deletion failed");
            return Err(err);
        }
    }

    // Let the provider's own deletion propagation settle before a following
    // create or update touches the same calendar.
    sleep(settle_delay).await;
    Ok(ExecOutcome::Deleted(event_id))
}

async fn upsert(
    pool: &Pool,
    provider: &dyn CalendarService,
    logger: &SyncLogger,
    booking_id: i64,
    credential: &Credential,
) -> Result<ExecOutcome, SyncError> {
    let snapshot = db::booking_snapshot(pool, booking_id)
        .await
        .map_err(SyncError::from)?
        .ok_or_else(|| SyncError::Unknown(format!("booking {booking_id} not found")))?;

    logger.operation(
        "SYNC",
        booking_id,
        &format!(
            "client: {} | service: {} | start: {}",
            snapshot.client_name.as_deref().unwrap_or("N/A"),
            snapshot.service_name.as_deref().unwrap_or("N/A"),
            snapshot.starts_at,
        ),
    );

    let event = build_event(&snapshot);
    match snapshot.provider_event_id.clone() {
        Some(event_id) => match provider.update_event(credential, &event_id, &event).await {
            Ok(()) => {
                logger.success(format!(
                    "Updated provider event {event_id} for booking {booking_id}"
                ));
                Ok(ExecOutcome::Updated(event_id))
            }
            Err(err) if err.is_not_found() => {
                // The provider lost the event; drop the stale id and recreate.
                db::clear_event_id(pool, booking_id)
                    .await
                    .map_err(SyncError::from)?;
                create_new(pool, provider, logger, &snapshot, credential, &event).await
            }
            Err(err) => Err(err),
        },
        None => create_new(pool, provider, logger, &snapshot, credential, &event).await,
    }
}

async fn create_new(
    pool: &Pool,
    provider: &dyn CalendarService,
    logger: &SyncLogger,
    snapshot: &BookingSnapshot,
    credential: &Credential,
    event: &ProviderEvent,
) -> Result<ExecOutcome, SyncError> {
    let event_id = provider.create_event(credential, event).await?;
    db::store_event_id(pool, snapshot.booking_id, &event_id)
        .await
        .map_err(SyncError::from)?;
    logger.success(format!(
        "Created provider event {event_id} for booking {}",
        snapshot.booking_id
    ));
    Ok(ExecOutcome::Created(event_id))
}
