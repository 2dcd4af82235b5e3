use crate::model::{
    ActionKind, BookingSnapshot, Credential, CredentialStatus, QueueStatus, SyncQueueEntry,
};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::instrument;

use super::Pool;

const ENTRY_COLUMNS: &str = "id, booking_id, specialist_id, action, status, attempts, \
     error_message, last_error, created_at, processed_at";

fn entry_from_row(row: &SqliteRow) -> Result<SyncQueueEntry> {
    let action: String = row.get("action");
    let status: String = row.get("status");
    Ok(SyncQueueEntry {
        id: row.get("id"),
        booking_id: row.get("booking_id"),
        specialist_id: row.get("specialist_id"),
        action: ActionKind::parse(&action)
            .ok_or_else(|| anyhow!("unknown queue action '{action}'"))?,
        status: QueueStatus::parse(&status)
            .ok_or_else(|| anyhow!("unknown queue status '{status}'"))?,
        attempts: row.get("attempts"),
        error_message: row.get("error_message"),
        last_error: row.get("last_error"),
        created_at: row.get("created_at"),
        processed_at: row.get("processed_at"),
    })
}

fn credential_from_row(row: &SqliteRow) -> Result<Credential> {
    let status: String = row.get("status");
    Ok(Credential {
        id: row.get("id"),
        specialist_id: row.get("specialist_id"),
        calendar_id: row.get("calendar_id"),
        access_token: row.get("access_token"),
        refresh_token: row.get("refresh_token"),
        expires_at: row.get("expires_at"),
        status: CredentialStatus::parse(&status)
            .ok_or_else(|| anyhow!("unknown credential status '{status}'"))?,
    })
}

// ---------------------------------------------------------------------------
// Queue store
// ---------------------------------------------------------------------------

/// Insert a new sync operation. Called by whatever mutates a booking.
#[instrument(skip_all)]
pub async fn enqueue_sync(
    pool: &Pool,
    booking_id: i64,
    specialist_id: i64,
    action: ActionKind,
) -> Result<i64> {
    let rec = sqlx::query(
        "INSERT INTO sync_queue (booking_id, specialist_id, action) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(booking_id)
    .bind(specialist_id)
    .bind(action.as_str())
    .fetch_one(pool)
    .await?;
    Ok(rec.get("id"))
}

/// Select eligible entries in FIFO order: `pending`, or `failed` with fewer
/// than `max_attempts` attempts. Does not change their state; claiming is a
/// separate guarded step.
#[instrument(skip_all)]
pub async fn claim_batch(
    pool: &Pool,
    specialist: Option<i64>,
    max_attempts: i64,
    limit: i64,
) -> Result<Vec<SyncQueueEntry>> {
    let rows = match specialist {
        Some(sid) => {
            let sql = format!(
                "SELECT {ENTRY_COLUMNS} FROM sync_queue \
                 WHERE (status = 'pending' OR (status = 'failed' AND attempts < ?)) \
                 AND specialist_id = ? \
                 ORDER BY created_at ASC, id ASC LIMIT ?"
            );
            sqlx::query(&sql)
                .bind(max_attempts)
                .bind(sid)
                .bind(limit)
                .fetch_all(pool)
                .await?
        }
        None => {
            let sql = format!(
                "SELECT {ENTRY_COLUMNS} FROM sync_queue \
                 WHERE (status = 'pending' OR (status = 'failed' AND attempts < ?)) \
                 ORDER BY created_at ASC, id ASC LIMIT ?"
            );
            sqlx::query(&sql)
                .bind(max_attempts)
                .bind(limit)
                .fetch_all(pool)
                .await?
        }
    };
    rows.iter().map(entry_from_row).collect()
}

/// Guarded claim: flips an eligible entry to `processing` and increments its
/// attempt counter in one conditional update. Returns false if the entry was
/// no longer eligible (e.g. already claimed elsewhere).
#[instrument(skip_all)]
pub async fn try_claim(pool: &Pool, id: i64, max_attempts: i64) -> Result<bool> {
    let res = sqlx::query(
        "UPDATE sync_queue \
         SET status = 'processing', attempts = attempts + 1, processed_at = ? \
         WHERE id = ? AND (status = 'pending' OR (status = 'failed' AND attempts < ?))",
    )
    .bind(Utc::now())
    .bind(id)
    .bind(max_attempts)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() == 1)
}

#[instrument(skip_all)]
pub async fn mark_done(pool: &Pool, id: i64) -> Result<()> {
    sqlx::query("UPDATE sync_queue SET status = 'done', processed_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn mark_failed(pool: &Pool, id: i64, summary: &str, detail: &str) -> Result<()> {
    sqlx::query(
        "UPDATE sync_queue \
         SET status = 'failed', error_message = ?, last_error = ?, processed_at = ? \
         WHERE id = ?",
    )
    .bind(summary)
    .bind(detail)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn mark_permanently_failed(pool: &Pool, id: i64, detail: &str) -> Result<()> {
    sqlx::query(
        "UPDATE sync_queue \
         SET status = 'permanently_failed', error_message = 'Max retries exceeded', \
             last_error = ?, processed_at = ? \
         WHERE id = ?",
    )
    .bind(detail)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Reload one entry. Mostly useful for assertions and diagnostics.
#[instrument(skip_all)]
pub async fn get_entry(pool: &Pool, id: i64) -> Result<Option<SyncQueueEntry>> {
    let sql = format!("SELECT {ENTRY_COLUMNS} FROM sync_queue WHERE id = ?");
    let row = sqlx::query(&sql).bind(id).fetch_optional(pool).await?;
    row.as_ref().map(entry_from_row).transpose()
}

// ---------------------------------------------------------------------------
// Signal store
// ---------------------------------------------------------------------------

/// Insert a wake-up marker. Called by the enqueuer alongside a queue entry.
#[instrument(skip_all)]
pub async fn raise_signal(pool: &Pool, specialist: Option<i64>) -> Result<i64> {
    let rec = sqlx::query("INSERT INTO worker_signals (specialist_id) VALUES (?) RETURNING id")
        .bind(specialist)
        .fetch_one(pool)
        .await?;
    Ok(rec.get("id"))
}

/// Ids of unprocessed signals, optionally restricted to one specialist.
#[instrument(skip_all)]
pub async fn pending_signal_ids(pool: &Pool, specialist: Option<i64>) -> Result<Vec<i64>> {
    let ids = match specialist {
        Some(sid) => {
            sqlx::query_scalar::<_, i64>(
                "SELECT id FROM worker_signals WHERE processed = 0 AND specialist_id = ? ORDER BY id",
            )
            .bind(sid)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_scalar::<_, i64>(
                "SELECT id FROM worker_signals WHERE processed = 0 ORDER BY id",
            )
            .fetch_all(pool)
            .await?
        }
    };
    Ok(ids)
}

/// Mark exactly the given signals processed. Signals raised after the id set
/// was captured stay pending for the next pass.
#[instrument(skip_all)]
pub async fn consume_signals(pool: &Pool, ids: &[i64]) -> Result<()> {
    let mut tx = pool.begin().await?;
    let now = Utc::now();
    for id in ids {
        sqlx::query(
            "UPDATE worker_signals SET processed = 1, processed_at = ? WHERE id = ? AND processed = 0",
        )
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Delete processed signals older than 24 hours. Returns how many went away.
#[instrument(skip_all)]
pub async fn purge_old_signals(pool: &Pool) -> Result<u64> {
    let res = sqlx::query(
        "DELETE FROM worker_signals \
         WHERE processed = 1 AND datetime(created_at) < datetime('now', '-24 hours')",
    )
    .execute(pool)
    .await?;
    Ok(res.rows_affected())
}

// ---------------------------------------------------------------------------
// Credential store
// ---------------------------------------------------------------------------

/// Active credential bound to the specialist, else the most recently created
/// active credential with no bound specialist (global fallback).
#[instrument(skip_all)]
pub async fn find_credential(pool: &Pool, specialist_id: i64) -> Result<Option<Credential>> {
    const COLUMNS: &str =
        "id, specialist_id, calendar_id, access_token, refresh_token, expires_at, status";

    let sql = format!(
        "SELECT {COLUMNS} FROM calendar_credentials \
         WHERE specialist_id = ? AND status = 'active' ORDER BY id DESC LIMIT 1"
    );
    if let Some(row) = sqlx::query(&sql)
        .bind(specialist_id)
        .fetch_optional(pool)
        .await?
    {
        return Ok(Some(credential_from_row(&row)?));
    }

    let sql = format!(
        "SELECT {COLUMNS} FROM calendar_credentials \
         WHERE specialist_id IS NULL AND status = 'active' ORDER BY id DESC LIMIT 1"
    );
    let row = sqlx::query(&sql).fetch_optional(pool).await?;
    row.as_ref().map(credential_from_row).transpose()
}

/// Persist a refreshed access token and its new expiry.
#[instrument(skip_all)]
pub async fn update_credential_tokens(
    pool: &Pool,
    id: i64,
    access_token: &str,
    expires_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "UPDATE calendar_credentials SET access_token = ?, expires_at = ?, updated_at = ? \
         WHERE id = ?",
    )
    .bind(access_token)
    .bind(expires_at)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Booking snapshot store
// ---------------------------------------------------------------------------

/// Booking joined with its service name and workpoint country. `None` when
/// the booking no longer exists anywhere.
#[instrument(skip_all)]
pub async fn booking_snapshot(pool: &Pool, booking_id: i64) -> Result<Option<BookingSnapshot>> {
    let row = sqlx::query(
        "SELECT b.id, b.specialist_id, b.client_name, b.client_phone, b.starts_at, b.ends_at, \
                b.booked_on, b.booked_via, b.canceled, b.provider_event_id, \
                s.name AS service_name, w.country AS country \
         FROM bookings b \
         LEFT JOIN services s ON s.id = b.service_id \
         LEFT JOIN workpoints w ON w.id = b.workpoint_id \
         WHERE b.id = ?",
    )
    .bind(booking_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| BookingSnapshot {
        booking_id: row.get("id"),
        specialist_id: row.get("specialist_id"),
        client_name: row.get("client_name"),
        client_phone: row.get("client_phone"),
        service_name: row.get("service_name"),
        country: row.get("country"),
        starts_at: row.get("starts_at"),
        ends_at: row.get("ends_at"),
        booked_on: row.get("booked_on"),
        booked_via: row.get("booked_via"),
        provider_event_id: row.get("provider_event_id"),
        canceled: row.get::<i64, _>("canceled") != 0,
    }))
}

#[instrument(skip_all)]
pub async fn stored_event_id(pool: &Pool, booking_id: i64) -> Result<Option<String>> {
    let id: Option<Option<String>> =
        sqlx::query_scalar("SELECT provider_event_id FROM bookings WHERE id = ?")
            .bind(booking_id)
            .fetch_optional(pool)
            .await?;
    Ok(id.flatten())
}

#[instrument(skip_all)]
pub async fn store_event_id(pool: &Pool, booking_id: i64, event_id: &str) -> Result<()> {
    sqlx::query("UPDATE bookings SET provider_event_id = ? WHERE id = ?")
        .bind(event_id)
        .bind(booking_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn clear_event_id(pool: &Pool, booking_id: i64) -> Result<()> {
    sqlx::query("UPDATE bookings SET provider_event_id = NULL WHERE id = ?")
        .bind(booking_id)
        .execute(pool)
        .await?;
    Ok(())
}
