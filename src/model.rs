use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of sync operation a queue entry asks for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ActionKind {
    Create,
    Update,
    Delete,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Create => "create",
            ActionKind::Update => "update",
            ActionKind::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(ActionKind::Create),
            "update" => Some(ActionKind::Update),
            "delete" => Some(ActionKind::Delete),
            _ => None,
        }
    }
}

/// Queue entry lifecycle. `Done` and `PermanentlyFailed` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum QueueStatus {
    Pending,
    Processing,
    Done,
    Failed,
    PermanentlyFailed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Processing => "processing",
            QueueStatus::Done => "done",
            QueueStatus::Failed => "failed",
            QueueStatus::PermanentlyFailed => "permanently_failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(QueueStatus::Pending),
            "processing" => Some(QueueStatus::Processing),
            "done" => Some(QueueStatus::Done),
            "failed" => Some(QueueStatus::Failed),
            "permanently_failed" => Some(QueueStatus::PermanentlyFailed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CredentialStatus {
    Active,
    Revoked,
}

impl CredentialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialStatus::Active => "active",
            CredentialStatus::Revoked => "revoked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(CredentialStatus::Active),
            "revoked" => Some(CredentialStatus::Revoked),
            _ => None,
        }
    }
}

/// One desired external-sync operation, as stored in `sync_queue`.
#[derive(Debug, Clone)]
pub struct SyncQueueEntry {
    pub id: i64,
    pub booking_id: i64,
    pub specialist_id: i64,
    pub action: ActionKind,
    pub status: QueueStatus,
    pub attempts: i64,
    pub error_message: Option<String>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Wake-up marker consumed by the daemon loop.
#[derive(Debug, Clone)]
pub struct WorkerSignal {
    pub id: i64,
    pub specialist_id: Option<i64>,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Provider access material for one specialist, or the global fallback when
/// `specialist_id` is `None`.
#[derive(Debug, Clone)]
pub struct Credential {
    pub id: i64,
    pub specialist_id: Option<i64>,
    pub calendar_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub status: CredentialStatus,
}

/// Read-only projection of a booking joined with its service and workpoint,
/// enough to build the provider event. Times are wall-clock in the
/// workpoint's timezone, which is derived from `country`.
#[derive(Debug, Clone)]
pub struct BookingSnapshot {
    pub booking_id: i64,
    pub specialist_id: i64,
    pub client_name: Option<String>,
    pub client_phone: Option<String>,
    pub service_name: Option<String>,
    pub country: Option<String>,
    pub starts_at: NaiveDateTime,
    pub ends_at: NaiveDateTime,
    pub booked_on: Option<String>,
    pub booked_via: Option<String>,
    pub provider_event_id: Option<String>,
    pub canceled: bool,
}
