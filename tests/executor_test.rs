use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use calsync::db;
use calsync::event::ProviderEvent;
use calsync::executor::{self, ExecOutcome};
use calsync::logger::SyncLogger;
use calsync::model::{ActionKind, Credential, CredentialStatus};
use calsync::provider::{CalendarService, RefreshedToken, SyncError};

async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

fn test_logger() -> SyncLogger {
    let dir = tempfile::tempdir().unwrap().into_path();
    SyncLogger::new(dir.join("executor.log"), false).unwrap()
}

fn credential() -> Credential {
    Credential {
        id: 1,
        specialist_id: Some(7),
        calendar_id: "primary".into(),
        access_token: "tok".into(),
        refresh_token: "refresh".into(),
        expires_at: None,
        status: CredentialStatus::Active,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Create,
    Update(String),
    Delete(String),
}

#[derive(Clone, Default)]
struct ScriptedCalendar {
    calls: Arc<Mutex<Vec<Call>>>,
    create_responses: Arc<Mutex<VecDeque<Result<String, SyncError>>>>,
    update_responses: Arc<Mutex<VecDeque<Result<(), SyncError>>>>,
    delete_responses: Arc<Mutex<VecDeque<Result<(), SyncError>>>>,
}

impl ScriptedCalendar {
    async fn calls(&self) -> Vec<Call> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl CalendarService for ScriptedCalendar {
    async fn create_event(
        &self,
        _credential: &Credential,
        _event: &ProviderEvent,
    ) -> Result<String, SyncError> {
        let mut calls = self.calls.lock().await;
        calls.push(Call::Create);
        let n = calls.len();
        drop(calls);
        self.create_responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(format!("evt-{n}")))
    }

    async fn update_event(
        &self,
        _credential: &Credential,
        event_id: &str,
        _event: &ProviderEvent,
    ) -> Result<(), SyncError> {
        self.calls.lock().await.push(Call::Update(event_id.into()));
        self.update_responses
            .lock()
            .await
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn delete_event(
        &self,
        _credential: &Credential,
        event_id: &str,
    ) -> Result<(), SyncError> {
        self.calls.lock().await.push(Call::Delete(event_id.into()));
        self.delete_responses
            .lock()
            .await
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn refresh_credential(&self, _refresh_token: &str) -> Result<RefreshedToken, SyncError> {
        unreachable!("executor never refreshes credentials")
    }
}

async fn seed_booking(pool: &sqlx::SqlitePool, id: i64, event_id: Option<&str>) {
    sqlx::query(
        "INSERT INTO bookings (id, specialist_id, client_name, starts_at, ends_at, provider_event_id) \
         VALUES (?, 7, 'Alice', '2025-09-12 10:00:00', '2025-09-12 11:00:00', ?)",
    )
    .bind(id)
    .bind(event_id)
    .execute(pool)
    .await
    .unwrap();
}

async fn run(
    pool: &sqlx::SqlitePool,
    fake: &ScriptedCalendar,
    action: ActionKind,
    booking_id: i64,
) -> Result<ExecOutcome, SyncError> {
    let logger = test_logger();
    executor::execute(
        pool,
        fake,
        &logger,
        action,
        booking_id,
        &credential(),
        Duration::ZERO,
    )
    .await
}

#[tokio::test]
async fn delete_removes_event_and_clears_stored_id() {
    let pool = setup_pool().await;
    seed_booking(&pool, 10, Some("evt-1")).await;
    let fake = ScriptedCalendar::default();

    let outcome = run(&pool, &fake, ActionKind::Delete, 10).await.unwrap();
    assert_eq!(outcome, ExecOutcome::Deleted("evt-1".into()));
    assert_eq!(fake.calls().await, vec![Call::Delete("evt-1".into())]);
    assert!(db::stored_event_id(&pool, 10).await.unwrap().is_none());
}

#[tokio::test]
async fn delete_without_stored_id_is_a_noop_success() {
    let pool = setup_pool().await;
    seed_booking(&pool, 10, None).await;
    let fake = ScriptedCalendar::default();

    let outcome = run(&pool, &fake, ActionKind::Delete, 10).await.unwrap();
    assert_eq!(outcome, ExecOutcome::NothingToDelete);
    assert!(fake.calls().await.is_empty());
}

#[tokio::test]
async fn delete_of_already_removed_event_succeeds() {
    let pool = setup_pool().await;
    seed_booking(&pool, 10, Some("evt-gone")).await;
    let fake = ScriptedCalendar::default();
    fake.delete_responses.lock().await.push_back(Err(SyncError::Provider {
        status: 404,
        message: "HTTP 404 - Not Found".into(),
    }));

    let outcome = run(&pool, &fake, ActionKind::Delete, 10).await.unwrap();
    assert_eq!(outcome, ExecOutcome::Deleted("evt-gone".into()));
    assert!(db::stored_event_id(&pool, 10).await.unwrap().is_none());
}

#[tokio::test]
async fn failed_delete_keeps_the_stored_id() {
    let pool = setup_pool().await;
    seed_booking(&pool, 10, Some("evt-1")).await;
    let fake = ScriptedCalendar::default();
    fake.delete_responses.lock().await.push_back(Err(SyncError::Provider {
        status: 500,
        message: "HTTP 500 - Backend Error".into(),
    }));

    let err = run(&pool, &fake, ActionKind::Delete, 10).await.unwrap_err();
    assert!(matches!(err, SyncError::Provider { status: 500, .. }));
    assert_eq!(
        db::stored_event_id(&pool, 10).await.unwrap().as_deref(),
        Some("evt-1")
    );
}

#[tokio::test]
async fn create_with_existing_event_id_updates_instead() {
    let pool = setup_pool().await;
    seed_booking(&pool, 10, Some("evt-1")).await;
    let fake = ScriptedCalendar::default();

    let outcome = run(&pool, &fake, ActionKind::Create, 10).await.unwrap();
    assert_eq!(outcome, ExecOutcome::Updated("evt-1".into()));
    assert_eq!(fake.calls().await, vec![Call::Update("evt-1".into())]);
}

#[tokio::test]
async fn update_without_stored_id_creates_a_new_event() {
    let pool = setup_pool().await;
    seed_booking(&pool, 10, None).await;
    let fake = ScriptedCalendar::default();

    let outcome = run(&pool, &fake, ActionKind::Update, 10).await.unwrap();
    assert_eq!(outcome, ExecOutcome::Created("evt-1".into()));
    assert_eq!(fake.calls().await, vec![Call::Create]);
    assert_eq!(
        db::stored_event_id(&pool, 10).await.unwrap().as_deref(),
        Some("evt-1")
    );
}

#[tokio::test]
async fn update_of_lost_event_recreates_it() {
    let pool = setup_pool().await;
    seed_booking(&pool, 10, Some("evt-stale")).await;
    let fake = ScriptedCalendar::default();
    fake.update_responses.lock().await.push_back(Err(SyncError::Provider {
        status: 404,
        message: "HTTP 404 - Not Found".into(),
    }));

    let outcome = run(&pool, &fake, ActionKind::Update, 10).await.unwrap();
    match outcome {
        ExecOutcome::Created(id) => {
            assert_eq!(
                db::stored_event_id(&pool, 10).await.unwrap().as_deref(),
                Some(id.as_str())
            );
            assert_ne!(id, "evt-stale");
        }
        other => panic!("expected a created event, got {other:?}"),
    }
    assert_eq!(
        fake.calls().await,
        vec![Call::Update("evt-stale".into()), Call::Create]
    );
}

#[tokio::test]
async fn missing_booking_is_a_per_item_error() {
    let pool = setup_pool().await;
    let fake = ScriptedCalendar::default();

    let err = run(&pool, &fake, ActionKind::Create, 999).await.unwrap_err();
    assert!(err.to_string().contains("booking 999 not found"));
    assert!(fake.calls().await.is_empty());
}
