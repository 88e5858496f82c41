//! Scheduler integration tests
//!
//! Verifies the mutual-exclusion guarantee end to end: at most one
//! concurrent sync run per database, with contended attempts skipped, never
//! queued.

mod common;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use common::{page_payload, ScriptedWorkspace};

use workspace_sync::cache::CacheService;
use workspace_sync::config::SchedulerConfig;
use workspace_sync::coordination::{MemoryStateStore, StateStore};
use workspace_sync::database::{SqliteStore, SyncStore};
use workspace_sync::models::{RemoteDatabase, SyncRunStatus};
use workspace_sync::remote::WorkspaceApi;
use workspace_sync::sync::{RunReport, Scheduler, SyncEngine};

struct Fixture {
    remote: Arc<ScriptedWorkspace>,
    store: Arc<SqliteStore>,
    scheduler: Arc<Scheduler>,
}

async fn setup() -> Fixture {
    let remote = Arc::new(ScriptedWorkspace::new());
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let state: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());

    let engine = Arc::new(SyncEngine::new(
        Arc::clone(&remote) as Arc<dyn WorkspaceApi>,
        Arc::clone(&store) as Arc<dyn SyncStore>,
        Arc::new(CacheService::new(StdDuration::from_secs(300))),
        100,
    ));
    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&store) as Arc<dyn SyncStore>,
        engine,
        state,
        SchedulerConfig::default(),
    ));

    Fixture {
        remote,
        store,
        scheduler,
    }
}

async fn seed_database(fixture: &Fixture, remote_id: &str, pages: usize) -> RemoteDatabase {
    fixture.remote.put_database(remote_id, "Projects").await;
    let base = Utc::now() - chrono::Duration::hours(1);
    for i in 1..=pages {
        fixture
            .remote
            .put_page(
                remote_id,
                page_payload(&format!("{}-page-{}", remote_id, i), "A page", base),
            )
            .await;
    }

    let database = RemoteDatabase::new(remote_id, "Projects");
    fixture.store.upsert_database(&database).await.unwrap();
    database
}

/// Test 1: Two concurrent triggers for the same database: one runs, the
/// other is skipped, never queued
#[tokio::test]
async fn test_concurrent_triggers_one_winner() {
    let fixture = setup().await;
    let database = seed_database(&fixture, "remote-db", 4).await;

    // Slow queries keep the first run holding its lease while the second
    // trigger arrives
    fixture
        .remote
        .set_query_delay(Some(StdDuration::from_millis(200)))
        .await;

    let scheduler_a = Arc::clone(&fixture.scheduler);
    let scheduler_b = Arc::clone(&fixture.scheduler);
    let db_a = database.clone();
    let db_b = database.clone();

    let first = tokio::spawn(async move { scheduler_a.run_one(&db_a).await.unwrap() });
    tokio::time::sleep(StdDuration::from_millis(50)).await;
    let second = tokio::spawn(async move { scheduler_b.run_one(&db_b).await.unwrap() });

    let first = first.await.unwrap();
    let second = second.await.unwrap();

    let completed = [&first, &second]
        .iter()
        .filter(|r| matches!(r, RunReport::Completed(_)))
        .count();
    let skipped = [&first, &second]
        .iter()
        .filter(|r| matches!(r, RunReport::Skipped { .. }))
        .count();

    assert_eq!(completed, 1, "exactly one trigger must run");
    assert_eq!(skipped, 1, "the loser must be skipped, not queued");

    // Only one run row exists: nothing was queued behind the lease
    let runs = fixture
        .store
        .list_runs_for_database(&database.id, 10)
        .await
        .unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, SyncRunStatus::Completed);
}

/// Test 2: Different databases sync concurrently without contention
#[tokio::test]
async fn test_different_databases_not_contended() {
    let fixture = setup().await;
    let db_one = seed_database(&fixture, "remote-one", 2).await;
    let db_two = seed_database(&fixture, "remote-two", 2).await;

    let scheduler_a = Arc::clone(&fixture.scheduler);
    let scheduler_b = Arc::clone(&fixture.scheduler);

    let first = tokio::spawn(async move { scheduler_a.run_one(&db_one).await.unwrap() });
    let second = tokio::spawn(async move { scheduler_b.run_one(&db_two).await.unwrap() });

    assert!(matches!(first.await.unwrap(), RunReport::Completed(_)));
    assert!(matches!(second.await.unwrap(), RunReport::Completed(_)));
}

/// Test 3: At most one non-terminal run exists per database at any instant
#[tokio::test]
async fn test_at_most_one_non_terminal_run() {
    let fixture = setup().await;
    let database = seed_database(&fixture, "remote-db", 6).await;

    fixture
        .remote
        .set_query_delay(Some(StdDuration::from_millis(100)))
        .await;

    let mut handles = Vec::new();
    for _ in 0..4 {
        let scheduler = Arc::clone(&fixture.scheduler);
        let db = database.clone();
        handles.push(tokio::spawn(async move { scheduler.run_one(&db).await.unwrap() }));
    }

    let mut completed = 0;
    for handle in handles {
        if matches!(handle.await.unwrap(), RunReport::Completed(_)) {
            completed += 1;
        }
    }

    // Losers skipped while the winner held the lease; once released, later
    // arrivals may have won their own turn, but runs never overlapped
    assert!(completed >= 1);
    let runs = fixture
        .store
        .list_runs_for_database(&database.id, 10)
        .await
        .unwrap();
    assert_eq!(runs.len(), completed);
    assert!(runs.iter().all(|run| run.is_terminal()));
}

/// Test 4: A tick over several due databases runs each under its own lease
#[tokio::test]
async fn test_tick_runs_all_due() {
    let fixture = setup().await;
    seed_database(&fixture, "remote-one", 1).await;
    seed_database(&fixture, "remote-two", 1).await;
    seed_database(&fixture, "remote-three", 1).await;

    let reports = fixture.scheduler.tick(Utc::now()).await.unwrap();

    assert_eq!(reports.len(), 3);
    assert!(reports.iter().all(|r| matches!(r, RunReport::Completed(_))));
}

/// Test 5: After a completed run the database leaves the due set until its
/// interval elapses, and a force marker brings it back
#[tokio::test]
async fn test_due_set_shrinks_then_force_returns() {
    let fixture = setup().await;
    let database = seed_database(&fixture, "remote-db", 1).await;

    fixture.scheduler.tick(Utc::now()).await.unwrap();

    let due = fixture.scheduler.select_due(Utc::now()).await.unwrap();
    assert!(due.is_empty());

    fixture.scheduler.force_sync(&database.id).await.unwrap();
    let due = fixture.scheduler.select_due(Utc::now()).await.unwrap();
    assert_eq!(due.len(), 1);
}
