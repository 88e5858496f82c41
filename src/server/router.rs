//! HTTP router for workspace-sync
//!
//! Routes:
//! - Health check
//! - Sync status per database, manual sync triggers
//! - Single-record sync with direction (`pushOnly` / `pullOnly` / `both`)
//! - Webhook receiver scheduling a single-record resync
//! - Monitor reports

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::database::SyncStore;
use crate::error::SyncError;
use crate::monitor::Monitor;
use crate::sync::engine::{SyncDirection, SyncEngine, UpsertOutcome};
use crate::sync::Scheduler;

/// Shared application state
pub struct AppState {
    /// Persistence layer
    pub store: Arc<dyn SyncStore>,

    /// Sync engine
    pub engine: Arc<SyncEngine>,

    /// Lease-guarded scheduler
    pub scheduler: Arc<Scheduler>,

    /// Health monitor
    pub monitor: Arc<Monitor>,
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            engine: Arc::clone(&self.engine),
            scheduler: Arc::clone(&self.scheduler),
            monitor: Arc::clone(&self.monitor),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Structured error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Sync status for one database
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusResponse {
    /// idle | running | completed | error
    pub status: String,

    /// When the database last synced successfully
    pub last_sync: Option<DateTime<Utc>>,
}

/// Acknowledgement for asynchronous triggers
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
    pub database_id: String,
    pub scheduled: bool,
}

/// Request body for single-record sync
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSyncRequest {
    pub database_id: String,
    pub direction: SyncDirection,
}

/// Response body for single-record sync
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSyncResponse {
    pub pulled: Option<String>,
    pub pushed: bool,
}

/// Webhook payload: `{type, data: {id}}`
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookPayload {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookData,
}

/// Webhook payload data
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookData {
    pub id: String,
}

type HandlerError = (StatusCode, Json<ErrorResponse>);

fn sync_error_response(err: &SyncError) -> HandlerError {
    let (status, kind) = match err {
        SyncError::DatabaseNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        SyncError::DatabaseInactive(_) => (StatusCode::CONFLICT, "inactive"),
        SyncError::AlreadyRunning(_) => (StatusCode::CONFLICT, "already_running"),
        SyncError::Api(api) => {
            let status = api
                .status_code()
                .and_then(|code| StatusCode::from_u16(code).ok())
                .unwrap_or(StatusCode::BAD_GATEWAY);
            (status, "api_error")
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    };
    (
        status,
        Json(ErrorResponse {
            error: kind.to_string(),
            message: err.to_string(),
        }),
    )
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/databases/:id/status", get(sync_status_handler))
        .route("/api/databases/:id/sync", post(trigger_sync_handler))
        .route("/api/records/:page_id/sync", post(record_sync_handler))
        .route("/api/webhooks/workspace", post(webhook_handler))
        .route("/api/monitor/health", get(monitor_health_handler))
        .route("/api/monitor/stats", get(monitor_stats_handler))
        .with_state(state)
}

/// Health check endpoint handler
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Current sync status for one database
async fn sync_status_handler(
    State(state): State<AppState>,
    Path(database_id): Path<String>,
) -> Result<Json<SyncStatusResponse>, HandlerError> {
    let database = state
        .store
        .get_database(&database_id)
        .await
        .map_err(|e| sync_error_response(&e.into()))?
        .ok_or_else(|| sync_error_response(&SyncError::DatabaseNotFound(database_id.clone())))?;

    let latest = state
        .store
        .latest_sync_run(&database.id)
        .await
        .map_err(|e| sync_error_response(&e.into()))?;

    let status = match &latest {
        None => "idle",
        Some(run) if !run.is_terminal() => "running",
        Some(run) if run.status == crate::models::SyncRunStatus::Failed => "error",
        Some(_) => "completed",
    };

    Ok(Json(SyncStatusResponse {
        status: status.to_string(),
        last_sync: database.last_synced_at,
    }))
}

/// Trigger a manual full sync (privileged; authentication is enforced by
/// the deployment's ingress)
async fn trigger_sync_handler(
    State(state): State<AppState>,
    Path(database_id): Path<String>,
) -> Result<(StatusCode, Json<TriggerResponse>), HandlerError> {
    // Validate existence before acknowledging
    state
        .store
        .get_database(&database_id)
        .await
        .map_err(|e| sync_error_response(&e.into()))?
        .ok_or_else(|| sync_error_response(&SyncError::DatabaseNotFound(database_id.clone())))?;

    let scheduler = Arc::clone(&state.scheduler);
    let id = database_id.clone();
    tokio::spawn(async move {
        match scheduler.run_manual(&id).await {
            Ok(report) => info!(database = %id, ?report, "Manual sync finished"),
            Err(err) => warn!(database = %id, error = %err, "Manual sync errored"),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(TriggerResponse {
            database_id,
            scheduled: true,
        }),
    ))
}

/// Synchronize one record in the requested direction
async fn record_sync_handler(
    State(state): State<AppState>,
    Path(page_id): Path<String>,
    Json(request): Json<RecordSyncRequest>,
) -> Result<Json<RecordSyncResponse>, HandlerError> {
    let report = state
        .engine
        .sync_record(&request.database_id, &page_id, request.direction)
        .await
        .map_err(|e| sync_error_response(&e))?;

    Ok(Json(RecordSyncResponse {
        pulled: report.pulled.map(|outcome| {
            match outcome {
                UpsertOutcome::Created => "created",
                UpsertOutcome::Updated => "updated",
                UpsertOutcome::Skipped => "skipped",
            }
            .to_string()
        }),
        pushed: report.pushed,
    }))
}

/// Webhook receiver: schedules an incremental resync of the affected record
async fn webhook_handler(
    State(state): State<AppState>,
    Json(payload): Json<WebhookPayload>,
) -> (StatusCode, Json<serde_json::Value>) {
    info!(
        event = %payload.event_type,
        record = %payload.data.id,
        "Webhook received"
    );

    let engine = Arc::clone(&state.engine);
    let page_id = payload.data.id.clone();
    tokio::spawn(async move {
        match engine.find_database_for_page(&page_id).await {
            Ok(Some(database)) => {
                if let Err(err) = engine
                    .sync_record(&database.id, &page_id, SyncDirection::PullOnly)
                    .await
                {
                    warn!(page = %page_id, error = %err, "Webhook resync failed");
                }
            }
            Ok(None) => warn!(page = %page_id, "Webhook for a page in no registered database"),
            Err(err) => warn!(page = %page_id, error = %err, "Webhook lookup failed"),
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({"accepted": true})),
    )
}

/// Full monitor evaluation
async fn monitor_health_handler(
    State(state): State<AppState>,
) -> Result<Json<crate::monitor::MonitorReport>, HandlerError> {
    let report = state
        .monitor
        .evaluate(Utc::now())
        .await
        .map_err(|e| sync_error_response(&e))?;
    Ok(Json(report))
}

/// Global 24h statistics
async fn monitor_stats_handler(
    State(state): State<AppState>,
) -> Result<Json<crate::monitor::GlobalStats>, HandlerError> {
    let stats = state
        .monitor
        .global_stats(Utc::now())
        .await
        .map_err(|e| sync_error_response(&e))?;
    Ok(Json(stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheService;
    use crate::config::{MonitorConfig, SchedulerConfig};
    use crate::coordination::{MemoryStateStore, StateStore};
    use crate::database::SqliteStore;
    use crate::models::{RemoteDatabase, SyncRun, SyncRunCounters, SyncRunType};
    use crate::monitor::LogNotifier;
    use crate::remote::api::{DatabasePayload, QueryResponse};
    use crate::remote::client::MockWorkspaceApi;
    use crate::remote::WorkspaceApi;

    async fn app_state(mock: MockWorkspaceApi) -> (AppState, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let state: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let engine = Arc::new(SyncEngine::new(
            Arc::new(mock) as Arc<dyn WorkspaceApi>,
            Arc::clone(&store) as Arc<dyn SyncStore>,
            Arc::new(CacheService::new(std::time::Duration::from_secs(300))),
            100,
        ));
        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&store) as Arc<dyn SyncStore>,
            Arc::clone(&engine),
            Arc::clone(&state),
            SchedulerConfig::default(),
        ));
        let monitor = Arc::new(Monitor::new(
            Arc::clone(&store) as Arc<dyn SyncStore>,
            state,
            Arc::new(LogNotifier),
            MonitorConfig::default(),
        ));

        (
            AppState {
                store: Arc::clone(&store) as Arc<dyn SyncStore>,
                engine,
                scheduler,
                monitor,
            },
            store,
        )
    }

    fn quiet_remote() -> MockWorkspaceApi {
        let mut mock = MockWorkspaceApi::new();
        mock.expect_get_database().returning(|id| {
            Ok(DatabasePayload {
                id: id.to_string(),
                title: vec![],
                properties: Default::default(),
            })
        });
        mock.expect_query_database()
            .returning(|_, _| Ok(QueryResponse::default()));
        mock
    }

    // Test 1: Health endpoint reports the crate version
    #[tokio::test]
    async fn test_health() {
        let response = health_handler().await;
        assert_eq!(response.0.status, "healthy");
        assert_eq!(response.0.version, env!("CARGO_PKG_VERSION"));
    }

    // Test 2: Status is idle for a database with no runs
    #[tokio::test]
    async fn test_status_idle() {
        let (state, store) = app_state(quiet_remote()).await;
        let database = RemoteDatabase::new("remote-1", "Projects");
        store.upsert_database(&database).await.unwrap();

        let response = sync_status_handler(State(state), Path(database.id.clone()))
            .await
            .unwrap();
        assert_eq!(response.0.status, "idle");
        assert!(response.0.last_sync.is_none());
    }

    // Test 3: Status reflects running and terminal runs
    #[tokio::test]
    async fn test_status_transitions() {
        let (state, store) = app_state(quiet_remote()).await;
        let database = RemoteDatabase::new("remote-1", "Projects");
        store.upsert_database(&database).await.unwrap();

        // Non-terminal run: running
        let mut run = SyncRun::new(&database.id, SyncRunType::Manual, "test");
        store.insert_sync_run(&run).await.unwrap();
        let response = sync_status_handler(State(state.clone()), Path(database.id.clone()))
            .await
            .unwrap();
        assert_eq!(response.0.status, "running");

        // Completed run: completed
        run.begin();
        run.complete(SyncRunCounters::default());
        store.update_sync_run(&run).await.unwrap();
        let response = sync_status_handler(State(state.clone()), Path(database.id.clone()))
            .await
            .unwrap();
        assert_eq!(response.0.status, "completed");

        // Failed run on top: error
        let mut failed = SyncRun::new(&database.id, SyncRunType::Manual, "test");
        failed.fail("boom");
        store.insert_sync_run(&failed).await.unwrap();
        let response = sync_status_handler(State(state), Path(database.id.clone()))
            .await
            .unwrap();
        assert_eq!(response.0.status, "error");
    }

    // Test 4: Unknown database returns 404
    #[tokio::test]
    async fn test_status_unknown_database() {
        let (state, _store) = app_state(quiet_remote()).await;

        let result = sync_status_handler(State(state), Path("ghost".to_string())).await;
        let (status, body) = result.unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.0.error, "not_found");
    }

    // Test 5: Trigger acknowledges with 202 for a known database
    #[tokio::test]
    async fn test_trigger_accepted() {
        let (state, store) = app_state(quiet_remote()).await;
        let database = RemoteDatabase::new("remote-1", "Projects");
        store.upsert_database(&database).await.unwrap();

        let (status, response) = trigger_sync_handler(State(state), Path(database.id.clone()))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(response.0.scheduled);
        assert_eq!(response.0.database_id, database.id);
    }

    // Test 6: Trigger for an unknown database returns 404
    #[tokio::test]
    async fn test_trigger_unknown_database() {
        let (state, _store) = app_state(quiet_remote()).await;

        let result = trigger_sync_handler(State(state), Path("ghost".to_string())).await;
        assert_eq!(result.unwrap_err().0, StatusCode::NOT_FOUND);
    }

    // Test 7: Webhook acknowledges immediately
    #[tokio::test]
    async fn test_webhook_accepted() {
        let (state, _store) = app_state(quiet_remote()).await;

        let (status, body) = webhook_handler(
            State(state),
            Json(WebhookPayload {
                event_type: "page.updated".to_string(),
                data: WebhookData {
                    id: "page-1".to_string(),
                },
            }),
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body.0["accepted"], true);
    }

    // Test 8: Monitor endpoints serialize cleanly
    #[tokio::test]
    async fn test_monitor_endpoints() {
        let (state, store) = app_state(quiet_remote()).await;
        let database = RemoteDatabase::new("remote-1", "Projects");
        store.upsert_database(&database).await.unwrap();

        let health = monitor_health_handler(State(state.clone())).await.unwrap();
        assert_eq!(health.0.databases.len(), 1);

        let stats = monitor_stats_handler(State(state)).await.unwrap();
        assert_eq!(stats.0.runs, 0);
    }

    // Test 9: Record sync direction strings follow the wire contract
    #[test]
    fn test_direction_wire_format() {
        let json = serde_json::to_string(&SyncDirection::PushOnly).unwrap();
        assert_eq!(json, "\"pushOnly\"");
        let parsed: SyncDirection = serde_json::from_str("\"pullOnly\"").unwrap();
        assert_eq!(parsed, SyncDirection::PullOnly);
        let parsed: SyncDirection = serde_json::from_str("\"both\"").unwrap();
        assert_eq!(parsed, SyncDirection::Both);
    }
}
