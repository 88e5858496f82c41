//! Sync engine
//!
//! Orchestrates reconciliation of one registered database: enumerates the
//! remote side, diffs against the local cache, upserts and soft-deletes
//! local pages, and pushes locally-dirty pages back to the remote service.
//!
//! Error isolation: per-page failures accumulate into the current run's
//! error list without aborting it (the run finalizes as `partial`);
//! infrastructure failures that escape the per-page handlers finalize the
//! run as `failed` with the error message. Within one run, pages are
//! processed one at a time so ordering stays deterministic and error
//! attribution simple.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::conflict::ConflictResolver;
use crate::cache::CacheService;
use crate::database::SyncStore;
use crate::error::{ApiError, SyncError};
use crate::models::{
    ConflictWinner, PageStatus, RemoteDatabase, RemotePage, SyncRun, SyncRunCounters, SyncRunType,
};
use crate::remote::api::{PagePayload, QueryRequest, UpdatePageRequest};
use crate::remote::WorkspaceApi;

/// What a page upsert did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new local page was created
    Created,
    /// The existing local page was updated
    Updated,
    /// The remote copy was not newer (or lost the conflict); nothing applied
    Skipped,
}

/// Result of pushing locally-dirty pages
#[derive(Debug, Clone, Default)]
pub struct PushReport {
    /// Pages pushed and marked synced
    pub pushed: u32,

    /// Per-page failures; the batch continues past them
    pub errors: Vec<crate::models::PageError>,
}

/// Direction for a single-record sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncDirection {
    /// Only push the local copy out
    PushOnly,
    /// Only pull the remote copy in
    PullOnly,
    /// Pull, then push if the local copy is still dirty
    Both,
}

/// Result of a single-record sync
#[derive(Debug, Clone)]
pub struct RecordSyncReport {
    /// Pull outcome, when the direction included pull
    pub pulled: Option<UpsertOutcome>,

    /// Whether a push happened
    pub pushed: bool,
}

enum PullMode {
    Full,
    Incremental,
}

/// Orchestrates synchronization of registered databases
pub struct SyncEngine {
    client: Arc<dyn WorkspaceApi>,
    store: Arc<dyn SyncStore>,
    cache: Arc<CacheService>,
    resolver: ConflictResolver,
    page_size: u32,
}

impl SyncEngine {
    /// Create an engine
    pub fn new(
        client: Arc<dyn WorkspaceApi>,
        store: Arc<dyn SyncStore>,
        cache: Arc<CacheService>,
        page_size: u32,
    ) -> Self {
        Self {
            client,
            store,
            cache,
            resolver: ConflictResolver::new(),
            page_size,
        }
    }

    /// Register a remote database for synchronization
    ///
    /// Fetches metadata to seed the title and schema. Re-registering an
    /// already-known remote id returns the existing registration.
    pub async fn register_database(
        &self,
        remote_id: &str,
        sync_interval_secs: u64,
    ) -> Result<RemoteDatabase, SyncError> {
        if let Some(existing) = self.store.get_database_by_remote_id(remote_id).await? {
            return Ok(existing);
        }

        let payload = self.client.get_database(remote_id).await?;
        let database = RemoteDatabase::new(remote_id, payload.title_text())
            .with_sync_interval(sync_interval_secs)
            .with_schema(payload.schema());
        self.store.upsert_database(&database).await?;

        info!(
            database = %database.id,
            remote_id = remote_id,
            "Registered remote database"
        );
        Ok(database)
    }

    /// Synchronize one database, producing a terminal [`SyncRun`]
    ///
    /// `Full` and `Manual` runs enumerate everything and sweep deletions;
    /// `Incremental` and `Scheduled` runs enumerate everything but only
    /// apply pages edited since the last sync. The run row is the audit
    /// trail: infrastructure failures finalize it as `failed` rather than
    /// being re-raised, so callers should inspect `run.status`.
    pub async fn sync_database(
        &self,
        database_id: &str,
        run_type: SyncRunType,
        actor: &str,
    ) -> Result<SyncRun, SyncError> {
        let mut database = self
            .store
            .get_database(database_id)
            .await?
            .ok_or_else(|| SyncError::DatabaseNotFound(database_id.to_string()))?;
        if !database.active {
            return Err(SyncError::DatabaseInactive(database_id.to_string()));
        }

        let mut run = SyncRun::new(&database.id, run_type, actor);
        self.store.insert_sync_run(&run).await?;
        run.begin();
        self.store.update_sync_run(&run).await?;

        info!(
            database = %database.id,
            run = %run.id,
            run_type = %run_type,
            actor = actor,
            "Sync run started"
        );

        let outcome = async {
            self.refresh_schema(&mut database).await?;
            let mode = match run_type {
                SyncRunType::Full | SyncRunType::Manual => PullMode::Full,
                SyncRunType::Incremental | SyncRunType::Scheduled => PullMode::Incremental,
            };
            self.pull_pass(&database, &mut run, mode).await
        }
        .await;

        match outcome {
            Ok(counters) => {
                run.complete(counters);
                let finished = run.finished_at.unwrap_or_else(Utc::now);
                self.store.set_database_synced(&database.id, finished).await?;
                info!(
                    database = %database.id,
                    run = %run.id,
                    status = %run.status,
                    total = run.counters.total_pages,
                    created = run.counters.pages_created,
                    updated = run.counters.pages_updated,
                    deleted = run.counters.pages_deleted,
                    failed = run.counters.pages_failed,
                    "Sync run finished"
                );
            }
            Err(err) => {
                warn!(
                    database = %database.id,
                    run = %run.id,
                    error = %err,
                    "Sync run failed"
                );
                run.fail(err.to_string());
            }
        }

        self.store.update_sync_run(&run).await?;
        Ok(run)
    }

    /// Refresh the cached schema when the remote copy drifted
    async fn refresh_schema(&self, database: &mut RemoteDatabase) -> Result<(), SyncError> {
        let payload = self.client.get_database(&database.remote_id).await?;
        let schema = payload.schema();
        let title = payload.title_text();

        if database.schema_drifted(&schema) || database.title != title {
            debug!(database = %database.id, "Schema drift detected, refreshing");
            self.store
                .update_database_schema(&database.id, &title, &schema)
                .await?;
            self.cache.invalidate_database(&database.id).await;
            database.schema = schema;
            database.title = title;
        }

        // Collaborators read metadata through the cache
        if let Ok(value) = serde_json::to_value(&payload) {
            self.cache
                .set(&CacheService::database_key(&database.id), value)
                .await;
        }
        Ok(())
    }

    /// One pull pass: paginate the remote enumeration, apply each page, and
    /// (for full passes) sweep pages that vanished remotely.
    ///
    /// Incremental passes run the same full enumeration and filter
    /// client-side on `lastEditedTime`, because the remote API offers no
    /// modified-since query filter. The cost is O(database size) per poll by
    /// design; it is a documented scaling limit of the remote contract, not
    /// an implementation shortcut.
    async fn pull_pass(
        &self,
        database: &RemoteDatabase,
        run: &mut SyncRun,
        mode: PullMode,
    ) -> Result<SyncRunCounters, SyncError> {
        let mut counters = SyncRunCounters::default();
        let mut seen: Vec<String> = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let request = QueryRequest::page_sized(self.page_size).with_cursor(cursor.clone());
            let response = self
                .client
                .query_database(&database.remote_id, request)
                .await?;

            for payload in &response.results {
                counters.total_pages += 1;
                seen.push(payload.id.clone());

                if let PullMode::Incremental = mode {
                    if let Some(last_synced) = database.last_synced_at {
                        if payload.last_edited_time <= last_synced {
                            continue;
                        }
                    }
                }

                match self.upsert_page(database, payload).await {
                    Ok(UpsertOutcome::Created) => counters.pages_created += 1,
                    Ok(UpsertOutcome::Updated) => counters.pages_updated += 1,
                    Ok(UpsertOutcome::Skipped) => {}
                    Err(err) => {
                        warn!(
                            database = %database.id,
                            page = %payload.id,
                            error = %err,
                            "Page sync failed"
                        );
                        run.record_page_error(&payload.id, err.to_string());
                        // Keep the audit trail live while the run progresses
                        if let Err(store_err) = self.store.update_sync_run(run).await {
                            warn!(run = %run.id, error = %store_err, "Failed to persist page error");
                        }
                    }
                }
            }

            if !response.has_more {
                break;
            }
            cursor = response.next_cursor;
            if cursor.is_none() {
                break;
            }
        }

        if let PullMode::Full = mode {
            counters.pages_deleted =
                self.store.mark_pages_deleted_except(&database.id, &seen).await? as u32;
        }

        Ok(counters)
    }

    /// Apply one remote page to the local cache
    ///
    /// Creates the page if its remote id is unseen locally; otherwise
    /// updates only when the remote copy is strictly newer. A dirty local
    /// page meeting a newer remote copy goes through conflict resolution:
    /// the losing side's edit is recorded in the page's conflict list either
    /// way.
    pub async fn upsert_page(
        &self,
        database: &RemoteDatabase,
        payload: &PagePayload,
    ) -> Result<UpsertOutcome, SyncError> {
        let existing = self.store.get_page(&database.id, &payload.id).await?;

        match existing {
            None => {
                self.materialize_page(database, payload, Vec::new()).await?;
                Ok(UpsertOutcome::Created)
            }
            Some(mut local) => {
                if payload.last_edited_time <= local.remote_edited_at {
                    return Ok(UpsertOutcome::Skipped);
                }

                if local.dirty {
                    let record = self.resolver.resolve_page(&local, payload.last_edited_time);
                    let winner = record.winner;
                    info!(
                        database = %database.id,
                        page = %payload.id,
                        winner = %winner,
                        "Conflict resolved"
                    );
                    match winner {
                        ConflictWinner::Remote => {
                            let mut conflicts = local.conflicts;
                            conflicts.push(record);
                            self.materialize_page(database, payload, conflicts).await?;
                            Ok(UpsertOutcome::Updated)
                        }
                        ConflictWinner::Local => {
                            // Keep the local copy (still dirty, still pending
                            // push); remember the remote edit we overrode
                            local.conflicts.push(record);
                            local.remote_edited_at = payload.last_edited_time;
                            self.store.upsert_page(&local).await?;
                            Ok(UpsertOutcome::Skipped)
                        }
                    }
                } else {
                    let conflicts = local.conflicts;
                    self.materialize_page(database, payload, conflicts).await?;
                    Ok(UpsertOutcome::Updated)
                }
            }
        }
    }

    /// Build the local page from remote data and store it clean
    async fn materialize_page(
        &self,
        database: &RemoteDatabase,
        payload: &PagePayload,
        conflicts: Vec<crate::models::ConflictRecord>,
    ) -> Result<RemotePage, SyncError> {
        let content = self.client.get_page_content(&payload.id).await?.blocks();

        let mut page = RemotePage::new(
            &payload.id,
            &database.id,
            payload.title_text(),
            payload.properties.clone(),
            content,
            payload.created_time,
            payload.last_edited_time,
        );
        page.created_by = payload.created_by.as_ref().map(|u| u.id.clone());
        page.last_edited_by = payload.last_edited_by.as_ref().map(|u| u.id.clone());
        page.conflicts = conflicts;
        if payload.archived {
            page.status = PageStatus::Archived;
        }

        self.store.upsert_page(&page).await?;
        self.cache
            .invalidate(&CacheService::page_key(&page.remote_id))
            .await;
        Ok(page)
    }

    /// Push all locally-dirty active pages to the remote service
    ///
    /// Each success clears the page's dirty flag and recomputes its hash;
    /// per-page failures are reported but do not stop the batch.
    pub async fn push_local_changes(&self, database_id: &str) -> Result<PushReport, SyncError> {
        let database = self
            .store
            .get_database(database_id)
            .await?
            .ok_or_else(|| SyncError::DatabaseNotFound(database_id.to_string()))?;

        let dirty = self.store.list_dirty_pages(&database.id).await?;
        let mut report = PushReport::default();

        for mut page in dirty {
            let request = UpdatePageRequest {
                properties: page.properties.clone(),
                archived: None,
            };

            match self.client.update_page(&page.remote_id, request).await {
                Ok(payload) => {
                    page.remote_edited_at = payload.last_edited_time;
                    page.mark_synced();
                    if let Err(err) = self.store.upsert_page(&page).await {
                        report.errors.push(crate::models::PageError {
                            page_id: page.remote_id.clone(),
                            message: err.to_string(),
                        });
                        continue;
                    }
                    self.cache
                        .invalidate(&CacheService::page_key(&page.remote_id))
                        .await;
                    report.pushed += 1;
                }
                Err(err) => {
                    warn!(
                        database = %database.id,
                        page = %page.remote_id,
                        error = %err,
                        "Push failed"
                    );
                    report.errors.push(crate::models::PageError {
                        page_id: page.remote_id.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }

        if report.pushed > 0 || !report.errors.is_empty() {
            info!(
                database = %database.id,
                pushed = report.pushed,
                failed = report.errors.len(),
                "Pushed local changes"
            );
        }
        Ok(report)
    }

    /// Synchronize a single record in the given direction
    ///
    /// Pull fetches the remote page and applies the same newer-wins upsert
    /// as a full pass; push sends the local copy out if it is dirty. `Both`
    /// pulls first, so conflict resolution decides whether the subsequent
    /// push still has anything to send.
    pub async fn sync_record(
        &self,
        database_id: &str,
        page_id: &str,
        direction: SyncDirection,
    ) -> Result<RecordSyncReport, SyncError> {
        let database = self
            .store
            .get_database(database_id)
            .await?
            .ok_or_else(|| SyncError::DatabaseNotFound(database_id.to_string()))?;

        let mut report = RecordSyncReport {
            pulled: None,
            pushed: false,
        };

        if matches!(direction, SyncDirection::PullOnly | SyncDirection::Both) {
            let payload = self.client.get_page(page_id).await?;
            report.pulled = Some(self.upsert_page(&database, &payload).await?);
        }

        if matches!(direction, SyncDirection::PushOnly | SyncDirection::Both) {
            if let Some(mut page) = self.store.get_page(&database.id, page_id).await? {
                if page.dirty && page.status == PageStatus::Active {
                    let request = UpdatePageRequest {
                        properties: page.properties.clone(),
                        archived: None,
                    };
                    let payload = self.client.update_page(&page.remote_id, request).await?;
                    page.remote_edited_at = payload.last_edited_time;
                    page.mark_synced();
                    self.store.upsert_page(&page).await?;
                    self.cache
                        .invalidate(&CacheService::page_key(&page.remote_id))
                        .await;
                    report.pushed = true;
                }
            }
        }

        Ok(report)
    }

    /// Resolve the owning registered database for a remote page id
    ///
    /// Checks the local page cache first, then the short-TTL read cache,
    /// and only then fetches the page to read its parent reference. Used by
    /// the webhook receiver, where bursts of events for the same page are
    /// common.
    pub async fn find_database_for_page(
        &self,
        page_id: &str,
    ) -> Result<Option<RemoteDatabase>, SyncError> {
        for database in self.store.list_active_databases().await? {
            if self.store.get_page(&database.id, page_id).await?.is_some() {
                return Ok(Some(database));
            }
        }

        let payload = match self.cached_page_payload(page_id).await {
            Some(payload) => payload,
            None => match self.client.get_page(page_id).await {
                Ok(payload) => {
                    if let Ok(value) = serde_json::to_value(&payload) {
                        self.cache
                            .set(&CacheService::page_key(page_id), value)
                            .await;
                    }
                    payload
                }
                Err(ApiError::NotFound(_)) => return Ok(None),
                Err(err) => return Err(err.into()),
            },
        };
        match payload.parent {
            Some(parent) => Ok(self
                .store
                .get_database_by_remote_id(&parent.database_id)
                .await?),
            None => Ok(None),
        }
    }

    async fn cached_page_payload(&self, page_id: &str) -> Option<PagePayload> {
        let value = self.cache.get(&CacheService::page_key(page_id)).await?;
        serde_json::from_value(value).ok()
    }
}
