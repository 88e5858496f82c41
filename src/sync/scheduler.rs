//! Sync scheduler
//!
//! Invoked by a periodic external trigger (a cron-like `tick`), not a
//! persistent event loop. Each tick selects the databases due for
//! synchronization and runs them one by one; a per-database TTL lease
//! enforces at most one concurrent sync run per database, across every
//! worker process sharing the coordination store. Contended databases are
//! skipped and reported, never queued.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use super::engine::SyncEngine;
use crate::config::SchedulerConfig;
use crate::coordination::{LeaseManager, StateStore};
use crate::database::SyncStore;
use crate::error::SyncError;
use crate::models::{RemoteDatabase, SyncRun, SyncRunType};

/// Outcome of one scheduling attempt for one database
#[derive(Debug)]
pub enum RunReport {
    /// The sync ran; the terminal run row tells how it went
    Completed(SyncRun),

    /// The database was skipped (lease contention), never queued
    Skipped {
        /// Database that was skipped
        database_id: String,
        /// Why
        reason: String,
    },
}

/// Lease-guarded sync scheduling
pub struct Scheduler {
    store: Arc<dyn SyncStore>,
    engine: Arc<SyncEngine>,
    leases: LeaseManager,
    state: Arc<dyn StateStore>,
    config: SchedulerConfig,
}

impl Scheduler {
    const FORCE_PREFIX: &'static str = "force-sync:";

    /// Create a scheduler
    pub fn new(
        store: Arc<dyn SyncStore>,
        engine: Arc<SyncEngine>,
        state: Arc<dyn StateStore>,
        config: SchedulerConfig,
    ) -> Self {
        let leases = LeaseManager::new(
            Arc::clone(&state),
            std::time::Duration::from_secs(config.lease_ttl_secs),
        );
        Self {
            store,
            engine,
            leases,
            state,
            config,
        }
    }

    fn force_key(database_id: &str) -> String {
        format!("{}{}", Self::FORCE_PREFIX, database_id)
    }

    /// Mark a database for immediate sync on the next tick, regardless of
    /// its interval. The marker expires on its own.
    pub async fn force_sync(&self, database_id: &str) -> Result<(), SyncError> {
        self.state
            .put(
                &Self::force_key(database_id),
                "1",
                std::time::Duration::from_secs(self.config.force_marker_ttl_secs),
            )
            .await?;
        info!(database = database_id, "Force-sync marker set");
        Ok(())
    }

    async fn is_force_marked(&self, database_id: &str) -> Result<bool, SyncError> {
        Ok(self
            .state
            .get(&Self::force_key(database_id))
            .await?
            .is_some())
    }

    /// Select the active databases due for sync at `now`
    ///
    /// Due means never synced, interval elapsed, or force-marked. Databases
    /// with a non-terminal run started within the stuck-run window are
    /// excluded: such a run is treated as legitimately in progress, while an
    /// older one is considered stuck and no longer blocks scheduling (its
    /// lease has long expired).
    pub async fn select_due(&self, now: DateTime<Utc>) -> Result<Vec<RemoteDatabase>, SyncError> {
        let mut due = Vec::new();
        let cutoff = now - Duration::seconds(self.config.stuck_run_age_secs as i64);

        for database in self.store.list_active_databases().await? {
            let forced = self.is_force_marked(&database.id).await?;
            if !forced && !database.is_due(now) {
                continue;
            }

            if self.store.has_active_run_since(&database.id, cutoff).await? {
                info!(
                    database = %database.id,
                    "Skipping: a recent run is still in progress"
                );
                continue;
            }

            due.push(database);
        }

        Ok(due)
    }

    /// Run one database under its lease
    ///
    /// The first-ever sync of a database runs full; subsequent scheduled
    /// runs are incremental. After a successful pull the engine pushes any
    /// locally-dirty pages. The lease is released on every exit path.
    pub async fn run_one(&self, database: &RemoteDatabase) -> Result<RunReport, SyncError> {
        let run_type = if database.last_synced_at.is_none() {
            SyncRunType::Full
        } else {
            SyncRunType::Scheduled
        };
        self.run_locked(database, run_type, "scheduler").await
    }

    /// Trigger a manual full sync of one database, honoring the lease
    ///
    /// Unlike scheduled runs, a contended manual trigger is an error the
    /// caller asked for explicitly, so it surfaces as
    /// [`SyncError::AlreadyRunning`] rather than a quiet skip.
    pub async fn run_manual(&self, database_id: &str) -> Result<RunReport, SyncError> {
        let database = self
            .store
            .get_database(database_id)
            .await?
            .ok_or_else(|| SyncError::DatabaseNotFound(database_id.to_string()))?;
        match self.run_locked(&database, SyncRunType::Manual, "manual").await? {
            RunReport::Skipped { database_id, .. } => Err(SyncError::AlreadyRunning(database_id)),
            report => Ok(report),
        }
    }

    async fn run_locked(
        &self,
        database: &RemoteDatabase,
        run_type: SyncRunType,
        actor: &str,
    ) -> Result<RunReport, SyncError> {
        let lease = match self.leases.acquire(&format!("sync:{}", database.id)).await? {
            Some(lease) => lease,
            None => {
                info!(database = %database.id, "Skipping: sync lease held elsewhere");
                return Ok(RunReport::Skipped {
                    database_id: database.id.clone(),
                    reason: "sync lease held by another run".to_string(),
                });
            }
        };

        let result = async {
            let run = self
                .engine
                .sync_database(&database.id, run_type, actor)
                .await?;

            if run.is_terminal() && run.status != crate::models::SyncRunStatus::Failed {
                if let Err(err) = self.engine.push_local_changes(&database.id).await {
                    warn!(database = %database.id, error = %err, "Push pass failed");
                }
            }
            Ok::<SyncRun, SyncError>(run)
        }
        .await;

        // Consume the force marker and release the lease on every exit path
        if let Err(err) = self.state.delete(&Self::force_key(&database.id)).await {
            warn!(database = %database.id, error = %err, "Failed to clear force marker");
        }
        if let Err(err) = self.leases.release(&lease).await {
            warn!(database = %database.id, error = %err, "Failed to release sync lease");
        }

        result.map(RunReport::Completed)
    }

    /// One scheduling pass: select due databases and run each in turn
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<Vec<RunReport>, SyncError> {
        let due = self.select_due(now).await?;
        info!(due = due.len(), "Scheduler tick");

        let mut reports = Vec::new();
        for database in due {
            match self.run_one(&database).await {
                Ok(report) => reports.push(report),
                Err(err) => {
                    warn!(database = %database.id, error = %err, "Scheduled sync errored");
                    reports.push(RunReport::Skipped {
                        database_id: database.id.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        Ok(reports)
    }
}
