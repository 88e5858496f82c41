//! Local persistence layer for workspace-sync
//!
//! This module defines the [`SyncStore`] trait and its SQLite
//! implementation. The store holds the durable state that must survive
//! process restarts: registered databases with their cached schemas, cached
//! pages (properties, content, hash, dirty flag, conflicts), and the full
//! sync run history.

pub mod migrations;
pub mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::error::DbError;
use crate::models::{PropertyKind, RemoteDatabase, RemotePage, SyncRun};

/// Persistence trait for sync state
///
/// This trait defines all database operations needed by the sync engine,
/// scheduler, and monitor. It uses `async_trait` for async methods and
/// `mockall::automock` for testing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SyncStore: Send + Sync {
    // =========================================================================
    // Registered database operations
    // =========================================================================

    /// Insert or replace a registered database
    async fn upsert_database(&self, database: &RemoteDatabase) -> Result<(), DbError>;

    /// Get a registered database by local id
    async fn get_database(&self, id: &str) -> Result<Option<RemoteDatabase>, DbError>;

    /// Get a registered database by its remote identifier
    async fn get_database_by_remote_id(
        &self,
        remote_id: &str,
    ) -> Result<Option<RemoteDatabase>, DbError>;

    /// List all active registered databases
    async fn list_active_databases(&self) -> Result<Vec<RemoteDatabase>, DbError>;

    /// Record a successful sync completion time
    async fn set_database_synced(&self, id: &str, at: DateTime<Utc>) -> Result<(), DbError>;

    /// Refresh the cached title and schema
    async fn update_database_schema(
        &self,
        id: &str,
        title: &str,
        schema: &BTreeMap<String, PropertyKind>,
    ) -> Result<(), DbError>;

    /// Activate or deactivate a database
    async fn set_database_active(&self, id: &str, active: bool) -> Result<(), DbError>;

    // =========================================================================
    // Page cache operations
    // =========================================================================

    /// Insert or replace a cached page
    async fn upsert_page(&self, page: &RemotePage) -> Result<(), DbError>;

    /// Get a cached page
    async fn get_page(
        &self,
        database_id: &str,
        remote_id: &str,
    ) -> Result<Option<RemotePage>, DbError>;

    /// List all cached pages of a database
    async fn list_pages(&self, database_id: &str) -> Result<Vec<RemotePage>, DbError>;

    /// List pages that are dirty and active (push candidates)
    async fn list_dirty_pages(&self, database_id: &str) -> Result<Vec<RemotePage>, DbError>;

    /// Soft-delete pages of a database whose remote id is not in `seen`.
    ///
    /// Draft pages are spared: they exist only locally and cannot appear in
    /// a remote enumeration. Returns the number of pages marked deleted.
    async fn mark_pages_deleted_except(
        &self,
        database_id: &str,
        seen: &[String],
    ) -> Result<u64, DbError>;

    // =========================================================================
    // Sync run operations
    // =========================================================================

    /// Append a new sync run
    async fn insert_sync_run(&self, run: &SyncRun) -> Result<(), DbError>;

    /// Update an existing sync run (status, counters, errors)
    async fn update_sync_run(&self, run: &SyncRun) -> Result<(), DbError>;

    /// Get a sync run by id
    async fn get_sync_run(&self, id: &str) -> Result<Option<SyncRun>, DbError>;

    /// Most recent run for a database, by start time
    async fn latest_sync_run(&self, database_id: &str) -> Result<Option<SyncRun>, DbError>;

    /// Recent runs for a database, newest first
    async fn list_runs_for_database(
        &self,
        database_id: &str,
        limit: u32,
    ) -> Result<Vec<SyncRun>, DbError>;

    /// All runs started at or after `since`, across databases
    async fn list_runs_since(&self, since: DateTime<Utc>) -> Result<Vec<SyncRun>, DbError>;

    /// Whether a non-terminal run started at or after `since` exists for the
    /// database
    async fn has_active_run_since(
        &self,
        database_id: &str,
        since: DateTime<Utc>,
    ) -> Result<bool, DbError>;
}
