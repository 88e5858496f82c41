//! SQLite implementation of the SyncStore trait
//!
//! Uses rusqlite through tokio-rusqlite so blocking SQLite work stays off
//! the async runtime. Structured columns (schema, properties, content,
//! conflicts, errors) are stored as JSON text; timestamps as RFC 3339
//! strings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::OptionalExtension;
use std::collections::BTreeMap;
use tokio_rusqlite::Connection;

use super::migrations::CREATE_SCHEMA;
use super::SyncStore;
use crate::error::DbError;
use crate::models::{
    PropertyKind, RemoteDatabase, RemotePage, SyncRun, SyncRunCounters,
};

/// SQLite-backed sync store
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (and migrate) a database at `path`
    ///
    /// Use `:memory:` for an in-memory database or a file path for
    /// persistent storage.
    pub async fn new(path: &str) -> Result<Self, DbError> {
        let conn = Connection::open(path).await?;

        conn.call(|conn| {
            conn.execute_batch(CREATE_SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    /// Create a new in-memory store (useful for testing)
    pub async fn in_memory() -> Result<Self, DbError> {
        Self::new(":memory:").await
    }
}

fn box_err(message: String) -> Box<dyn std::error::Error + Send + Sync> {
    message.into()
}

fn datetime_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn opt_datetime_col(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(None),
    }
}

fn json_col<T: serde::de::DeserializeOwned>(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parsed_col<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, box_err(e)))
}

fn database_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RemoteDatabase> {
    Ok(RemoteDatabase {
        id: row.get(0)?,
        remote_id: row.get(1)?,
        title: row.get(2)?,
        schema: json_col::<BTreeMap<String, PropertyKind>>(row, 3)?,
        sync_interval_secs: row.get::<_, i64>(4)? as u64,
        last_synced_at: opt_datetime_col(row, 5)?,
        active: row.get::<_, i64>(6)? != 0,
        created_at: datetime_col(row, 7)?,
        updated_at: datetime_col(row, 8)?,
    })
}

const DATABASE_COLUMNS: &str = "id, remote_id, title, schema, sync_interval_secs, \
     last_synced_at, active, created_at, updated_at";

fn page_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RemotePage> {
    Ok(RemotePage {
        database_id: row.get(0)?,
        remote_id: row.get(1)?,
        title: row.get(2)?,
        properties: json_col(row, 3)?,
        content: json_col(row, 4)?,
        remote_created_at: datetime_col(row, 5)?,
        remote_edited_at: datetime_col(row, 6)?,
        created_by: row.get(7)?,
        last_edited_by: row.get(8)?,
        local_edited_at: opt_datetime_col(row, 9)?,
        local_hash: row.get(10)?,
        dirty: row.get::<_, i64>(11)? != 0,
        conflicts: json_col(row, 12)?,
        status: parsed_col(row, 13)?,
    })
}

const PAGE_COLUMNS: &str = "database_id, remote_id, title, properties, content, \
     remote_created_at, remote_edited_at, created_by, last_edited_by, \
     local_edited_at, local_hash, dirty, conflicts, status";

fn run_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncRun> {
    Ok(SyncRun {
        id: row.get(0)?,
        database_id: row.get(1)?,
        run_type: parsed_col(row, 2)?,
        status: parsed_col(row, 3)?,
        counters: SyncRunCounters {
            total_pages: row.get::<_, i64>(4)? as u32,
            pages_created: row.get::<_, i64>(5)? as u32,
            pages_updated: row.get::<_, i64>(6)? as u32,
            pages_deleted: row.get::<_, i64>(7)? as u32,
            pages_failed: row.get::<_, i64>(8)? as u32,
        },
        errors: json_col(row, 9)?,
        error_message: row.get(10)?,
        started_at: datetime_col(row, 11)?,
        finished_at: opt_datetime_col(row, 12)?,
        triggered_by: row.get(13)?,
    })
}

const RUN_COLUMNS: &str = "id, database_id, run_type, status, total_pages, pages_created, \
     pages_updated, pages_deleted, pages_failed, errors, error_message, \
     started_at, finished_at, triggered_by";

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, DbError> {
    serde_json::to_string(value).map_err(|e| DbError::Corrupt(e.to_string()))
}

#[async_trait]
impl SyncStore for SqliteStore {
    // =========================================================================
    // Registered database operations
    // =========================================================================

    async fn upsert_database(&self, database: &RemoteDatabase) -> Result<(), DbError> {
        let id = database.id.clone();
        let remote_id = database.remote_id.clone();
        let title = database.title.clone();
        let schema = to_json(&database.schema)?;
        let sync_interval_secs = database.sync_interval_secs as i64;
        let last_synced_at = database.last_synced_at.map(|dt| dt.to_rfc3339());
        let active = database.active as i64;
        let created_at = database.created_at.to_rfc3339();
        let updated_at = database.updated_at.to_rfc3339();

        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"
                    INSERT OR REPLACE INTO databases
                    (id, remote_id, title, schema, sync_interval_secs,
                     last_synced_at, active, created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                    "#,
                    rusqlite::params![
                        id,
                        remote_id,
                        title,
                        schema,
                        sync_interval_secs,
                        last_synced_at,
                        active,
                        created_at,
                        updated_at
                    ],
                )?;
                Ok(())
            })
            .await?;

        Ok(())
    }

    async fn get_database(&self, id: &str) -> Result<Option<RemoteDatabase>, DbError> {
        let id = id.to_string();

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM databases WHERE id = ?1",
                    DATABASE_COLUMNS
                ))?;
                let result = stmt.query_row([&id], database_from_row).optional()?;
                Ok(result)
            })
            .await
            .map_err(Into::into)
    }

    async fn get_database_by_remote_id(
        &self,
        remote_id: &str,
    ) -> Result<Option<RemoteDatabase>, DbError> {
        let remote_id = remote_id.to_string();

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM databases WHERE remote_id = ?1",
                    DATABASE_COLUMNS
                ))?;
                let result = stmt.query_row([&remote_id], database_from_row).optional()?;
                Ok(result)
            })
            .await
            .map_err(Into::into)
    }

    async fn list_active_databases(&self) -> Result<Vec<RemoteDatabase>, DbError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM databases WHERE active = 1 ORDER BY title",
                    DATABASE_COLUMNS
                ))?;
                let databases = stmt
                    .query_map([], database_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(databases)
            })
            .await
            .map_err(Into::into)
    }

    async fn set_database_synced(&self, id: &str, at: DateTime<Utc>) -> Result<(), DbError> {
        let id = id.to_string();
        let at = at.to_rfc3339();
        let now = Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE databases SET last_synced_at = ?1, updated_at = ?2 WHERE id = ?3",
                    rusqlite::params![at, now, id],
                )?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    async fn update_database_schema(
        &self,
        id: &str,
        title: &str,
        schema: &BTreeMap<String, PropertyKind>,
    ) -> Result<(), DbError> {
        let id = id.to_string();
        let title = title.to_string();
        let schema = to_json(schema)?;
        let now = Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE databases SET title = ?1, schema = ?2, updated_at = ?3 WHERE id = ?4",
                    rusqlite::params![title, schema, now, id],
                )?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    async fn set_database_active(&self, id: &str, active: bool) -> Result<(), DbError> {
        let id = id.to_string();
        let active = active as i64;
        let now = Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE databases SET active = ?1, updated_at = ?2 WHERE id = ?3",
                    rusqlite::params![active, now, id],
                )?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    // =========================================================================
    // Page cache operations
    // =========================================================================

    async fn upsert_page(&self, page: &RemotePage) -> Result<(), DbError> {
        let database_id = page.database_id.clone();
        let remote_id = page.remote_id.clone();
        let title = page.title.clone();
        let properties = to_json(&page.properties)?;
        let content = to_json(&page.content)?;
        let remote_created_at = page.remote_created_at.to_rfc3339();
        let remote_edited_at = page.remote_edited_at.to_rfc3339();
        let created_by = page.created_by.clone();
        let last_edited_by = page.last_edited_by.clone();
        let local_edited_at = page.local_edited_at.map(|dt| dt.to_rfc3339());
        let local_hash = page.local_hash.clone();
        let dirty = page.dirty as i64;
        let conflicts = to_json(&page.conflicts)?;
        let status = page.status.to_string();

        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"
                    INSERT OR REPLACE INTO pages
                    (database_id, remote_id, title, properties, content,
                     remote_created_at, remote_edited_at, created_by,
                     last_edited_by, local_edited_at, local_hash, dirty,
                     conflicts, status)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                    "#,
                    rusqlite::params![
                        database_id,
                        remote_id,
                        title,
                        properties,
                        content,
                        remote_created_at,
                        remote_edited_at,
                        created_by,
                        last_edited_by,
                        local_edited_at,
                        local_hash,
                        dirty,
                        conflicts,
                        status
                    ],
                )?;
                Ok(())
            })
            .await?;

        Ok(())
    }

    async fn get_page(
        &self,
        database_id: &str,
        remote_id: &str,
    ) -> Result<Option<RemotePage>, DbError> {
        let database_id = database_id.to_string();
        let remote_id = remote_id.to_string();

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM pages WHERE database_id = ?1 AND remote_id = ?2",
                    PAGE_COLUMNS
                ))?;
                let result = stmt
                    .query_row([&database_id, &remote_id], page_from_row)
                    .optional()?;
                Ok(result)
            })
            .await
            .map_err(Into::into)
    }

    async fn list_pages(&self, database_id: &str) -> Result<Vec<RemotePage>, DbError> {
        let database_id = database_id.to_string();

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM pages WHERE database_id = ?1 ORDER BY remote_id",
                    PAGE_COLUMNS
                ))?;
                let pages = stmt
                    .query_map([&database_id], page_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(pages)
            })
            .await
            .map_err(Into::into)
    }

    async fn list_dirty_pages(&self, database_id: &str) -> Result<Vec<RemotePage>, DbError> {
        let database_id = database_id.to_string();

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM pages \
                     WHERE database_id = ?1 AND dirty = 1 AND status = 'active' \
                     ORDER BY remote_id",
                    PAGE_COLUMNS
                ))?;
                let pages = stmt
                    .query_map([&database_id], page_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(pages)
            })
            .await
            .map_err(Into::into)
    }

    async fn mark_pages_deleted_except(
        &self,
        database_id: &str,
        seen: &[String],
    ) -> Result<u64, DbError> {
        let database_id = database_id.to_string();
        let seen = seen.to_vec();

        self.conn
            .call(move |conn| {
                let count = if seen.is_empty() {
                    conn.execute(
                        "UPDATE pages SET status = 'deleted' \
                         WHERE database_id = ?1 AND status IN ('active', 'archived')",
                        [&database_id],
                    )?
                } else {
                    let placeholders = vec!["?"; seen.len()].join(", ");
                    let sql = format!(
                        "UPDATE pages SET status = 'deleted' \
                         WHERE database_id = ? AND status IN ('active', 'archived') \
                         AND remote_id NOT IN ({})",
                        placeholders
                    );
                    let mut params: Vec<&str> = vec![&database_id];
                    params.extend(seen.iter().map(String::as_str));
                    conn.execute(&sql, rusqlite::params_from_iter(params))?
                };
                Ok(count as u64)
            })
            .await
            .map_err(Into::into)
    }

    // =========================================================================
    // Sync run operations
    // =========================================================================

    async fn insert_sync_run(&self, run: &SyncRun) -> Result<(), DbError> {
        let id = run.id.clone();
        let database_id = run.database_id.clone();
        let run_type = run.run_type.to_string();
        let status = run.status.to_string();
        let counters = run.counters;
        let errors = to_json(&run.errors)?;
        let error_message = run.error_message.clone();
        let started_at = run.started_at.to_rfc3339();
        let finished_at = run.finished_at.map(|dt| dt.to_rfc3339());
        let triggered_by = run.triggered_by.clone();

        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO sync_runs
                    (id, database_id, run_type, status, total_pages, pages_created,
                     pages_updated, pages_deleted, pages_failed, errors,
                     error_message, started_at, finished_at, triggered_by)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                    "#,
                    rusqlite::params![
                        id,
                        database_id,
                        run_type,
                        status,
                        counters.total_pages as i64,
                        counters.pages_created as i64,
                        counters.pages_updated as i64,
                        counters.pages_deleted as i64,
                        counters.pages_failed as i64,
                        errors,
                        error_message,
                        started_at,
                        finished_at,
                        triggered_by
                    ],
                )?;
                Ok(())
            })
            .await?;

        Ok(())
    }

    async fn update_sync_run(&self, run: &SyncRun) -> Result<(), DbError> {
        let id = run.id.clone();
        let status = run.status.to_string();
        let counters = run.counters;
        let errors = to_json(&run.errors)?;
        let error_message = run.error_message.clone();
        let finished_at = run.finished_at.map(|dt| dt.to_rfc3339());

        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"
                    UPDATE sync_runs SET
                        status = ?1, total_pages = ?2, pages_created = ?3,
                        pages_updated = ?4, pages_deleted = ?5, pages_failed = ?6,
                        errors = ?7, error_message = ?8, finished_at = ?9
                    WHERE id = ?10
                    "#,
                    rusqlite::params![
                        status,
                        counters.total_pages as i64,
                        counters.pages_created as i64,
                        counters.pages_updated as i64,
                        counters.pages_deleted as i64,
                        counters.pages_failed as i64,
                        errors,
                        error_message,
                        finished_at,
                        id
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    async fn get_sync_run(&self, id: &str) -> Result<Option<SyncRun>, DbError> {
        let id = id.to_string();

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM sync_runs WHERE id = ?1",
                    RUN_COLUMNS
                ))?;
                let result = stmt.query_row([&id], run_from_row).optional()?;
                Ok(result)
            })
            .await
            .map_err(Into::into)
    }

    async fn latest_sync_run(&self, database_id: &str) -> Result<Option<SyncRun>, DbError> {
        let database_id = database_id.to_string();

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM sync_runs WHERE database_id = ?1 \
                     ORDER BY started_at DESC LIMIT 1",
                    RUN_COLUMNS
                ))?;
                let result = stmt.query_row([&database_id], run_from_row).optional()?;
                Ok(result)
            })
            .await
            .map_err(Into::into)
    }

    async fn list_runs_for_database(
        &self,
        database_id: &str,
        limit: u32,
    ) -> Result<Vec<SyncRun>, DbError> {
        let database_id = database_id.to_string();

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM sync_runs WHERE database_id = ?1 \
                     ORDER BY started_at DESC LIMIT ?2",
                    RUN_COLUMNS
                ))?;
                let runs = stmt
                    .query_map(
                        rusqlite::params![database_id, limit as i64],
                        run_from_row,
                    )?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(runs)
            })
            .await
            .map_err(Into::into)
    }

    async fn list_runs_since(&self, since: DateTime<Utc>) -> Result<Vec<SyncRun>, DbError> {
        let since = since.to_rfc3339();

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM sync_runs WHERE started_at >= ?1 \
                     ORDER BY started_at DESC",
                    RUN_COLUMNS
                ))?;
                let runs = stmt
                    .query_map([&since], run_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(runs)
            })
            .await
            .map_err(Into::into)
    }

    async fn has_active_run_since(
        &self,
        database_id: &str,
        since: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let database_id = database_id.to_string();
        let since = since.to_rfc3339();

        self.conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM sync_runs \
                     WHERE database_id = ?1 AND started_at >= ?2 \
                     AND status IN ('started', 'in_progress')",
                    rusqlite::params![database_id, since],
                    |row| row.get(0),
                )?;
                Ok(count > 0)
            })
            .await
            .map_err(Into::into)
    }
}
