//! Database migrations for workspace-sync
//!
//! This module contains SQL migrations for the SQLite database schema.

/// SQL statement to create the initial database schema
pub const CREATE_SCHEMA: &str = r#"
-- Registered remote databases
CREATE TABLE IF NOT EXISTS databases (
    id TEXT PRIMARY KEY,
    remote_id TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    schema TEXT NOT NULL DEFAULT '{}',
    sync_interval_secs INTEGER NOT NULL DEFAULT 3600,
    last_synced_at TEXT,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_databases_active ON databases(active);

-- Cached remote pages
CREATE TABLE IF NOT EXISTS pages (
    database_id TEXT NOT NULL,
    remote_id TEXT NOT NULL,
    title TEXT NOT NULL DEFAULT '',
    properties TEXT NOT NULL DEFAULT '{}',
    content TEXT NOT NULL DEFAULT '[]',
    remote_created_at TEXT NOT NULL,
    remote_edited_at TEXT NOT NULL,
    created_by TEXT,
    last_edited_by TEXT,
    local_edited_at TEXT,
    local_hash TEXT NOT NULL,
    dirty INTEGER NOT NULL DEFAULT 0,
    conflicts TEXT NOT NULL DEFAULT '[]',
    status TEXT NOT NULL DEFAULT 'active',
    PRIMARY KEY (database_id, remote_id)
);

CREATE INDEX IF NOT EXISTS idx_pages_dirty ON pages(database_id, dirty);
CREATE INDEX IF NOT EXISTS idx_pages_status ON pages(database_id, status);

-- Sync run history (append-only audit trail)
CREATE TABLE IF NOT EXISTS sync_runs (
    id TEXT PRIMARY KEY,
    database_id TEXT NOT NULL,
    run_type TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'started',
    total_pages INTEGER NOT NULL DEFAULT 0,
    pages_created INTEGER NOT NULL DEFAULT 0,
    pages_updated INTEGER NOT NULL DEFAULT 0,
    pages_deleted INTEGER NOT NULL DEFAULT 0,
    pages_failed INTEGER NOT NULL DEFAULT 0,
    errors TEXT NOT NULL DEFAULT '[]',
    error_message TEXT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    triggered_by TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_runs_database ON sync_runs(database_id, started_at DESC);
CREATE INDEX IF NOT EXISTS idx_runs_started ON sync_runs(started_at);
"#;

/// Get the migration version
pub fn migration_version() -> i32 {
    1
}
