//! Sync run audit records
//!
//! A `SyncRun` is an append-only history record of one synchronization
//! attempt. Runs are immutable once terminal, except that the error list
//! grows while a run is in progress. At-most-one non-terminal run per
//! database is enforced by the scheduler's lease, not by the record itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of synchronization a run performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncRunType {
    /// Full enumeration with deletion sweep
    Full,
    /// Full enumeration, client-side filtered to changed pages
    Incremental,
    /// Operator-triggered run
    Manual,
    /// Scheduler-triggered run
    Scheduled,
}

impl std::fmt::Display for SyncRunType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SyncRunType::Full => "full",
            SyncRunType::Incremental => "incremental",
            SyncRunType::Manual => "manual",
            SyncRunType::Scheduled => "scheduled",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for SyncRunType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(SyncRunType::Full),
            "incremental" => Ok(SyncRunType::Incremental),
            "manual" => Ok(SyncRunType::Manual),
            "scheduled" => Ok(SyncRunType::Scheduled),
            _ => Err(format!("Invalid sync run type: {}", s)),
        }
    }
}

/// Lifecycle status of a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRunStatus {
    /// Row created, work not yet begun
    Started,
    /// Enumeration and upserts underway
    InProgress,
    /// Finished with no page failures
    Completed,
    /// Aborted by a run-level infrastructure failure
    Failed,
    /// Finished, but some pages failed
    Partial,
}

impl SyncRunStatus {
    /// Whether this status admits no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncRunStatus::Completed | SyncRunStatus::Failed | SyncRunStatus::Partial
        )
    }
}

impl std::fmt::Display for SyncRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SyncRunStatus::Started => "started",
            SyncRunStatus::InProgress => "in_progress",
            SyncRunStatus::Completed => "completed",
            SyncRunStatus::Failed => "failed",
            SyncRunStatus::Partial => "partial",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for SyncRunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(SyncRunStatus::Started),
            "in_progress" => Ok(SyncRunStatus::InProgress),
            "completed" => Ok(SyncRunStatus::Completed),
            "failed" => Ok(SyncRunStatus::Failed),
            "partial" => Ok(SyncRunStatus::Partial),
            _ => Err(format!("Invalid sync run status: {}", s)),
        }
    }
}

/// One page-level failure recorded during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageError {
    /// Remote id of the page that failed
    pub page_id: String,

    /// What went wrong
    pub message: String,
}

/// Page counters aggregated over a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRunCounters {
    /// Pages enumerated from the remote side
    pub total_pages: u32,
    /// Pages created locally
    pub pages_created: u32,
    /// Pages updated locally
    pub pages_updated: u32,
    /// Pages soft-deleted by the enumeration sweep
    pub pages_deleted: u32,
    /// Pages that raised an error
    pub pages_failed: u32,
}

/// Audit record of one synchronization attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRun {
    /// Run identifier
    pub id: String,

    /// Database this run synchronized
    pub database_id: String,

    /// Run type
    pub run_type: SyncRunType,

    /// Lifecycle status
    pub status: SyncRunStatus,

    /// Aggregated page counters
    pub counters: SyncRunCounters,

    /// Ordered per-page failures
    #[serde(default)]
    pub errors: Vec<PageError>,

    /// Run-level failure message, set when status is `Failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// When the run was created
    pub started_at: DateTime<Utc>,

    /// When the run reached a terminal status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Triggering actor (scheduler, webhook, an operator id)
    pub triggered_by: String,
}

impl SyncRun {
    /// Create a run in `Started` state
    pub fn new(
        database_id: impl Into<String>,
        run_type: SyncRunType,
        triggered_by: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            database_id: database_id.into(),
            run_type,
            status: SyncRunStatus::Started,
            counters: SyncRunCounters::default(),
            errors: Vec::new(),
            error_message: None,
            started_at: Utc::now(),
            finished_at: None,
            triggered_by: triggered_by.into(),
        }
    }

    /// Transition to `InProgress`
    pub fn begin(&mut self) {
        self.status = SyncRunStatus::InProgress;
    }

    /// Record a page-level failure; keeps `pages_failed` in step with the
    /// error list
    pub fn record_page_error(&mut self, page_id: impl Into<String>, message: impl Into<String>) {
        self.errors.push(PageError {
            page_id: page_id.into(),
            message: message.into(),
        });
        self.counters.pages_failed += 1;
    }

    /// Finalize as `Completed`, or `Partial` when any page failed
    pub fn complete(&mut self, counters: SyncRunCounters) {
        self.counters = SyncRunCounters {
            pages_failed: self.counters.pages_failed,
            ..counters
        };
        self.status = if self.counters.pages_failed > 0 {
            SyncRunStatus::Partial
        } else {
            SyncRunStatus::Completed
        };
        self.finished_at = Some(Utc::now());
    }

    /// Finalize as `Failed` with a run-level message
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = SyncRunStatus::Failed;
        self.error_message = Some(message.into());
        self.finished_at = Some(Utc::now());
    }

    /// Whether the run has reached a terminal status
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Wall-clock duration, once terminal
    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test 1: New run starts in Started with zeroed counters
    #[test]
    fn test_new_run() {
        let run = SyncRun::new("db-1", SyncRunType::Full, "scheduler");

        assert_eq!(run.database_id, "db-1");
        assert_eq!(run.run_type, SyncRunType::Full);
        assert_eq!(run.status, SyncRunStatus::Started);
        assert_eq!(run.counters, SyncRunCounters::default());
        assert!(run.errors.is_empty());
        assert!(run.finished_at.is_none());
        assert!(!run.is_terminal());
    }

    // Test 2: Completion without page failures is Completed
    #[test]
    fn test_complete_without_failures() {
        let mut run = SyncRun::new("db-1", SyncRunType::Full, "scheduler");
        run.begin();
        run.complete(SyncRunCounters {
            total_pages: 10,
            pages_created: 3,
            pages_updated: 7,
            pages_deleted: 0,
            pages_failed: 0,
        });

        assert_eq!(run.status, SyncRunStatus::Completed);
        assert!(run.is_terminal());
        assert!(run.finished_at.is_some());
        assert!(run.duration_ms().is_some());
    }

    // Test 3: Completion with page failures is Partial
    #[test]
    fn test_complete_with_failures_is_partial() {
        let mut run = SyncRun::new("db-1", SyncRunType::Incremental, "scheduler");
        run.begin();
        run.record_page_error("page-7", "invalid payload");
        run.complete(SyncRunCounters {
            total_pages: 10,
            pages_created: 0,
            pages_updated: 9,
            pages_deleted: 0,
            pages_failed: 0,
        });

        assert_eq!(run.status, SyncRunStatus::Partial);
        // The recorded error survives the counter merge
        assert_eq!(run.counters.pages_failed, 1);
        assert_eq!(run.errors.len(), 1);
        assert_eq!(run.errors[0].page_id, "page-7");
    }

    // Test 4: Run-level failure
    #[test]
    fn test_fail() {
        let mut run = SyncRun::new("db-1", SyncRunType::Full, "operator:42");
        run.begin();
        run.fail("remote enumeration failed: HTTP 503");

        assert_eq!(run.status, SyncRunStatus::Failed);
        assert!(run.is_terminal());
        assert_eq!(
            run.error_message.as_deref(),
            Some("remote enumeration failed: HTTP 503")
        );
    }

    // Test 5: pages_failed never exceeds the error list driving it
    #[test]
    fn test_failed_counter_tracks_error_list() {
        let mut run = SyncRun::new("db-1", SyncRunType::Full, "scheduler");
        run.begin();
        for i in 0..4 {
            run.record_page_error(format!("page-{}", i), "boom");
        }

        assert_eq!(run.counters.pages_failed, 4);
        assert_eq!(run.errors.len(), 4);
    }

    // Test 6: Status and type round-trip through Display/FromStr
    #[test]
    fn test_enum_round_trips() {
        for status in [
            SyncRunStatus::Started,
            SyncRunStatus::InProgress,
            SyncRunStatus::Completed,
            SyncRunStatus::Failed,
            SyncRunStatus::Partial,
        ] {
            let parsed: SyncRunStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }

        for run_type in [
            SyncRunType::Full,
            SyncRunType::Incremental,
            SyncRunType::Manual,
            SyncRunType::Scheduled,
        ] {
            let parsed: SyncRunType = run_type.to_string().parse().unwrap();
            assert_eq!(parsed, run_type);
        }
    }

    // Test 7: Terminal statuses
    #[test]
    fn test_terminal_statuses() {
        assert!(!SyncRunStatus::Started.is_terminal());
        assert!(!SyncRunStatus::InProgress.is_terminal());
        assert!(SyncRunStatus::Completed.is_terminal());
        assert!(SyncRunStatus::Failed.is_terminal());
        assert!(SyncRunStatus::Partial.is_terminal());
    }

    // Test 8: SyncRun serde round-trip
    #[test]
    fn test_sync_run_round_trip() {
        let mut run = SyncRun::new("db-1", SyncRunType::Scheduled, "scheduler");
        run.begin();
        run.record_page_error("page-1", "boom");

        let json = serde_json::to_string(&run).unwrap();
        let back: SyncRun = serde_json::from_str(&json).unwrap();
        assert_eq!(back, run);
    }
}
