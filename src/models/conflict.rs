//! Sync conflict records
//!
//! A `ConflictRecord` documents one resolution made when both the local and
//! remote copy of a page changed since the last sync. Records are appended
//! to the page's conflict list and act as the audit trail for the resolver's
//! decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which side a resolution selected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictWinner {
    /// The local copy was kept
    Local,
    /// The remote copy was applied
    Remote,
}

impl std::fmt::Display for ConflictWinner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictWinner::Local => write!(f, "local"),
            ConflictWinner::Remote => write!(f, "remote"),
        }
    }
}

/// Recorded conflict resolved by strategy (e.g. last-writer-wins)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// Page involved in the conflict
    pub page_id: String,

    /// Field the resolution applied to; None for a record-level resolution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    /// Local copy's last-modified timestamp when the conflict occurred
    pub local_edited_at: DateTime<Utc>,

    /// Remote copy's last-modified timestamp when the conflict occurred
    pub remote_edited_at: DateTime<Utc>,

    /// Side that won
    pub winner: ConflictWinner,

    /// Resolution strategy name
    pub strategy: String,

    /// When the resolution was made
    pub resolved_at: DateTime<Utc>,
}

impl ConflictRecord {
    /// Record a record-level resolution
    pub fn record_level(
        page_id: impl Into<String>,
        local_edited_at: DateTime<Utc>,
        remote_edited_at: DateTime<Utc>,
        winner: ConflictWinner,
        strategy: impl Into<String>,
    ) -> Self {
        Self {
            page_id: page_id.into(),
            field: None,
            local_edited_at,
            remote_edited_at,
            winner,
            strategy: strategy.into(),
            resolved_at: Utc::now(),
        }
    }

    /// Record a field-level resolution
    pub fn field_level(
        page_id: impl Into<String>,
        field: impl Into<String>,
        local_edited_at: DateTime<Utc>,
        remote_edited_at: DateTime<Utc>,
        winner: ConflictWinner,
        strategy: impl Into<String>,
    ) -> Self {
        Self {
            field: Some(field.into()),
            ..Self::record_level(page_id, local_edited_at, remote_edited_at, winner, strategy)
        }
    }
}
