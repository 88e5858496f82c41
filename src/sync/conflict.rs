//! Conflict resolution
//!
//! When both the local and remote copy of a page changed since the last
//! sync, the resolver decides which side wins. The record-level strategy is
//! last-writer-wins by timestamp, with ties resolving to the local side (a
//! fixed, documented policy). [`ConflictResolver::merge_changes`] offers an
//! optional field-level strategy for callers that track per-field edit
//! times.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::models::{ConflictRecord, ConflictWinner, PropertyValue, RemotePage};

/// Strategy name recorded for record-level resolutions
pub const STRATEGY_LAST_WRITER_WINS: &str = "last_writer_wins";

/// Strategy name recorded for field-level resolutions
pub const STRATEGY_FIELD_MERGE: &str = "field_merge";

/// Per-field edit timestamps for the optional merge strategy
#[derive(Debug, Clone, Default)]
pub struct FieldTimestamps {
    /// Local per-field edit times
    pub local: BTreeMap<String, DateTime<Utc>>,

    /// Remote per-field edit times
    pub remote: BTreeMap<String, DateTime<Utc>>,
}

/// Result of a field-level merge
#[derive(Debug, Clone)]
pub struct MergedProperties {
    /// The merged property set
    pub properties: BTreeMap<String, PropertyValue>,

    /// One record per field whose sides disagreed
    pub conflicts: Vec<ConflictRecord>,
}

/// Decides which side wins when both copies changed
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver;

impl ConflictResolver {
    /// Create a resolver
    pub fn new() -> Self {
        Self
    }

    /// Record-level last-writer-wins: the side with the strictly greater
    /// timestamp wins; equal timestamps resolve to the local side.
    pub fn resolve(
        &self,
        local_edited_at: DateTime<Utc>,
        remote_edited_at: DateTime<Utc>,
    ) -> ConflictWinner {
        if remote_edited_at > local_edited_at {
            ConflictWinner::Remote
        } else {
            ConflictWinner::Local
        }
    }

    /// Resolve a dirty local page against a newer remote edit, producing the
    /// audit record for the page's conflict list
    pub fn resolve_page(
        &self,
        page: &RemotePage,
        remote_edited_at: DateTime<Utc>,
    ) -> ConflictRecord {
        let local_edited_at = page.effective_edited_at();
        let winner = self.resolve(local_edited_at, remote_edited_at);
        ConflictRecord::record_level(
            &page.remote_id,
            local_edited_at,
            remote_edited_at,
            winner,
            STRATEGY_LAST_WRITER_WINS,
        )
    }

    /// Field-level merge: for each property, pick the side with the more
    /// recent per-field timestamp, falling back to the record-level
    /// resolution when per-field timestamps are unavailable for that field.
    ///
    /// Fields present on only one side are taken as-is; fields whose values
    /// agree produce no conflict record.
    pub fn merge_changes(
        &self,
        page_id: &str,
        local: &BTreeMap<String, PropertyValue>,
        local_edited_at: DateTime<Utc>,
        remote: &BTreeMap<String, PropertyValue>,
        remote_edited_at: DateTime<Utc>,
        field_timestamps: &FieldTimestamps,
    ) -> MergedProperties {
        let record_level = self.resolve(local_edited_at, remote_edited_at);

        let mut names: Vec<&String> = local.keys().chain(remote.keys()).collect();
        names.sort();
        names.dedup();

        let mut properties = BTreeMap::new();
        let mut conflicts = Vec::new();

        for name in names {
            match (local.get(name), remote.get(name)) {
                (Some(value), None) => {
                    properties.insert(name.clone(), value.clone());
                }
                (None, Some(value)) => {
                    properties.insert(name.clone(), value.clone());
                }
                (Some(local_value), Some(remote_value)) => {
                    if local_value == remote_value {
                        properties.insert(name.clone(), local_value.clone());
                        continue;
                    }

                    let field_local = field_timestamps.local.get(name);
                    let field_remote = field_timestamps.remote.get(name);
                    let (winner, strategy, local_at, remote_at) =
                        match (field_local, field_remote) {
                            (Some(l), Some(r)) => {
                                (self.resolve(*l, *r), STRATEGY_FIELD_MERGE, *l, *r)
                            }
                            _ => (
                                record_level,
                                STRATEGY_LAST_WRITER_WINS,
                                local_edited_at,
                                remote_edited_at,
                            ),
                        };

                    let value = match winner {
                        ConflictWinner::Local => local_value.clone(),
                        ConflictWinner::Remote => remote_value.clone(),
                    };
                    properties.insert(name.clone(), value);
                    conflicts.push(ConflictRecord::field_level(
                        page_id, name, local_at, remote_at, winner, strategy,
                    ));
                }
                (None, None) => unreachable!("name came from one of the maps"),
            }
        }

        MergedProperties {
            properties,
            conflicts,
        }
    }
}
