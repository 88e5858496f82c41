//! Registered remote database model
//!
//! A `RemoteDatabase` is a remote container of records that has been
//! registered for synchronization. Its property schema is cached locally and
//! refreshed opportunistically at the start of each sync run.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Type descriptor for one property in a remote database schema
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PropertyKind {
    /// Page title
    Title,
    /// Formatted text fragments
    RichText,
    /// Numeric value
    Number,
    /// Single-choice option
    Select,
    /// Multi-choice options
    MultiSelect,
    /// Date or date range
    Date,
    /// Boolean flag
    Checkbox,
    /// URL string
    Url,
    /// Email address
    Email,
    /// Phone number
    PhoneNumber,
    /// Workflow status option
    Status,
    /// Computed value
    Formula,
    /// Aggregated value over a relation
    Rollup,
    /// Any type this client does not model
    #[default]
    Unknown,
}

impl std::fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PropertyKind::Title => "title",
            PropertyKind::RichText => "richText",
            PropertyKind::Number => "number",
            PropertyKind::Select => "select",
            PropertyKind::MultiSelect => "multiSelect",
            PropertyKind::Date => "date",
            PropertyKind::Checkbox => "checkbox",
            PropertyKind::Url => "url",
            PropertyKind::Email => "email",
            PropertyKind::PhoneNumber => "phoneNumber",
            PropertyKind::Status => "status",
            PropertyKind::Formula => "formula",
            PropertyKind::Rollup => "rollup",
            PropertyKind::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for PropertyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "title" => Ok(PropertyKind::Title),
            "richText" => Ok(PropertyKind::RichText),
            "number" => Ok(PropertyKind::Number),
            "select" => Ok(PropertyKind::Select),
            "multiSelect" => Ok(PropertyKind::MultiSelect),
            "date" => Ok(PropertyKind::Date),
            "checkbox" => Ok(PropertyKind::Checkbox),
            "url" => Ok(PropertyKind::Url),
            "email" => Ok(PropertyKind::Email),
            "phoneNumber" => Ok(PropertyKind::PhoneNumber),
            "status" => Ok(PropertyKind::Status),
            "formula" => Ok(PropertyKind::Formula),
            "rollup" => Ok(PropertyKind::Rollup),
            _ => Ok(PropertyKind::Unknown),
        }
    }
}

/// A registered remote database
///
/// Never deleted, only deactivated: a deactivated database stops being
/// scheduled but keeps its cached pages and run history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDatabase {
    /// Local identifier
    pub id: String,

    /// Identifier on the remote service
    pub remote_id: String,

    /// Database title, refreshed with the schema
    pub title: String,

    /// Cached property schema: property name to type descriptor
    pub schema: BTreeMap<String, PropertyKind>,

    /// Interval between scheduled syncs, in seconds
    pub sync_interval_secs: u64,

    /// When the last successful sync finished (None = never synced)
    pub last_synced_at: Option<DateTime<Utc>>,

    /// Whether this database participates in scheduling
    pub active: bool,

    /// When the registration was created
    pub created_at: DateTime<Utc>,

    /// When the registration was last modified
    pub updated_at: DateTime<Utc>,
}

impl RemoteDatabase {
    /// Default scheduled sync interval (1 hour)
    pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 3600;

    /// Register a new remote database
    pub fn new(remote_id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            remote_id: remote_id.into(),
            title: title.into(),
            schema: BTreeMap::new(),
            sync_interval_secs: Self::DEFAULT_SYNC_INTERVAL_SECS,
            last_synced_at: None,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the scheduled sync interval
    pub fn with_sync_interval(mut self, secs: u64) -> Self {
        self.sync_interval_secs = secs;
        self
    }

    /// Set the cached schema
    pub fn with_schema(mut self, schema: BTreeMap<String, PropertyKind>) -> Self {
        self.schema = schema;
        self
    }

    /// Whether a scheduled sync is due at `now`
    ///
    /// A database that has never synced is always due.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_synced_at {
            None => true,
            Some(last) => now - last >= Duration::seconds(self.sync_interval_secs as i64),
        }
    }

    /// Whether `schema` differs from the cached one
    pub fn schema_drifted(&self, schema: &BTreeMap<String, PropertyKind>) -> bool {
        &self.schema != schema
    }
}
