//! Wire types for the workspace API
//!
//! These structs mirror the remote JSON contract (camelCase keys). They
//! carry no local bookkeeping; conversion into domain models happens in the
//! sync engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{Block, PropertyKind, PropertyValue, RichText};

/// Reference to a remote user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserRef {
    /// User identifier
    pub id: String,
}

/// One page as returned by the remote service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagePayload {
    /// Page identifier
    pub id: String,

    /// Owning database, when the page lives in one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ParentRef>,

    /// Typed property values by property name
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,

    /// Creation timestamp (ISO-8601 UTC)
    pub created_time: DateTime<Utc>,

    /// Last-edit timestamp (ISO-8601 UTC)
    pub last_edited_time: DateTime<Utc>,

    /// Creating user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<UserRef>,

    /// Last-editing user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_edited_by: Option<UserRef>,

    /// Whether the page is archived on the remote side
    #[serde(default)]
    pub archived: bool,
}

impl PagePayload {
    /// Flattened title text, from the first title-typed property
    pub fn title_text(&self) -> String {
        self.properties
            .values()
            .find_map(|v| match v {
                PropertyValue::Title(_) => v.as_plain_text(),
                _ => None,
            })
            .unwrap_or_default()
    }
}

/// Paginated query response envelope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    /// Result page
    #[serde(default)]
    pub results: Vec<PagePayload>,

    /// Whether another page of results exists
    #[serde(default)]
    pub has_more: bool,

    /// Cursor for the next page, when `has_more`
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// Query parameters for a database enumeration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    /// Remote-side filter expression, passed through opaquely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<serde_json::Value>,

    /// Remote-side sort expression, passed through opaquely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sorts: Option<serde_json::Value>,

    /// Pagination cursor from a previous response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_cursor: Option<String>,

    /// Page size (the remote caps this at 100)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
}

impl QueryRequest {
    /// A plain enumeration request with the given page size
    pub fn page_sized(page_size: u32) -> Self {
        Self {
            page_size: Some(page_size),
            ..Self::default()
        }
    }

    /// Continue a paginated enumeration from a cursor
    pub fn with_cursor(mut self, cursor: Option<String>) -> Self {
        self.start_cursor = cursor;
        self
    }
}

/// Property descriptor in a database schema payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    /// Property identifier
    #[serde(default)]
    pub id: Option<String>,

    /// The property type tag
    #[serde(rename = "type")]
    pub kind: String,
}

/// Database metadata as returned by the remote service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabasePayload {
    /// Database identifier
    pub id: String,

    /// Database title fragments
    #[serde(default)]
    pub title: Vec<RichText>,

    /// Property schema by property name
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyDescriptor>,
}

impl DatabasePayload {
    /// Flattened title text
    pub fn title_text(&self) -> String {
        self.title
            .iter()
            .map(|f| f.plain_text.as_str())
            .collect::<Vec<_>>()
            .join("")
    }

    /// The schema as local type descriptors; unrecognized types degrade to
    /// [`PropertyKind::Unknown`]
    pub fn schema(&self) -> BTreeMap<String, PropertyKind> {
        self.properties
            .iter()
            .map(|(name, desc)| {
                let kind = desc.kind.parse().unwrap_or(PropertyKind::Unknown);
                (name.clone(), kind)
            })
            .collect()
    }
}

/// Paginated block-children response envelope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockListResponse {
    /// Block payloads, kept raw until conversion
    #[serde(default)]
    pub results: Vec<serde_json::Value>,

    /// Whether another page of blocks exists
    #[serde(default)]
    pub has_more: bool,

    /// Cursor for the next page, when `has_more`
    #[serde(default)]
    pub next_cursor: Option<String>,
}

impl BlockListResponse {
    /// Convert the raw payloads into local blocks; entries without a type
    /// tag are skipped
    pub fn blocks(&self) -> Vec<Block> {
        self.results.iter().filter_map(block_from_value).collect()
    }
}

/// Convert one raw block payload into a local [`Block`]
///
/// The text content lives under `payload[type].richText` as rich-text
/// fragments; anything else flattens to an empty string.
fn block_from_value(value: &serde_json::Value) -> Option<Block> {
    let kind = value.get("type")?.as_str()?.to_string();
    let plain_text = value
        .get(&kind)
        .and_then(|body| body.get("richText"))
        .and_then(|rt| rt.as_array())
        .map(|fragments| {
            fragments
                .iter()
                .filter_map(|f| f.get("plainText").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    Some(Block {
        id: value
            .get("id")
            .and_then(|id| id.as_str())
            .map(String::from),
        kind,
        plain_text,
    })
}

/// Parent reference for page creation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentRef {
    /// Owning database identifier
    pub database_id: String,
}

/// Request body for page creation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePageRequest {
    /// Where the page is created
    pub parent: ParentRef,

    /// Initial property values
    pub properties: BTreeMap<String, PropertyValue>,

    /// Initial content blocks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Block>>,
}

/// Request body for page update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePageRequest {
    /// Property values to write
    pub properties: BTreeMap<String, PropertyValue>,

    /// Archive flag; `Some(true)` archives the page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived: Option<bool>,
}

/// Request body for full-text search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    /// Search query text
    pub query: String,

    /// Remote-side filter expression, passed through opaquely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<serde_json::Value>,

    /// Pagination cursor from a previous response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_cursor: Option<String>,
}

/// Error body shape the remote service returns alongside non-2xx statuses
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Human-readable message
    #[serde(default)]
    pub message: Option<String>,

    /// Machine-readable error code
    #[serde(default)]
    pub error_code: Option<String>,

    /// Offending field for validation failures
    #[serde(default)]
    pub field: Option<String>,
}
