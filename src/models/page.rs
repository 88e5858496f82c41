//! Locally cached remote page model
//!
//! A `RemotePage` is the local representation of one remote record. Property
//! values are a closed tagged union over the remote types this client
//! understands, with an explicit `Unknown` variant retaining the raw payload
//! so unrecognized schema changes degrade gracefully instead of failing the
//! sync.

use chrono::{DateTime, Utc};
use serde::de::Error as DeError;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use super::conflict::ConflictRecord;

/// A fragment of formatted text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RichText {
    /// Unformatted text content
    pub plain_text: String,

    /// Link target, if the fragment is a link
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

impl RichText {
    /// Create a plain fragment
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            plain_text: text.into(),
            href: None,
        }
    }
}

/// A select/multi-select/status option
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    /// Option identifier on the remote side
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Option label
    pub name: String,

    /// Display color
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl SelectOption {
    /// Create an option with just a label
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            color: None,
        }
    }
}

/// A date or date-range value, kept as the remote's ISO-8601 strings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DateValue {
    /// Start of the range (or the single date)
    pub start: String,

    /// End of the range, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

/// One typed property value
///
/// The wire shape is `{"type": "<kind>", "<kind>": <payload>}`. Values whose
/// `type` this client does not model deserialize into `Unknown`, preserving
/// the payload verbatim for storage and re-serialization.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// Page title fragments
    Title(Vec<RichText>),
    /// Formatted text fragments
    RichText(Vec<RichText>),
    /// Numeric value
    Number(Option<f64>),
    /// Single-choice option
    Select(Option<SelectOption>),
    /// Multi-choice options
    MultiSelect(Vec<SelectOption>),
    /// Date or date range
    Date(Option<DateValue>),
    /// Boolean flag
    Checkbox(bool),
    /// URL string
    Url(Option<String>),
    /// Email address
    Email(Option<String>),
    /// Phone number
    PhoneNumber(Option<String>),
    /// Workflow status option
    Status(Option<SelectOption>),
    /// Computed value, kept raw (shape depends on the formula result type)
    Formula(serde_json::Value),
    /// Aggregated value, kept raw (shape depends on the rollup function)
    Rollup(serde_json::Value),
    /// Unrecognized property type with its raw payload
    Unknown {
        /// The remote `type` tag
        kind: String,
        /// The raw payload under that tag
        raw: serde_json::Value,
    },
}

impl PropertyValue {
    /// The remote `type` tag for this value
    pub fn kind(&self) -> &str {
        match self {
            PropertyValue::Title(_) => "title",
            PropertyValue::RichText(_) => "richText",
            PropertyValue::Number(_) => "number",
            PropertyValue::Select(_) => "select",
            PropertyValue::MultiSelect(_) => "multiSelect",
            PropertyValue::Date(_) => "date",
            PropertyValue::Checkbox(_) => "checkbox",
            PropertyValue::Url(_) => "url",
            PropertyValue::Email(_) => "email",
            PropertyValue::PhoneNumber(_) => "phoneNumber",
            PropertyValue::Status(_) => "status",
            PropertyValue::Formula(_) => "formula",
            PropertyValue::Rollup(_) => "rollup",
            PropertyValue::Unknown { kind, .. } => kind,
        }
    }

    /// Flattened text content, where the value has a natural one
    pub fn as_plain_text(&self) -> Option<String> {
        match self {
            PropertyValue::Title(fragments) | PropertyValue::RichText(fragments) => Some(
                fragments
                    .iter()
                    .map(|f| f.plain_text.as_str())
                    .collect::<Vec<_>>()
                    .join(""),
            ),
            PropertyValue::Url(v) | PropertyValue::Email(v) | PropertyValue::PhoneNumber(v) => {
                v.clone()
            }
            PropertyValue::Select(opt) | PropertyValue::Status(opt) => {
                opt.as_ref().map(|o| o.name.clone())
            }
            _ => None,
        }
    }
}

impl Serialize for PropertyValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        fn payload<T: Serialize>(value: &T) -> serde_json::Value {
            serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
        }

        let (kind, value) = match self {
            PropertyValue::Title(v) => ("title", payload(v)),
            PropertyValue::RichText(v) => ("richText", payload(v)),
            PropertyValue::Number(v) => ("number", payload(v)),
            PropertyValue::Select(v) => ("select", payload(v)),
            PropertyValue::MultiSelect(v) => ("multiSelect", payload(v)),
            PropertyValue::Date(v) => ("date", payload(v)),
            PropertyValue::Checkbox(v) => ("checkbox", payload(v)),
            PropertyValue::Url(v) => ("url", payload(v)),
            PropertyValue::Email(v) => ("email", payload(v)),
            PropertyValue::PhoneNumber(v) => ("phoneNumber", payload(v)),
            PropertyValue::Status(v) => ("status", payload(v)),
            PropertyValue::Formula(v) => ("formula", v.clone()),
            PropertyValue::Rollup(v) => ("rollup", v.clone()),
            PropertyValue::Unknown { kind, raw } => (kind.as_str(), raw.clone()),
        };

        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("type", kind)?;
        map.serialize_entry(kind, &value)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for PropertyValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        let obj = value
            .as_object()
            .ok_or_else(|| D::Error::custom("property value must be an object"))?;
        let kind = obj
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or_else(|| D::Error::custom("property value missing \"type\" tag"))?
            .to_string();
        let payload = obj.get(&kind).cloned().unwrap_or(serde_json::Value::Null);

        fn parse<T, E: DeError>(payload: serde_json::Value, kind: &str) -> Result<T, E>
        where
            T: serde::de::DeserializeOwned,
        {
            serde_json::from_value(payload)
                .map_err(|e| E::custom(format!("invalid {} payload: {}", kind, e)))
        }

        let parsed = match kind.as_str() {
            "title" => PropertyValue::Title(parse(payload, "title")?),
            "richText" => PropertyValue::RichText(parse(payload, "richText")?),
            "number" => PropertyValue::Number(parse(payload, "number")?),
            "select" => PropertyValue::Select(parse(payload, "select")?),
            "multiSelect" => PropertyValue::MultiSelect(parse(payload, "multiSelect")?),
            "date" => PropertyValue::Date(parse(payload, "date")?),
            "checkbox" => PropertyValue::Checkbox(
                // Missing payload means unchecked
                payload.as_bool().unwrap_or(false),
            ),
            "url" => PropertyValue::Url(parse(payload, "url")?),
            "email" => PropertyValue::Email(parse(payload, "email")?),
            "phoneNumber" => PropertyValue::PhoneNumber(parse(payload, "phoneNumber")?),
            "status" => PropertyValue::Status(parse(payload, "status")?),
            "formula" => PropertyValue::Formula(payload),
            "rollup" => PropertyValue::Rollup(payload),
            _ => PropertyValue::Unknown { kind, raw: payload },
        };
        Ok(parsed)
    }
}

/// One content block of a page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Block identifier on the remote side
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Block type (paragraph, heading_1, bulleted_list_item, ...)
    pub kind: String,

    /// Flattened text content of the block
    pub plain_text: String,
}

impl Block {
    /// Create a paragraph block
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self {
            id: None,
            kind: "paragraph".to_string(),
            plain_text: text.into(),
        }
    }
}

/// Lifecycle status of a cached page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageStatus {
    /// Present on the remote side and synchronized
    #[default]
    Active,
    /// Archived on the remote side
    Archived,
    /// No longer returned by a full remote enumeration
    Deleted,
    /// Created locally, not yet pushed
    Draft,
}

impl std::fmt::Display for PageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PageStatus::Active => "active",
            PageStatus::Archived => "archived",
            PageStatus::Deleted => "deleted",
            PageStatus::Draft => "draft",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for PageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(PageStatus::Active),
            "archived" => Ok(PageStatus::Archived),
            "deleted" => Ok(PageStatus::Deleted),
            "draft" => Ok(PageStatus::Draft),
            _ => Err(format!("Invalid page status: {}", s)),
        }
    }
}

/// Local cache of one remote record
///
/// Invariant: `dirty == false` implies `local_hash` equals the hash of the
/// current properties and content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemotePage {
    /// Identifier on the remote service
    pub remote_id: String,

    /// Owning `RemoteDatabase` local id
    pub database_id: String,

    /// Flattened title text
    pub title: String,

    /// Typed property values by property name
    pub properties: BTreeMap<String, PropertyValue>,

    /// Cached content blocks
    pub content: Vec<Block>,

    /// Remote creation timestamp
    pub remote_created_at: DateTime<Utc>,

    /// Remote last-edit timestamp; drives newer-wins upserts
    pub remote_edited_at: DateTime<Utc>,

    /// Remote creator identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,

    /// Remote last-editor identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_edited_by: Option<String>,

    /// When the page was last edited locally; None while the local copy
    /// only mirrors remote edits. Drives conflict resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_edited_at: Option<DateTime<Utc>>,

    /// Content fingerprint of the last confirmed-synced payload (SHA-256 hex)
    pub local_hash: String,

    /// Locally modified, not yet pushed
    pub dirty: bool,

    /// Conflicts resolved against this page
    #[serde(default)]
    pub conflicts: Vec<ConflictRecord>,

    /// Lifecycle status
    pub status: PageStatus,
}

impl RemotePage {
    /// Create a page cache entry from remote data; the hash is computed from
    /// the given payload and the page starts clean.
    pub fn new(
        remote_id: impl Into<String>,
        database_id: impl Into<String>,
        title: impl Into<String>,
        properties: BTreeMap<String, PropertyValue>,
        content: Vec<Block>,
        remote_created_at: DateTime<Utc>,
        remote_edited_at: DateTime<Utc>,
    ) -> Self {
        let local_hash = content_hash(&properties, &content);
        Self {
            remote_id: remote_id.into(),
            database_id: database_id.into(),
            title: title.into(),
            properties,
            content,
            remote_created_at,
            remote_edited_at,
            created_by: None,
            last_edited_by: None,
            local_edited_at: None,
            local_hash,
            dirty: false,
            conflicts: Vec::new(),
            status: PageStatus::Active,
        }
    }

    /// Current hash of properties and content
    pub fn current_hash(&self) -> String {
        content_hash(&self.properties, &self.content)
    }

    /// Whether `local_hash` matches the current payload
    pub fn hash_is_current(&self) -> bool {
        self.local_hash == self.current_hash()
    }

    /// Apply a local edit: new properties, dirty flag raised, local edit
    /// time stamped.
    ///
    /// `local_hash` keeps the last confirmed-synced fingerprint so divergence
    /// stays detectable until the push succeeds.
    pub fn apply_local_edit(&mut self, properties: BTreeMap<String, PropertyValue>) {
        self.properties = properties;
        self.dirty = true;
        self.local_edited_at = Some(Utc::now());
    }

    /// Mark the current payload as confirmed-synced: recompute the hash and
    /// clear the dirty flag.
    pub fn mark_synced(&mut self) {
        self.local_hash = self.current_hash();
        self.dirty = false;
        self.local_edited_at = None;
    }

    /// The timestamp conflict resolution compares against the remote side:
    /// the local edit time when one exists, else the mirrored remote edit
    /// time.
    pub fn effective_edited_at(&self) -> DateTime<Utc> {
        self.local_edited_at.unwrap_or(self.remote_edited_at)
    }
}

/// SHA-256 hex fingerprint over a canonical JSON encoding of properties and
/// content. `BTreeMap` ordering makes the encoding order-independent.
pub fn content_hash(properties: &BTreeMap<String, PropertyValue>, content: &[Block]) -> String {
    let canonical = serde_json::json!({
        "properties": properties,
        "content": content,
    });
    let encoded = serde_json::to_string(&canonical).unwrap_or_default();
    let digest = Sha256::digest(encoded.as_bytes());
    hex::encode(digest)
}
