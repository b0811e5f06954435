//! Document model shared by every store backend.
//!
//! Documents are JSON objects addressed by a two-segment path
//! (`collection/id`). Two typed views sit on top of the raw map:
//!
//! ```text
//! viewCounts/profile        { "count": 42, "lastUpdate": "2024-05-01T10:00:00.000Z" }
//! uniqueVisitors/{visitor}  { "firstVisit": "2024-05-01T10:00:00.000Z", "userAgent": "..." }
//! ```
//!
//! Timestamps are RFC 3339 strings with millisecond precision and a `Z`
//! suffix, the same shape a browser's `Date.toISOString()` produces.

use std::fmt;
use std::str::FromStr;

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::error::{Result, VisitError};

/// A document body: a JSON object.
pub type Document = Map<String, Value>;

/// Field holding the counter value on the counter document.
pub const COUNT_FIELD: &str = "count";
/// Field holding the last update time on the counter document.
pub const LAST_UPDATE_FIELD: &str = "lastUpdate";
/// Field holding the first visit time on a visitor record.
pub const FIRST_VISIT_FIELD: &str = "firstVisit";
/// Field holding the user agent on a visitor record.
pub const USER_AGENT_FIELD: &str = "userAgent";

/// Address of a single document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentPath {
    collection: String,
    id: String,
}

impl DocumentPath {
    /// Builds a path from its two segments.
    ///
    /// Fails if either segment is empty or contains a `/`.
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Result<Self> {
        let collection = collection.into();
        let id = id.into();
        let valid = |s: &str| !s.is_empty() && !s.contains('/');
        if !valid(&collection) || !valid(&id) {
            return Err(VisitError::InvalidPath(format!("{collection}/{id}")));
        }
        Ok(Self { collection, id })
    }

    /// The collection segment.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The document id segment.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

impl FromStr for DocumentPath {
    type Err = VisitError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((collection, id)) => Self::new(collection, id),
            None => Err(VisitError::InvalidPath(s.to_string())),
        }
    }
}

/// Current time as an ISO-8601 string (`2024-05-01T10:00:00.000Z`).
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Merges `patch` into `target`.
///
/// Nested objects are merged field by field; any other value in `patch`
/// replaces the one in `target`. Fields only present in `target` survive.
pub fn merge_documents(target: &mut Document, patch: Document) {
    for (key, value) in patch {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(nested)) => {
                merge_documents(existing, nested);
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

/// The shared counter document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewCount {
    /// Number of distinct visitors counted so far.
    pub count: u64,
    /// When the count last changed, if ever recorded.
    pub last_update: Option<String>,
}

impl ViewCount {
    /// A counter at `count`, stamped with the current time.
    pub fn now(count: u64) -> Self {
        Self {
            count,
            last_update: Some(now_iso8601()),
        }
    }

    /// Reads the counter fields out of a document.
    ///
    /// A missing `count` reads as 0. A `count` that is not a non-negative
    /// integer is rejected. Unrelated fields are ignored.
    pub fn from_document(path: &DocumentPath, doc: &Document) -> Result<Self> {
        let count = match doc.get(COUNT_FIELD) {
            None | Some(Value::Null) => 0,
            Some(value) => as_count(value).ok_or_else(|| VisitError::MalformedDocument {
                path: path.to_string(),
                reason: format!("{COUNT_FIELD} is not a non-negative integer: {value}"),
            })?,
        };
        let last_update = doc
            .get(LAST_UPDATE_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(Self { count, last_update })
    }

    /// Renders the counter as a patch suitable for a merge write.
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert(COUNT_FIELD.into(), Value::from(self.count));
        if let Some(ts) = &self.last_update {
            doc.insert(LAST_UPDATE_FIELD.into(), Value::from(ts.as_str()));
        }
        doc
    }
}

pub(crate) fn as_count(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    // some backends hand integers back as doubles
    value
        .as_f64()
        .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= u64::MAX as f64)
        .map(|f| f as u64)
}

/// Marker document meaning "this visitor has been counted".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitorRecord {
    /// When the visitor was first counted.
    pub first_visit: String,
    /// User agent reported on the first visit.
    pub user_agent: String,
}

impl VisitorRecord {
    /// A record for a visit happening now.
    pub fn now(user_agent: impl Into<String>) -> Self {
        Self {
            first_visit: now_iso8601(),
            user_agent: user_agent.into(),
        }
    }

    /// Reads a visitor record out of a document.
    pub fn from_document(path: &DocumentPath, doc: &Document) -> Result<Self> {
        let field = |name: &str| {
            doc.get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| VisitError::MalformedDocument {
                    path: path.to_string(),
                    reason: format!("missing string field {name}"),
                })
        };
        Ok(Self {
            first_visit: field(FIRST_VISIT_FIELD)?,
            user_agent: field(USER_AGENT_FIELD)?,
        })
    }

    /// Renders the record as a document.
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert(FIRST_VISIT_FIELD.into(), Value::from(self.first_visit.as_str()));
        doc.insert(USER_AGENT_FIELD.into(), Value::from(self.user_agent.as_str()));
        doc
    }
}
