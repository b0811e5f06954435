//! Runtime configuration.
//!
//! Defaults match the deployed profile page. Values can come from a JSON
//! file (missing fields keep their defaults) or from `CONTAVISITE_*`
//! environment variables.
//!
//! | Variable | Field | Default |
//! |----------|-------|---------|
//! | `CONTAVISITE_STORAGE_KEY` | `storageKey` | `siraw_unique_visitor_id` |
//! | `CONTAVISITE_COUNTER_COLLECTION` | `counterCollection` | `viewCounts` |
//! | `CONTAVISITE_COUNTER_DOCUMENT` | `counterDocument` | `profile` |
//! | `CONTAVISITE_VISITORS_COLLECTION` | `visitorsCollection` | `uniqueVisitors` |
//! | `CONTAVISITE_PULSE_MS` | `pulseMillis` | `500` |
//! | `CONTAVISITE_INCREMENT_MODE` | `incrementMode` | `read-then-write` |
//! | `CONTAVISITE_USER_AGENT` | `userAgent` | `contavisite/<version>` |

use std::env;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::document::DocumentPath;
use crate::error::Result;
use crate::identity::{VisitorId, VISITOR_ID_KEY};
use crate::protocol::IncrementMode;

/// Settings for identity, protocol and display.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Local storage key of the visitor identifier.
    pub storage_key: String,
    /// Collection holding the counter document.
    pub counter_collection: String,
    /// Id of the counter document.
    pub counter_document: String,
    /// Collection holding one record per counted visitor.
    pub visitors_collection: String,
    /// How long a pulse stays lit, in milliseconds.
    pub pulse_millis: u64,
    /// How the counter is bumped for a new visitor.
    pub increment_mode: IncrementMode,
    /// User agent stored on new visitor records.
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_key: VISITOR_ID_KEY.to_string(),
            counter_collection: "viewCounts".to_string(),
            counter_document: "profile".to_string(),
            visitors_collection: "uniqueVisitors".to_string(),
            pulse_millis: 500,
            increment_mode: IncrementMode::default(),
            user_agent: concat!("contavisite/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Config {
    /// Parses a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Builds a configuration from `CONTAVISITE_*` variables.
    ///
    /// Unset or unparsable variables keep the default and are logged.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            storage_key: try_load("CONTAVISITE_STORAGE_KEY", defaults.storage_key),
            counter_collection: try_load(
                "CONTAVISITE_COUNTER_COLLECTION",
                defaults.counter_collection,
            ),
            counter_document: try_load("CONTAVISITE_COUNTER_DOCUMENT", defaults.counter_document),
            visitors_collection: try_load(
                "CONTAVISITE_VISITORS_COLLECTION",
                defaults.visitors_collection,
            ),
            pulse_millis: try_load("CONTAVISITE_PULSE_MS", defaults.pulse_millis),
            increment_mode: try_load("CONTAVISITE_INCREMENT_MODE", defaults.increment_mode),
            user_agent: try_load("CONTAVISITE_USER_AGENT", defaults.user_agent),
        }
    }

    /// Path of the shared counter document.
    pub fn counter_path(&self) -> Result<DocumentPath> {
        DocumentPath::new(&self.counter_collection, &self.counter_document)
    }

    /// Path of the record for `visitor`.
    pub fn visitor_path(&self, visitor: &VisitorId) -> Result<DocumentPath> {
        DocumentPath::new(&self.visitors_collection, visitor.as_str())
    }

    /// Pulse duration.
    pub fn pulse(&self) -> Duration {
        Duration::from_millis(self.pulse_millis)
    }
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value {raw:?}: {e}, using default: {default}");
            default
        }),
        Err(_) => {
            info!("{key} not set, using default: {default}");
            default
        }
    }
}
