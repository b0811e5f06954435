//! JSON observer.
//!
//! Emits either a bare array of tallies or, with
//! [`wrap_in_snapshot`](JsonObserver::wrap_in_snapshot), a
//! [`StatsSnapshot`] object that can carry a timestamp.
//!
//! ```rust
//! use contavisite::observers::json::JsonObserver;
//! use contavisite::stats::ProtocolStats;
//!
//! let stats = ProtocolStats::new();
//! stats.live_updates.add(12);
//!
//! let observer = JsonObserver::new().wrap_in_snapshot(true);
//! let json = observer.to_json(stats.tallies().into_iter()).unwrap();
//! assert!(json.starts_with(r#"{"tallies":["#));
//! ```

use crate::snapshot::{current_timestamp_ms, StatsSnapshot, TallySnapshot};
use crate::stats::Observable;

use super::Result;

/// Settings for [`JsonObserver`].
#[derive(Debug, Clone, Default)]
pub struct JsonConfig {
    /// Indent the output.
    pub pretty: bool,
    /// Only honored together with `wrap_in_snapshot`.
    pub include_timestamp: bool,
    /// Emit a [`StatsSnapshot`] object instead of a bare array.
    pub wrap_in_snapshot: bool,
}

/// Serializes tallies to JSON.
#[derive(Debug, Clone, Default)]
pub struct JsonObserver {
    config: JsonConfig,
}

impl JsonObserver {
    /// Compact output, bare array, no timestamp.
    pub fn new() -> Self {
        Self::default()
    }

    /// An observer using `config`.
    pub fn with_config(config: JsonConfig) -> Self {
        Self { config }
    }

    /// Enables or disables pretty-printing.
    pub fn pretty(mut self, enabled: bool) -> Self {
        self.config.pretty = enabled;
        self
    }

    /// Stamps the snapshot with the current time.
    pub fn include_timestamp(mut self, enabled: bool) -> Self {
        self.config.include_timestamp = enabled;
        self
    }

    /// Emits a [`StatsSnapshot`] object instead of a bare array.
    pub fn wrap_in_snapshot(mut self, enabled: bool) -> Self {
        self.config.wrap_in_snapshot = enabled;
        self
    }

    /// Serializes `tallies` to a JSON string.
    pub fn to_json<'a>(&self, tallies: impl Iterator<Item = &'a dyn Observable>) -> Result<String> {
        let rows: Vec<TallySnapshot> = tallies.map(TallySnapshot::from_observable).collect();

        let json = if self.config.wrap_in_snapshot {
            let snapshot = if self.config.include_timestamp {
                StatsSnapshot::with_timestamp(rows, current_timestamp_ms())
            } else {
                StatsSnapshot::new(rows)
            };
            if self.config.pretty {
                serde_json::to_string_pretty(&snapshot)?
            } else {
                serde_json::to_string(&snapshot)?
            }
        } else if self.config.pretty {
            serde_json::to_string_pretty(&rows)?
        } else {
            serde_json::to_string(&rows)?
        };
        Ok(json)
    }

    /// Serializes `tallies` to JSON bytes.
    pub fn to_json_bytes<'a>(
        &self,
        tallies: impl Iterator<Item = &'a dyn Observable>,
    ) -> Result<Vec<u8>> {
        Ok(self.to_json(tallies)?.into_bytes())
    }
}
