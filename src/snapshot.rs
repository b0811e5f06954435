//! Serializable snapshots of the protocol statistics.
//!
//! # Examples
//!
//! ```rust
//! use contavisite::snapshot::StatsSnapshot;
//! use contavisite::stats::ProtocolStats;
//!
//! let stats = ProtocolStats::new();
//! stats.new_visitors.add(3);
//!
//! let snapshot = StatsSnapshot::collect(stats.tallies().into_iter());
//! assert_eq!(snapshot.get("new_visitors").map(|t| t.value), Some(3));
//!
//! let json = serde_json::to_string(&snapshot).unwrap();
//! assert!(json.contains(r#""name":"new_visitors","value":3"#));
//! ```

use serde::{Deserialize, Serialize};

use crate::stats::Observable;

/// One tally at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TallySnapshot {
    /// The tally name, `(unnamed)` if it has none.
    pub name: String,
    /// The value when the snapshot was taken.
    pub value: u64,
}

impl TallySnapshot {
    /// A snapshot with the given name and value.
    pub fn new(name: impl Into<String>, value: u64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// Reads the current value of `tally`.
    pub fn from_observable(tally: &dyn Observable) -> Self {
        Self {
            name: if tally.name().is_empty() {
                "(unnamed)".to_string()
            } else {
                tally.name().to_string()
            },
            value: tally.value(),
        }
    }
}

/// A point-in-time capture of a set of tallies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Milliseconds since the Unix epoch, if recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<u64>,
    /// Tallies in collection order.
    pub tallies: Vec<TallySnapshot>,
}

impl StatsSnapshot {
    /// An unstamped snapshot.
    pub fn new(tallies: Vec<TallySnapshot>) -> Self {
        Self {
            timestamp_ms: None,
            tallies,
        }
    }

    /// A snapshot stamped with `timestamp_ms`.
    pub fn with_timestamp(tallies: Vec<TallySnapshot>, timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms: Some(timestamp_ms),
            tallies,
        }
    }

    /// Finds a tally by name.
    pub fn get(&self, name: &str) -> Option<&TallySnapshot> {
        self.tallies.iter().find(|t| t.name == name)
    }

    /// Snapshots every tally in `tallies`.
    pub fn collect<'a>(tallies: impl Iterator<Item = &'a dyn Observable>) -> Self {
        Self::new(tallies.map(TallySnapshot::from_observable).collect())
    }

    /// Snapshots every tally in `tallies`, stamped with the current time.
    pub fn collect_now<'a>(tallies: impl Iterator<Item = &'a dyn Observable>) -> Self {
        Self::with_timestamp(
            tallies.map(TallySnapshot::from_observable).collect(),
            current_timestamp_ms(),
        )
    }
}

/// Milliseconds since the Unix epoch; 0 if the clock is before it.
pub(crate) fn current_timestamp_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}
