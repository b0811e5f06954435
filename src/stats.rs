//! Protocol statistics.
//!
//! Every page load, counted visitor, live update and swallowed error bumps
//! one of the tallies in [`ProtocolStats`]. The tallies are sharded atomic
//! counters: each thread writes to its own cache-padded slot and reads sum
//! all slots, so recording from the live task and from concurrent page
//! loads never contends on a single cache line.
//!
//! ```text
//!                          ┌─────────────────────────────────────┐
//!                          │              Tally                  │
//!                          ├─────────────────────────────────────┤
//!   Thread 0 ──writes──►   │ [Slot 0] ████████ (CachePadded)     │
//!   Thread 1 ──writes──►   │ [Slot 1] ████████ (CachePadded)     │
//!        ...               │    ...                              │
//!   Thread 63 ─writes──►   │ [Slot 63] ███████ (CachePadded)     │
//!                          └─────────────────────────────────────┘
//!                                          │
//!                                          ▼
//!                                   value() sums all slots
//! ```
//!
//! The statistics are local to the process; they say nothing about the
//! shared counter, which lives in the document store.
//!
//! # Example
//!
//! ```rust
//! use contavisite::stats::{Observable, ProtocolStats};
//!
//! let stats = ProtocolStats::new();
//! stats.page_loads.add(1);
//!
//! for tally in stats.tallies() {
//!     println!("{}", tally);
//! }
//! assert_eq!(stats.page_loads.value(), 1);
//! ```

mod tally;

pub use tally::Tally;

use std::fmt::{self, Debug, Display};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Number of shards used by each tally.
///
/// 64 slots × 64-byte cache lines keeps a tally at about 4KB.
pub(crate) const NUM_COMPONENTS: usize = 64;

static NEXT_SLOT_ID: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    /// Slot assigned to the current thread, fixed for its lifetime.
    pub(crate) static THREAD_SLOT_INDEX: usize = next_slot_id();
}

/// Assigns slots round-robin; the 65th thread shares slot 0 with the first.
fn next_slot_id() -> usize {
    NEXT_SLOT_ID.fetch_add(1, Ordering::Relaxed) % NUM_COMPONENTS
}

/// Something with a name and a current value that exporters can read.
pub trait Observable: Debug + Send + Sync {
    /// The metric name, empty if unnamed.
    fn name(&self) -> &str;

    /// The current aggregated value.
    fn value(&self) -> u64;

    /// Help text for exporters that want one.
    fn help(&self) -> &str {
        ""
    }
}

impl Display for dyn Observable + '_ {
    /// Formats as `name:value`, or just `value` when unnamed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.name().is_empty() {
            write!(f, "{}:{}", self.name(), self.value())
        } else {
            write!(f, "{}", self.value())
        }
    }
}

/// Process-local counters describing what the protocol has done.
#[derive(Debug)]
pub struct ProtocolStats {
    /// Page loads that ran the counting protocol.
    pub page_loads: Tally,
    /// Visitors seen for the first time and counted.
    pub new_visitors: Tally,
    /// Visitors that already had a record.
    pub returning_visitors: Tally,
    /// Protocol runs that failed and were swallowed.
    pub protocol_failures: Tally,
    /// Counter values delivered by the live subscription.
    pub live_updates: Tally,
    /// Pulses raised on the display.
    pub pulses: Tally,
    /// Errors reported by the live subscription.
    pub subscription_errors: Tally,
}

impl ProtocolStats {
    /// Creates a zeroed set of statistics.
    pub const fn new() -> Self {
        Self {
            page_loads: Tally::new()
                .with_name("page_loads")
                .with_help("Page loads that ran the visitor counting protocol"),
            new_visitors: Tally::new()
                .with_name("new_visitors")
                .with_help("Visitors counted for the first time"),
            returning_visitors: Tally::new()
                .with_name("returning_visitors")
                .with_help("Visitors already recorded before this load"),
            protocol_failures: Tally::new()
                .with_name("protocol_failures")
                .with_help("Counting runs that failed and were skipped"),
            live_updates: Tally::new()
                .with_name("live_updates")
                .with_help("Counter values received from the live subscription"),
            pulses: Tally::new()
                .with_name("pulses")
                .with_help("Display pulses raised by counter changes"),
            subscription_errors: Tally::new()
                .with_name("subscription_errors")
                .with_help("Errors reported by the live subscription"),
        }
    }

    /// All tallies, in a stable order.
    pub fn tallies(&self) -> [&dyn Observable; 7] {
        [
            &self.page_loads,
            &self.new_visitors,
            &self.returning_visitors,
            &self.protocol_failures,
            &self.live_updates,
            &self.pulses,
            &self.subscription_errors,
        ]
    }
}

impl Default for ProtocolStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_ids_in_range() {
        for _ in 0..200 {
            assert!(next_slot_id() < NUM_COMPONENTS);
        }
    }

    #[test]
    fn test_stats_start_at_zero() {
        let stats = ProtocolStats::new();
        assert!(stats.tallies().iter().all(|t| t.value() == 0));
    }

    #[test]
    fn test_tally_names_are_unique() {
        let stats = ProtocolStats::new();
        let mut names: Vec<&str> = stats.tallies().iter().map(|t| t.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 7);
    }

    #[test]
    fn test_dyn_display() {
        let stats = ProtocolStats::new();
        stats.pulses.add(2);
        let tally: &dyn Observable = &stats.pulses;
        assert_eq!(format!("{}", tally), "pulses:2");
        assert_eq!(format!("{}", &Tally::new() as &dyn Observable), "0");
    }

    #[test]
    fn test_static_stats() {
        static STATS: ProtocolStats = ProtocolStats::new();
        STATS.page_loads.add(1);
        assert!(STATS.page_loads.value() >= 1);
    }
}
