//! One page load, end to end.
//!
//! Waits for the session, starts the live counter, then runs the counting
//! protocol. Nothing here can fail from the caller's point of view: a
//! failed session or subscription leaves the display at its default and is
//! only logged.

use std::sync::Arc;

use tracing::warn;

use crate::config::Config;
use crate::live::{CounterDisplay, LiveCounter, LiveCounterHandle};
use crate::protocol::{ViewCounter, VisitOutcome};
use crate::session::Session;
use crate::stats::ProtocolStats;
use crate::storage::KeyValueStorage;
use crate::store::DocumentStore;

/// The state of a loaded page.
#[derive(Debug)]
pub struct PageView {
    /// What the counting protocol did.
    pub outcome: VisitOutcome,
    /// The live count shown on the page.
    pub display: Arc<CounterDisplay>,
    /// The running live counter, absent if it could not start.
    pub live: Option<LiveCounterHandle>,
}

impl PageView {
    /// Tears the page down, releasing the live subscription.
    pub async fn close(self) {
        if let Some(live) = self.live {
            live.stop().await;
        }
    }
}

/// Runs a page load.
#[derive(Debug)]
pub struct PageLoad<K> {
    storage: K,
    config: Config,
    stats: Arc<ProtocolStats>,
}

impl<K: KeyValueStorage> PageLoad<K> {
    /// Prepares a page load reading the visitor id from `storage`.
    pub fn new(storage: K, config: Config) -> Self {
        Self {
            storage,
            config,
            stats: Arc::new(ProtocolStats::new()),
        }
    }

    /// Records into an existing statistics set.
    pub fn with_stats(mut self, stats: Arc<ProtocolStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Waits for `session`, subscribes, and counts the visit.
    pub async fn run<S: DocumentStore>(self, session: &mut Session<S>) -> PageView {
        let display = Arc::new(CounterDisplay::with_pulse(self.config.pulse()));

        let store = match session.ready().await {
            Ok(store) => store,
            Err(e) => {
                warn!(error = %e, "page loaded without a session, view count disabled");
                return PageView {
                    outcome: VisitOutcome::Failed,
                    display,
                    live: None,
                };
            }
        };

        let live = match self
            .config
            .counter_path()
            .and_then(|path| store.subscribe(&path))
        {
            Ok(subscription) => Some(LiveCounter::spawn(
                subscription,
                Arc::clone(&display),
                Arc::clone(&self.stats),
            )),
            Err(e) => {
                self.stats.subscription_errors.add(1);
                warn!(error = %e, "live view count unavailable");
                None
            }
        };

        let counter = ViewCounter::with_config(store, self.storage, self.config)
            .with_stats(self.stats);
        let outcome = counter.record_visit().await;

        PageView {
            outcome,
            display,
            live,
        }
    }
}
