//! Unique visitor counting protocol.
//!
//! Runs once per page load, after the session is ready:
//!
//! 1. Obtain the visitor identifier.
//! 2. Look up `uniqueVisitors/{id}`.
//! 3. If absent: read `viewCounts/profile` (missing count = 0), write
//!    `count + 1` and `lastUpdate` with merge semantics, then create the
//!    visitor record `{ firstVisit, userAgent }`.
//! 4. If present: nothing to do.
//!
//! # Known Race
//!
//! In [`IncrementMode::ReadThenWrite`] steps 3a-3c are separate store
//! operations, which allows two races:
//!
//! - Two first loads from the same visitor that interleave (two tabs opened
//!   at once) both see no record and both increment. The visitor is counted
//!   twice.
//! - First loads from two different visitors that interleave both read the
//!   same count and both write `count + 1`. One increment is lost.
//!
//! Both are accepted. [`IncrementMode::Atomic`] delegates the increment to
//! the store, which removes the lost increment. The same-visitor double
//! count remains in both modes, since the record check and the record
//! creation are never atomic.
//!
//! # Failure Handling
//!
//! [`ViewCounter::record_visit`] logs and swallows every error, returning
//! [`VisitOutcome::Failed`]; the displayed count may then be stale for that
//! page load. [`ViewCounter::try_record_visit`] surfaces the error instead.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::document::{
    now_iso8601, Document, ViewCount, VisitorRecord, COUNT_FIELD, LAST_UPDATE_FIELD,
};
use crate::error::{Result, VisitError};
use crate::identity::{IdentityProvider, VisitorId};
use crate::stats::ProtocolStats;
use crate::storage::KeyValueStorage;
use crate::store::{DocumentStore, WriteMode};

/// How the shared counter is bumped for a new visitor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IncrementMode {
    /// Read the counter, then write `count + 1` with a merge.
    #[default]
    ReadThenWrite,
    /// Use the store's increment operation.
    Atomic,
}

impl fmt::Display for IncrementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IncrementMode::ReadThenWrite => "read-then-write",
            IncrementMode::Atomic => "atomic",
        })
    }
}

impl FromStr for IncrementMode {
    type Err = VisitError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "read-then-write" => Ok(IncrementMode::ReadThenWrite),
            "atomic" => Ok(IncrementMode::Atomic),
            other => Err(VisitError::InvalidConfig(format!(
                "unknown increment mode {other:?}"
            ))),
        }
    }
}

/// What a protocol run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisitOutcome {
    /// The visitor was new; the counter now reads `count`.
    Counted {
        /// The visitor that was recorded.
        visitor: VisitorId,
        /// Counter value written by this run.
        count: u64,
    },
    /// The visitor already had a record; nothing was written.
    AlreadyCounted {
        /// The returning visitor.
        visitor: VisitorId,
    },
    /// Something failed; the error was logged and dropped.
    Failed,
}

impl VisitOutcome {
    /// Returns `true` if this run incremented the counter.
    pub fn is_counted(&self) -> bool {
        matches!(self, VisitOutcome::Counted { .. })
    }
}

/// Runs the counting protocol against a store.
#[derive(Debug)]
pub struct ViewCounter<S, K> {
    store: Arc<S>,
    identity: IdentityProvider<K>,
    config: Config,
    stats: Arc<ProtocolStats>,
}

impl<S, K> ViewCounter<S, K>
where
    S: DocumentStore,
    K: KeyValueStorage,
{
    /// Creates a counter with default configuration.
    pub fn new(store: Arc<S>, storage: K) -> Self {
        Self::with_config(store, storage, Config::default())
    }

    /// Creates a counter with the given configuration.
    pub fn with_config(store: Arc<S>, storage: K, config: Config) -> Self {
        let identity = IdentityProvider::with_key(storage, config.storage_key.clone());
        Self {
            store,
            identity,
            config,
            stats: Arc::new(ProtocolStats::new()),
        }
    }

    /// Shares an existing statistics set.
    pub fn with_stats(mut self, stats: Arc<ProtocolStats>) -> Self {
        self.stats = stats;
        self
    }

    /// The statistics this counter records into.
    pub fn stats(&self) -> &Arc<ProtocolStats> {
        &self.stats
    }

    /// The identity provider in use.
    pub fn identity(&self) -> &IdentityProvider<K> {
        &self.identity
    }

    /// Runs the protocol, logging and swallowing any error.
    pub async fn record_visit(&self) -> VisitOutcome {
        match self.try_record_visit().await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.stats.protocol_failures.add(1);
                warn!(error = %e, "visit not recorded");
                VisitOutcome::Failed
            }
        }
    }

    /// Runs the protocol, returning the first error encountered.
    pub async fn try_record_visit(&self) -> Result<VisitOutcome> {
        self.stats.page_loads.add(1);

        let visitor = self.identity.get_or_create();
        let visitor_path = self.config.visitor_path(&visitor)?;

        if self.store.get(&visitor_path).await?.is_some() {
            self.stats.returning_visitors.add(1);
            debug!(%visitor, "visitor already counted");
            return Ok(VisitOutcome::AlreadyCounted { visitor });
        }

        let count = self.increment().await?;

        let record = VisitorRecord::now(self.config.user_agent.as_str());
        self.store
            .set(&visitor_path, record.to_document(), WriteMode::Replace)
            .await?;

        self.stats.new_visitors.add(1);
        info!(%visitor, count, mode = %self.config.increment_mode, "new visitor counted");
        Ok(VisitOutcome::Counted { visitor, count })
    }

    async fn increment(&self) -> Result<u64> {
        let counter_path = self.config.counter_path()?;
        match self.config.increment_mode {
            IncrementMode::ReadThenWrite => {
                let current = match self.store.get(&counter_path).await? {
                    Some(doc) => ViewCount::from_document(&counter_path, &doc)?.count,
                    None => 0,
                };
                let next = ViewCount::now(current.saturating_add(1));
                self.store
                    .set(&counter_path, next.to_document(), WriteMode::Merge)
                    .await?;
                Ok(next.count)
            }
            IncrementMode::Atomic => {
                let mut extra = Document::new();
                extra.insert(LAST_UPDATE_FIELD.into(), Value::from(now_iso8601()));
                self.store
                    .increment(&counter_path, COUNT_FIELD, 1, extra)
                    .await
            }
        }
    }
}
