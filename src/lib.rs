//! # Contavisite - Unique Visitor Counting with a Live View Counter
//!
//! A small library for the "views" badge of a single public page. Each
//! browser is counted at most once, and every open copy of the page shows
//! the shared total live, with a short pulse whenever it changes.
//!
//! ## How It Works
//!
//! ```text
//!   page load
//!      │
//!      ▼
//!   Session::ready() ── failed ──► display stays at 0, nothing written
//!      │ ready
//!      ├──────────────► subscribe(viewCounts/profile) ──► LiveCounter ──► CounterDisplay
//!      ▼
//!   IdentityProvider::get_or_create()          (local storage: siraw_unique_visitor_id)
//!      │
//!      ▼
//!   get(uniqueVisitors/<id>) ── exists ──► AlreadyCounted
//!      │ absent
//!      ▼
//!   bump viewCounts/profile.count, then set uniqueVisitors/<id>
//! ```
//!
//! 1. **Identity**: a random visitor id is created on first sight and kept
//!    in client-local key-value storage ([`storage`]). If that storage is
//!    unavailable a fresh id is generated for every load.
//!
//! 2. **Counting**: [`protocol::ViewCounter`] checks for a visitor record
//!    and only bumps the shared counter for unseen visitors. The counter
//!    document is merged, not replaced, so unrelated fields survive.
//!
//! 3. **Live display**: [`live::LiveCounter`] follows the counter document
//!    and feeds a [`live::CounterDisplay`]. Any change away from a non-zero
//!    value pulses the display for 500 ms.
//!
//! 4. **Failure containment**: no store, storage or subscription error ever
//!    reaches the page. Errors are logged with `tracing` and counted in
//!    [`stats::ProtocolStats`].
//!
//! ## Quick Start
//!
//! ```rust
//! use contavisite::config::Config;
//! use contavisite::page::PageLoad;
//! use contavisite::session;
//! use contavisite::storage::MemoryStorage;
//! use contavisite::store::MemoryStore;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (signal, mut session) = session::channel();
//! signal.establish(MemoryStore::new());
//!
//! let view = PageLoad::new(MemoryStorage::new(), Config::default())
//!     .run(&mut session)
//!     .await;
//! assert!(view.outcome.is_counted());
//! view.close().await;
//! # }
//! ```
//!
//! ## Increment Modes
//!
//! | Mode | Behavior |
//! |------|----------|
//! | [`ReadThenWrite`](protocol::IncrementMode::ReadThenWrite) | Reads the count and writes `count + 1`. First visits of two visitors racing can lose an increment. Default. |
//! | [`Atomic`](protocol::IncrementMode::Atomic) | Uses the store's own increment. Concurrent first visits are never lost. |
//!
//! In both modes two tabs of the same visitor opened at once can both pass
//! the record check and count that visitor twice. See the
//! [`protocol`] module docs.
//!
//! ## Observers
//!
//! The protocol statistics can be exported with the observer modules:
//!
//! | Feature | Module | Description |
//! |---------|--------|-------------|
//! | | [`observers::json`] | Serialize tallies to JSON |
//! | `table` | `observers::table` | Pretty-print tallies as text tables |
//! | `prometheus` | `observers::prometheus` | Prometheus exposition format |
//! | `full` | All observers | Enables every optional observer |
//!
//! ```rust
//! use contavisite::observers::json::JsonObserver;
//! use contavisite::stats::ProtocolStats;
//!
//! let stats = ProtocolStats::new();
//! let json = JsonObserver::new()
//!     .pretty(true)
//!     .to_json(stats.tallies().into_iter())?;
//! # Ok::<(), contavisite::observers::ObserverError>(())
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod identity;
pub mod live;
pub mod observers;
pub mod page;
pub mod protocol;
pub mod session;
pub mod snapshot;
pub mod stats;
pub mod storage;
pub mod store;

pub use error::{Result, VisitError};
