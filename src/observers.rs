//! Exporters for [`ProtocolStats`](crate::stats::ProtocolStats).
//!
//! - [`json`] serializes tallies with serde (always available)
//! - [`table`] renders them with `tabled` (feature `table`)
//! - [`prometheus`] renders the text exposition format (feature `prometheus`)
//!
//! All observers take an iterator of `&dyn Observable` and share
//! [`ObserverError`].
//!
//! ```rust
//! use contavisite::observers::json::JsonObserver;
//! use contavisite::stats::ProtocolStats;
//!
//! let stats = ProtocolStats::new();
//! stats.page_loads.add(1);
//!
//! let json = JsonObserver::new().to_json(stats.tallies().into_iter())?;
//! assert!(json.contains(r#"{"name":"page_loads","value":1}"#));
//! # Ok::<(), contavisite::observers::ObserverError>(())
//! ```

mod error;

pub use error::{ObserverError, Result};

pub mod json;

#[cfg(feature = "table")]
pub mod table;

#[cfg(feature = "prometheus")]
pub mod prometheus;
