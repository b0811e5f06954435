//! Shared document store abstraction.
//!
//! The view counter talks to its backing database through [`DocumentStore`]:
//! point reads, point writes (replace or merge), a field increment, and a
//! change subscription. The backend's own consistency model governs
//! concurrent writes from different clients; nothing here adds locking on
//! top of it.
//!
//! # Available Backends
//!
//! | Backend | Description |
//! |---------|-------------|
//! | [`MemoryStore`] | Process-local store with fault injection for tests |
//! | [`JsonFileStore`] | [`MemoryStore`] persisted to a JSON file after each write |
//!
//! # Example
//!
//! ```rust
//! use contavisite::document::{Document, DocumentPath};
//! use contavisite::store::{DocumentStore, MemoryStore, WriteMode};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> contavisite::error::Result<()> {
//! let store = MemoryStore::new();
//! let path: DocumentPath = "viewCounts/profile".parse()?;
//!
//! let mut subscription = store.subscribe(&path)?;
//! assert!(subscription.next().await.unwrap()?.is_none());
//!
//! let mut doc = Document::new();
//! doc.insert("count".into(), json!(1));
//! store.set(&path, doc, WriteMode::Merge).await?;
//!
//! let update = subscription.next().await.unwrap()?.unwrap();
//! assert_eq!(update["count"], json!(1));
//! # Ok(())
//! # }
//! ```

mod file;
mod memory;
mod subscription;

pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use subscription::{channel, Subscription, SubscriptionEvent, SubscriptionSink};

use std::future::Future;

use crate::document::{Document, DocumentPath};
use crate::error::Result;

/// How a write combines with an existing document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteMode {
    /// The written document replaces whatever was there.
    #[default]
    Replace,
    /// The written fields are merged into the existing document; fields not
    /// mentioned in the write are left untouched.
    Merge,
}

/// A document database reachable once the session is established.
pub trait DocumentStore: Send + Sync {
    /// Reads a document. `Ok(None)` means it does not exist.
    fn get(&self, path: &DocumentPath) -> impl Future<Output = Result<Option<Document>>> + Send;

    /// Writes a document.
    fn set(
        &self,
        path: &DocumentPath,
        doc: Document,
        mode: WriteMode,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Adds `delta` to the integer `field` as one store-side operation and
    /// merges `extra` into the same document. A missing document or field
    /// starts from 0. Returns the new value.
    fn increment(
        &self,
        path: &DocumentPath,
        field: &str,
        delta: u64,
        extra: Document,
    ) -> impl Future<Output = Result<u64>> + Send;

    /// Subscribes to changes of a document.
    ///
    /// The first event carries the current state; later events follow every
    /// write. Dropping or closing the [`Subscription`] unsubscribes.
    fn subscribe(&self, path: &DocumentPath) -> Result<Subscription>;
}
