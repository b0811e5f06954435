//! Local key-value storage used to persist the visitor identifier.
//!
//! The identity provider only needs two synchronous string operations, so
//! any origin-scoped persistence (a browser's local storage, a file in the
//! user's profile, an in-memory map in tests) can back it.
//!
//! # Available Backends
//!
//! | Backend | Description |
//! |---------|-------------|
//! | [`MemoryStorage`] | Mutex-guarded map, lives as long as the value |
//! | [`FileStorage`] | JSON object file, survives restarts |
//! | [`UnavailableStorage`] | Always fails, models disabled storage |
//!
//! # Example
//!
//! ```rust
//! use contavisite::storage::{KeyValueStorage, MemoryStorage};
//!
//! let storage = MemoryStorage::new();
//! assert_eq!(storage.get("visitor").unwrap(), None);
//!
//! storage.set("visitor", "abc123").unwrap();
//! assert_eq!(storage.get("visitor").unwrap().as_deref(), Some("abc123"));
//! ```

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::error::{Result, VisitError};

/// A synchronous string key-value store.
pub trait KeyValueStorage: Send + Sync {
    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

impl<T: KeyValueStorage + ?Sized> KeyValueStorage for &T {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }
}

impl<T: KeyValueStorage + ?Sized> KeyValueStorage for std::sync::Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }
}

/// Storage that rejects every operation.
///
/// Stands in for environments where persistence is disabled. The identity
/// provider degrades to a fresh identifier per call on top of it.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableStorage;

impl KeyValueStorage for UnavailableStorage {
    fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(VisitError::StorageUnavailable("storage is disabled".into()))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<()> {
        Err(VisitError::StorageUnavailable("storage is disabled".into()))
    }
}
