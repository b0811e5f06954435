//! Per-browser visitor identity.
//!
//! A visitor is identified by an opaque string generated on first use and
//! persisted in local storage under [`VISITOR_ID_KEY`]. Subsequent calls
//! return the stored value unchanged; it is never rotated or expired.
//!
//! # Degraded Mode
//!
//! If the storage cannot be read or written, a fresh identifier is generated
//! on every call. The visitor may then be counted more than once, which is
//! acceptable for a decorative counter and is only logged.
//!
//! ```rust
//! use contavisite::identity::IdentityProvider;
//! use contavisite::storage::MemoryStorage;
//!
//! let provider = IdentityProvider::new(MemoryStorage::new());
//! let first = provider.get_or_create();
//! let second = provider.get_or_create();
//! assert_eq!(first, second);
//! ```

use std::fmt;

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::storage::KeyValueStorage;

/// Local storage key holding the visitor identifier.
pub const VISITOR_ID_KEY: &str = "siraw_unique_visitor_id";

/// Opaque identifier distinguishing one browser or device from another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VisitorId(String);

impl VisitorId {
    /// Wraps an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a new identifier from a random component and the current
    /// time, both rendered in base 36.
    ///
    /// Unique enough to tell visitors apart, not suitable as a secret.
    pub fn generate() -> Self {
        let random: u64 = rand::thread_rng().gen();
        let millis = Utc::now().timestamp_millis().max(0) as u64;
        Self(format!("{}{}", to_base36(random), to_base36(millis)))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VisitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VisitorId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::with_capacity(13);
    while n > 0 {
        buf.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    buf.reverse();
    String::from_utf8_lossy(&buf).into_owned()
}

/// Produces the stable identifier for the current visitor.
#[derive(Debug)]
pub struct IdentityProvider<K> {
    storage: K,
    key: String,
}

impl<K: KeyValueStorage> IdentityProvider<K> {
    /// Creates a provider reading and writing [`VISITOR_ID_KEY`].
    pub fn new(storage: K) -> Self {
        Self::with_key(storage, VISITOR_ID_KEY)
    }

    /// Creates a provider using a custom storage key.
    pub fn with_key(storage: K, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    /// The storage key in use.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the stored identifier, creating and persisting one if absent.
    ///
    /// An empty stored value counts as absent. If the storage cannot be
    /// read, a transient identifier is returned and nothing is written, so
    /// an identifier persisted earlier is never overwritten.
    pub fn get_or_create(&self) -> VisitorId {
        match self.storage.get(&self.key) {
            Ok(Some(existing)) if !existing.is_empty() => return VisitorId(existing),
            Ok(_) => {}
            Err(e) => {
                let id = VisitorId::generate();
                warn!(key = %self.key, visitor = %id, error = %e, "visitor id unreadable, using a transient one");
                return id;
            }
        }

        let id = VisitorId::generate();
        match self.storage.set(&self.key, id.as_str()) {
            Ok(()) => debug!(visitor = %id, "new visitor id stored"),
            Err(e) => warn!(visitor = %id, error = %e, "visitor id not persisted"),
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, VisitError};
    use crate::storage::{MemoryStorage, UnavailableStorage};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(u64::MAX), "3w5e11264sgsf");
    }

    #[test]
    fn test_generate_shape() {
        let id = VisitorId::generate();
        assert!(!id.as_str().is_empty());
        assert!(id
            .as_str()
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn test_generate_differs() {
        assert_ne!(VisitorId::generate(), VisitorId::generate());
    }

    #[test]
    fn test_stable_across_calls() {
        let provider = IdentityProvider::new(MemoryStorage::new());
        let first = provider.get_or_create();
        for _ in 0..10 {
            assert_eq!(provider.get_or_create(), first);
        }
    }

    #[test]
    fn test_returns_existing_unchanged() {
        let storage = MemoryStorage::new();
        storage.set(VISITOR_ID_KEY, "v1").unwrap();
        let provider = IdentityProvider::new(storage);
        assert_eq!(provider.get_or_create(), VisitorId::new("v1"));
    }

    #[test]
    fn test_persists_under_key() {
        let storage = MemoryStorage::new();
        let id = IdentityProvider::new(&storage).get_or_create();
        assert_eq!(
            storage.get(VISITOR_ID_KEY).unwrap().as_deref(),
            Some(id.as_str())
        );
    }

    #[test]
    fn test_empty_value_is_replaced() {
        let storage = MemoryStorage::new();
        storage.set(VISITOR_ID_KEY, "").unwrap();
        let id = IdentityProvider::new(&storage).get_or_create();
        assert!(!id.as_str().is_empty());
        assert_eq!(
            storage.get(VISITOR_ID_KEY).unwrap().as_deref(),
            Some(id.as_str())
        );
    }

    #[test]
    fn test_custom_key() {
        let storage = MemoryStorage::new();
        let provider = IdentityProvider::with_key(&storage, "other");
        let id = provider.get_or_create();
        assert_eq!(provider.key(), "other");
        assert_eq!(storage.get("other").unwrap().as_deref(), Some(id.as_str()));
        assert_eq!(storage.get(VISITOR_ID_KEY).unwrap(), None);
    }

    #[test]
    fn test_unavailable_storage_regenerates() {
        let provider = IdentityProvider::new(UnavailableStorage);
        let first = provider.get_or_create();
        let second = provider.get_or_create();
        assert_ne!(first, second);
    }

    #[derive(Default)]
    struct CountingStorage {
        inner: MemoryStorage,
        writes: AtomicUsize,
        fail_reads: AtomicBool,
    }

    impl KeyValueStorage for CountingStorage {
        fn get(&self, key: &str) -> Result<Option<String>> {
            if self.fail_reads.load(Ordering::Relaxed) {
                return Err(VisitError::StorageUnavailable("read blocked".into()));
            }
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<()> {
            self.writes.fetch_add(1, Ordering::Relaxed);
            self.inner.set(key, value)
        }
    }

    #[test]
    fn test_writes_only_on_first_call() {
        let storage = CountingStorage::default();
        let provider = IdentityProvider::new(&storage);
        provider.get_or_create();
        provider.get_or_create();
        provider.get_or_create();
        assert_eq!(storage.writes.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_read_failure_keeps_stored_id() {
        let storage = CountingStorage::default();
        storage.inner.set(VISITOR_ID_KEY, "v1").unwrap();
        storage.fail_reads.store(true, Ordering::Relaxed);

        let provider = IdentityProvider::new(&storage);
        let transient = provider.get_or_create();
        assert_ne!(transient, VisitorId::new("v1"));
        assert_eq!(storage.writes.load(Ordering::Relaxed), 0);

        storage.fail_reads.store(false, Ordering::Relaxed);
        assert_eq!(provider.get_or_create(), VisitorId::new("v1"));
    }

    struct ReadOnlyStorage;

    impl KeyValueStorage for ReadOnlyStorage {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Ok(None)
        }

        fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(VisitError::StorageUnavailable("quota exceeded".into()))
        }
    }

    #[test]
    fn test_write_failure_still_returns_id() {
        let provider = IdentityProvider::new(ReadOnlyStorage);
        assert!(!provider.get_or_create().as_str().is_empty());
    }
}
