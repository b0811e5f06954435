use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing::debug;

use super::{channel, DocumentStore, Subscription, SubscriptionSink, WriteMode};
use crate::document::{as_count, merge_documents, Document, DocumentPath};
use crate::error::{Result, VisitError};

#[derive(Debug, Default)]
struct Inner {
    documents: BTreeMap<DocumentPath, Document>,
    subscribers: HashMap<DocumentPath, Vec<SubscriptionSink>>,
    writes: HashMap<DocumentPath, u64>,
}

impl Inner {
    /// Publishes the current state of `path`, forgetting closed sinks.
    fn notify(&mut self, path: &DocumentPath) {
        let current = self.documents.get(path).cloned();
        if let Some(sinks) = self.subscribers.get_mut(path) {
            sinks.retain(|sink| sink.send(Ok(current.clone())));
        }
    }

    fn record_write(&mut self, path: &DocumentPath) {
        *self.writes.entry(path.clone()).or_default() += 1;
        self.notify(path);
    }
}

/// A process-local document store.
///
/// Each operation runs under a single mutex, so individual reads, writes and
/// increments are atomic with respect to each other. Sequences of operations
/// are not.
///
/// Besides the [`DocumentStore`] surface it exposes a few inspection and
/// fault injection hooks (`write_count`, `fail_reads`, `fail_writes`,
/// `push_error`) used to exercise the error paths of its callers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `documents`.
    pub fn from_documents(documents: impl IntoIterator<Item = (DocumentPath, Document)>) -> Self {
        let store = Self::new();
        store.lock().documents.extend(documents);
        store
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copies out every stored document.
    pub fn documents(&self) -> BTreeMap<DocumentPath, Document> {
        self.lock().documents.clone()
    }

    /// Reads a document without going through the async interface.
    pub fn peek(&self, path: &DocumentPath) -> Option<Document> {
        self.lock().documents.get(path).cloned()
    }

    /// Stores a document directly, notifying subscribers but not counting
    /// as a write.
    pub fn insert(&self, path: DocumentPath, doc: Document) {
        let mut inner = self.lock();
        inner.documents.insert(path.clone(), doc);
        inner.notify(&path);
    }

    /// Number of writes (`set` and `increment`) applied to `path`.
    pub fn write_count(&self, path: &DocumentPath) -> u64 {
        self.lock().writes.get(path).copied().unwrap_or(0)
    }

    /// Number of live subscriptions on `path`.
    pub fn subscriber_count(&self, path: &DocumentPath) -> usize {
        let mut inner = self.lock();
        match inner.subscribers.get_mut(path) {
            Some(sinks) => {
                sinks.retain(|sink| !sink.is_closed());
                sinks.len()
            }
            None => 0,
        }
    }

    /// Makes every subsequent read and subscribe fail while `enabled`.
    pub fn fail_reads(&self, enabled: bool) {
        self.fail_reads.store(enabled, Ordering::Relaxed);
    }

    /// Makes every subsequent write fail while `enabled`.
    pub fn fail_writes(&self, enabled: bool) {
        self.fail_writes.store(enabled, Ordering::Relaxed);
    }

    /// Delivers an error event to every subscriber of `path`.
    pub fn push_error(&self, path: &DocumentPath, message: &str) {
        let mut inner = self.lock();
        if let Some(sinks) = inner.subscribers.get_mut(path) {
            sinks.retain(|sink| sink.send(Err(VisitError::Subscription(message.to_string()))));
        }
    }

    fn check_read(&self, path: &DocumentPath) -> Result<()> {
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(VisitError::Store(format!("read of {path} rejected")));
        }
        Ok(())
    }

    fn check_write(&self, path: &DocumentPath) -> Result<()> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(VisitError::Store(format!("write to {path} rejected")));
        }
        Ok(())
    }

    /// Builds the new version of `path` with `update` and hands it to
    /// `persist` together with the current documents. The write is only
    /// applied, counted and published if both succeed.
    fn commit<T>(
        &self,
        path: &DocumentPath,
        update: impl FnOnce(&mut Document) -> Result<T>,
        persist: impl FnOnce(&BTreeMap<DocumentPath, Document>, &Document) -> Result<()>,
    ) -> Result<T> {
        self.check_write(path)?;
        let mut inner = self.lock();
        let mut doc = inner.documents.get(path).cloned().unwrap_or_default();
        let value = update(&mut doc)?;
        persist(&inner.documents, &doc)?;
        inner.documents.insert(path.clone(), doc);
        inner.record_write(path);
        Ok(value)
    }

    /// [`DocumentStore::set`] gated on `persist`.
    pub(crate) fn set_persisted(
        &self,
        path: &DocumentPath,
        doc: Document,
        mode: WriteMode,
        persist: impl FnOnce(&BTreeMap<DocumentPath, Document>, &Document) -> Result<()>,
    ) -> Result<()> {
        self.commit(
            path,
            |existing| {
                match mode {
                    WriteMode::Replace => *existing = doc,
                    WriteMode::Merge => merge_documents(existing, doc),
                }
                Ok(())
            },
            persist,
        )?;
        debug!(%path, ?mode, "document written");
        Ok(())
    }

    /// [`DocumentStore::increment`] gated on `persist`.
    pub(crate) fn increment_persisted(
        &self,
        path: &DocumentPath,
        field: &str,
        delta: u64,
        extra: Document,
        persist: impl FnOnce(&BTreeMap<DocumentPath, Document>, &Document) -> Result<()>,
    ) -> Result<u64> {
        let next = self.commit(
            path,
            |doc| {
                let current = match doc.get(field) {
                    None | Some(Value::Null) => 0,
                    Some(value) => {
                        as_count(value).ok_or_else(|| VisitError::MalformedDocument {
                            path: path.to_string(),
                            reason: format!("{field} is not a non-negative integer: {value}"),
                        })?
                    }
                };
                let next = current.saturating_add(delta);
                doc.insert(field.to_string(), Value::from(next));
                merge_documents(doc, extra);
                Ok(next)
            },
            persist,
        )?;
        debug!(%path, field, next, "field incremented");
        Ok(next)
    }
}

impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>> {
        self.check_read(path)?;
        Ok(self.peek(path))
    }

    async fn set(&self, path: &DocumentPath, doc: Document, mode: WriteMode) -> Result<()> {
        self.set_persisted(path, doc, mode, |_, _| Ok(()))
    }

    async fn increment(
        &self,
        path: &DocumentPath,
        field: &str,
        delta: u64,
        extra: Document,
    ) -> Result<u64> {
        self.increment_persisted(path, field, delta, extra, |_, _| Ok(()))
    }

    fn subscribe(&self, path: &DocumentPath) -> Result<Subscription> {
        self.check_read(path)?;
        let (sink, subscription) = channel(path.clone());
        let mut inner = self.lock();
        sink.send(Ok(inner.documents.get(path).cloned()));
        inner.subscribers.entry(path.clone()).or_default().push(sink);
        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    fn counter() -> DocumentPath {
        DocumentPath::new("viewCounts", "profile").unwrap()
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = MemoryStore::new();
        assert!(store.get(&counter()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replace_drops_old_fields() {
        let store = MemoryStore::new();
        store
            .set(&counter(), doc(json!({"a": 1, "b": 2})), WriteMode::Replace)
            .await
            .unwrap();
        store
            .set(&counter(), doc(json!({"a": 3})), WriteMode::Replace)
            .await
            .unwrap();
        assert_eq!(
            Value::Object(store.peek(&counter()).unwrap()),
            json!({"a": 3})
        );
    }

    #[tokio::test]
    async fn test_merge_keeps_old_fields() {
        let store = MemoryStore::new();
        store.insert(counter(), doc(json!({"count": 1, "owner": "siraw"})));
        store
            .set(&counter(), doc(json!({"count": 2})), WriteMode::Merge)
            .await
            .unwrap();
        assert_eq!(
            Value::Object(store.peek(&counter()).unwrap()),
            json!({"count": 2, "owner": "siraw"})
        );
    }

    #[tokio::test]
    async fn test_write_count() {
        let store = MemoryStore::new();
        store.insert(counter(), Document::new());
        assert_eq!(store.write_count(&counter()), 0);
        store
            .set(&counter(), Document::new(), WriteMode::Merge)
            .await
            .unwrap();
        store
            .increment(&counter(), "count", 1, Document::new())
            .await
            .unwrap();
        assert_eq!(store.write_count(&counter()), 2);
    }

    #[tokio::test]
    async fn test_increment_from_nothing() {
        let store = MemoryStore::new();
        let next = store
            .increment(&counter(), "count", 1, doc(json!({"lastUpdate": "t"})))
            .await
            .unwrap();
        assert_eq!(next, 1);
        assert_eq!(
            Value::Object(store.peek(&counter()).unwrap()),
            json!({"count": 1, "lastUpdate": "t"})
        );
    }

    #[tokio::test]
    async fn test_increment_rejects_non_integer() {
        let store = MemoryStore::new();
        store.insert(counter(), doc(json!({"count": "many"})));
        let result = store.increment(&counter(), "count", 1, Document::new()).await;
        assert!(matches!(result, Err(VisitError::MalformedDocument { .. })));
    }

    #[tokio::test]
    async fn test_rejected_persist_leaves_store_untouched() {
        let store = MemoryStore::new();
        store.insert(counter(), doc(json!({"count": 4})));
        let mut subscription = store.subscribe(&counter()).unwrap();
        assert!(subscription.next().await.is_some());

        let refuse = |_: &BTreeMap<DocumentPath, Document>, _: &Document| -> Result<()> {
            Err(VisitError::Store("disk full".into()))
        };
        assert!(store
            .increment_persisted(&counter(), "count", 1, Document::new(), refuse)
            .is_err());
        assert!(store
            .set_persisted(&counter(), doc(json!({"count": 9})), WriteMode::Replace, refuse)
            .is_err());

        assert_eq!(store.peek(&counter()).unwrap()["count"], json!(4));
        assert_eq!(store.write_count(&counter()), 0);
        assert!(subscription.try_next().is_none());
    }

    #[tokio::test]
    async fn test_persist_sees_new_version() {
        let store = MemoryStore::new();
        store.insert(counter(), doc(json!({"count": 4})));
        let next = store
            .increment_persisted(&counter(), "count", 2, Document::new(), |current, updated| {
                assert_eq!(current[&counter()]["count"], json!(4));
                assert_eq!(updated["count"], json!(6));
                Ok(())
            })
            .unwrap();
        assert_eq!(next, 6);
        assert_eq!(store.write_count(&counter()), 1);
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        use std::sync::Arc;

        let store = Arc::new(MemoryStore::new());
        let mut handles = vec![];
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for _ in 0..25 {
                    store
                        .increment(&counter(), "count", 1, Document::new())
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.peek(&counter()).unwrap()["count"], json!(200));
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let store = MemoryStore::new();
        store.fail_reads(true);
        assert!(matches!(
            store.get(&counter()).await,
            Err(VisitError::Store(_))
        ));
        assert!(store.subscribe(&counter()).is_err());
        store.fail_reads(false);

        store.fail_writes(true);
        assert!(store
            .set(&counter(), Document::new(), WriteMode::Merge)
            .await
            .is_err());
        assert!(store
            .increment(&counter(), "count", 1, Document::new())
            .await
            .is_err());
        assert_eq!(store.write_count(&counter()), 0);
    }

    #[tokio::test]
    async fn test_subscribe_initial_then_updates() {
        let store = MemoryStore::new();
        store.insert(counter(), doc(json!({"count": 5})));

        let mut sub = store.subscribe(&counter()).unwrap();
        let initial = sub.next().await.unwrap().unwrap().unwrap();
        assert_eq!(initial["count"], json!(5));

        store
            .increment(&counter(), "count", 1, Document::new())
            .await
            .unwrap();
        let update = sub.next().await.unwrap().unwrap().unwrap();
        assert_eq!(update["count"], json!(6));
    }

    #[tokio::test]
    async fn test_push_error_reaches_subscribers() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe(&counter()).unwrap();
        let _ = sub.next().await;

        store.push_error(&counter(), "permission denied");
        assert!(matches!(
            sub.next().await.unwrap(),
            Err(VisitError::Subscription(_))
        ));
    }

    #[tokio::test]
    async fn test_unsubscribe_is_pruned() {
        let store = MemoryStore::new();
        let sub = store.subscribe(&counter()).unwrap();
        let other = DocumentPath::new("viewCounts", "other").unwrap();
        let _kept = store.subscribe(&other).unwrap();

        assert_eq!(store.subscriber_count(&counter()), 1);
        sub.unsubscribe();
        assert_eq!(store.subscriber_count(&counter()), 0);
        assert_eq!(store.subscriber_count(&other), 1);
    }

    #[test]
    fn test_from_documents() {
        let store = MemoryStore::from_documents([(counter(), doc(json!({"count": 7})))]);
        assert_eq!(store.documents().len(), 1);
        assert_eq!(store.write_count(&counter()), 0);
    }
}
