use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{DocumentStore, MemoryStore, Subscription, WriteMode};
use crate::document::{Document, DocumentPath};
use crate::error::Result;

/// A [`MemoryStore`] mirrored to a JSON file.
///
/// The file maps `collection/id` paths to documents and is rewritten on
/// every write, before the write becomes visible in memory. A write whose
/// file update fails is not applied. Subscriptions only see writes made
/// through this instance.
///
/// File I/O is blocking and runs on the calling task while the store lock
/// is held.
///
/// ```json
/// {
///   "uniqueVisitors/k3j9x2m1lq8fz0": { "firstVisit": "...", "userAgent": "..." },
///   "viewCounts/profile": { "count": 1, "lastUpdate": "..." }
/// }
/// ```
#[derive(Debug)]
pub struct JsonFileStore {
    inner: MemoryStore,
    path: PathBuf,
}

impl JsonFileStore {
    /// Opens the store at `path`, loading any existing documents.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let raw: BTreeMap<String, Document> = match fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        let documents = raw
            .into_iter()
            .map(|(key, doc)| Ok((key.parse::<DocumentPath>()?, doc)))
            .collect::<Result<Vec<_>>>()?;
        info!(path = %path.display(), documents = documents.len(), "document store opened");

        Ok(Self {
            inner: MemoryStore::from_documents(documents),
            path,
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The in-memory view of the store.
    pub fn memory(&self) -> &MemoryStore {
        &self.inner
    }

    /// Writes `documents`, with `path` replaced by `doc`, to a temporary
    /// file and renames it over the backing file.
    fn persist(
        &self,
        documents: &BTreeMap<DocumentPath, Document>,
        path: &DocumentPath,
        doc: &Document,
    ) -> Result<()> {
        let mut raw: BTreeMap<String, &Document> = documents
            .iter()
            .map(|(p, d)| (p.to_string(), d))
            .collect();
        raw.insert(path.to_string(), doc);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&raw)?)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "document store flushed");
        Ok(())
    }
}

impl DocumentStore for JsonFileStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>> {
        self.inner.get(path).await
    }

    async fn set(&self, path: &DocumentPath, doc: Document, mode: WriteMode) -> Result<()> {
        self.inner
            .set_persisted(path, doc, mode, |documents, updated| {
                self.persist(documents, path, updated)
            })
    }

    async fn increment(
        &self,
        path: &DocumentPath,
        field: &str,
        delta: u64,
        extra: Document,
    ) -> Result<u64> {
        self.inner
            .increment_persisted(path, field, delta, extra, |documents, updated| {
                self.persist(documents, path, updated)
            })
    }

    fn subscribe(&self, path: &DocumentPath) -> Result<Subscription> {
        self.inner.subscribe(path)
    }
}
