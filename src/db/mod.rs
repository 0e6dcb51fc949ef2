//! Embedded document store.
//!
//! # Data Flow
//! ```text
//! DATABASE_URI
//!     → connect() (memory:// or file://<path>)
//!     → Database (collections of JSON documents, shared via Arc)
//!     → Collection (validated CRUD against a CollectionSpec)
//!     → query.rs (list filters, sort, select, pagination)
//! ```
//!
//! # Design Decisions
//! - Documents are plain JSON objects with `_id` and `createdAt` assigned on insert
//! - Required and unique fields are declared per collection, checked on every write
//! - `file://` stores write the next snapshot before a change becomes visible;
//!   a failed snapshot write leaves memory untouched and is published to
//!   [`Database::watch_persistence`]
//! - Writes are serialized store-wide; reads never wait on a snapshot write
//! - No retry on connect: a bad URI or unreadable file aborts startup

pub mod collection;
pub mod query;

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{watch, Mutex};

use crate::lifecycle::ShutdownSignal;

pub use collection::{Collection, CollectionSpec};
pub use query::{ListQuery, Page, Pagination};

/// A stored document.
pub type Document = serde_json::Map<String, Value>;

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("unsupported database uri '{0}'")]
    UnsupportedUri(String),

    #[error("failed to read database file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed database file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to persist database: {0}")]
    Persist(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("duplicate value for unique field '{0}'")]
    Duplicate(String),

    #[error("validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

/// Handle to the document store. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Database {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    collections: DashMap<String, Vec<Document>>,
    path: Option<PathBuf>,
    write_lock: Mutex<()>,
    /// Last snapshot write failure.
    failures: watch::Sender<Option<String>>,
}

impl Database {
    /// Open the store named by `uri`.
    pub async fn connect(uri: &str) -> Result<Self, DbError> {
        if let Some(rest) = uri.strip_prefix("memory://") {
            if !rest.is_empty() {
                return Err(DbError::UnsupportedUri(uri.to_string()));
            }
            return Ok(Self::in_memory());
        }

        if let Some(path) = uri.strip_prefix("file://") {
            if path.is_empty() {
                return Err(DbError::UnsupportedUri(uri.to_string()));
            }
            let path = PathBuf::from(path);
            let loaded = tokio::task::spawn_blocking({
                let path = path.clone();
                move || load_snapshot(&path)
            })
            .await
            .map_err(|e| DbError::Persist(e.to_string()))??;
            let db = Self::with_collections(loaded, Some(path.clone()));
            tracing::info!(
                path = %path.display(),
                documents = db.document_count(),
                "Document store loaded"
            );
            return Ok(db);
        }

        Err(DbError::UnsupportedUri(uri.to_string()))
    }

    /// A fresh, empty process-local store.
    pub fn in_memory() -> Self {
        Self::with_collections(BTreeMap::new(), None)
    }

    fn with_collections(collections: BTreeMap<String, Vec<Document>>, path: Option<PathBuf>) -> Self {
        let map = DashMap::new();
        for (name, docs) in collections {
            map.insert(name, docs);
        }
        Self {
            inner: Arc::new(Inner {
                collections: map,
                path,
                write_lock: Mutex::new(()),
                failures: watch::channel(None).0,
            }),
        }
    }

    /// Access a collection described by `spec`.
    pub fn collection(&self, spec: &'static CollectionSpec) -> Collection<'_> {
        Collection::new(self, spec)
    }

    /// Total number of documents across collections.
    pub fn document_count(&self) -> usize {
        self.inner.collections.iter().map(|c| c.value().len()).sum()
    }

    pub(crate) fn collections(&self) -> &DashMap<String, Vec<Document>> {
        &self.inner.collections
    }

    /// Whether writes are mirrored to a snapshot file.
    pub fn is_persistent(&self) -> bool {
        self.inner.path.is_some()
    }

    /// Apply `change` to a copy of collection `name` and commit it.
    ///
    /// For `file://` stores the snapshot containing the change is written
    /// first; if that fails the collection is left as it was.
    pub(crate) async fn write<T, F>(&self, name: &str, change: F) -> Result<T, DbError>
    where
        F: FnOnce(&mut Vec<Document>) -> Result<T, DbError>,
    {
        let _write = self.inner.write_lock.lock().await;

        let mut docs = self
            .inner
            .collections
            .get(name)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        let out = change(&mut docs)?;

        let docs = match &self.inner.path {
            None => docs,
            Some(path) => self.persist(path, name, docs).await?,
        };
        self.inner.collections.insert(name.to_string(), docs);
        Ok(out)
    }

    /// Write the snapshot with `docs` standing in for collection `name`.
    /// Hands `docs` back once the snapshot is on disk.
    async fn persist(&self, path: &Path, name: &str, docs: Vec<Document>) -> Result<Vec<Document>, DbError> {
        let mut snapshot: BTreeMap<String, Vec<Document>> = self
            .inner
            .collections
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        snapshot.insert(name.to_string(), docs);

        let target = path.to_path_buf();
        let written = tokio::task::spawn_blocking(move || {
            write_snapshot(&target, &snapshot).map(|()| snapshot)
        })
        .await
        .map_err(|e| DbError::Persist(e.to_string()))
        .and_then(|result| result);

        match written {
            Ok(mut snapshot) => {
                tracing::debug!(path = %path.display(), "Document store persisted");
                Ok(snapshot.remove(name).unwrap_or_default())
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Snapshot write failed, change discarded");
                self.inner.failures.send_replace(Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Resolve with an error once a snapshot write fails, or with `Ok` when
    /// shutdown starts first.
    pub async fn watch_persistence(self, mut shutdown: ShutdownSignal) -> Result<(), DbError> {
        let mut failures = self.inner.failures.subscribe();
        tokio::select! {
            failed = failures.wait_for(Option::is_some) => match failed {
                Ok(message) => Err(DbError::Persist((*message).clone().unwrap_or_default())),
                Err(_) => Ok(()),
            },
            _ = shutdown.recv() => Ok(()),
        }
    }
}

fn write_snapshot(path: &Path, snapshot: &BTreeMap<String, Vec<Document>>) -> Result<(), DbError> {
    let io_err = |e: std::io::Error| DbError::Persist(e.to_string());

    let tmp = path.with_extension("tmp");
    let mut writer = BufWriter::new(File::create(&tmp).map_err(io_err)?);
    serde_json::to_writer(&mut writer, snapshot).map_err(|e| DbError::Persist(e.to_string()))?;
    let file = writer.into_inner().map_err(|e| io_err(e.into_error()))?;
    file.sync_all().map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}

fn load_snapshot(path: &Path) -> Result<BTreeMap<String, Vec<Document>>, DbError> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let file = File::open(path).map_err(|source| DbError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| DbError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    static NOTES: CollectionSpec = CollectionSpec {
        name: "notes",
        required: &["title"],
        unique: &[],
    };

    static TOPICS: CollectionSpec = CollectionSpec {
        name: "topics",
        required: &["title"],
        unique: &["title"],
    };

    fn titled(title: &str) -> Document {
        let mut doc = Document::new();
        doc.insert("title".into(), json!(title));
        doc
    }

    #[tokio::test]
    async fn test_connect_rejects_unknown_scheme() {
        let err = Database::connect("mongodb://localhost/devcamper").await.unwrap_err();
        assert!(matches!(err, DbError::UnsupportedUri(_)));
    }

    #[tokio::test]
    async fn test_file_store_survives_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        let uri = format!("file://{}", dir.path().join("db.json").display());

        let db = Database::connect(&uri).await.unwrap();
        let mut doc = Document::new();
        doc.insert("title".into(), json!("persisted"));
        let saved = db.collection(&NOTES).insert(doc).await.unwrap();

        let reopened = Database::connect(&uri).await.unwrap();
        let found = reopened
            .collection(&NOTES)
            .find_by_id(saved["_id"].as_str().unwrap())
            .unwrap();
        assert_eq!(found["title"], "persisted");
    }

    #[tokio::test]
    async fn test_corrupt_file_fails_connect() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = Database::connect(&format!("file://{}", path.display()))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_failed_snapshot_write_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store_dir = dir.path().join("store");
        std::fs::create_dir(&store_dir).unwrap();
        let uri = format!("file://{}", store_dir.join("db.json").display());
        let db = Database::connect(&uri).await.unwrap();
        let topics = db.collection(&TOPICS);

        std::fs::remove_dir(&store_dir).unwrap();
        let err = topics.insert(titled("rust")).await.unwrap_err();
        assert!(matches!(err, DbError::Persist(_)));
        assert_eq!(topics.count(), 0);
        assert!(topics.find_by_field("title", &json!("rust")).is_none());

        // The rejected document left nothing behind to clash with.
        std::fs::create_dir(&store_dir).unwrap();
        let saved = topics.insert(titled("rust")).await.unwrap();
        assert_eq!(topics.count(), 1);

        let reopened = Database::connect(&uri).await.unwrap();
        assert_eq!(reopened.collection(&TOPICS).count(), 1);
        assert_eq!(
            reopened.collection(&TOPICS).find_by_id(saved["_id"].as_str().unwrap()).unwrap()["title"],
            "rust"
        );
    }

    #[tokio::test]
    async fn test_failed_update_keeps_previous_document() {
        let dir = tempfile::tempdir().unwrap();
        let store_dir = dir.path().join("store");
        std::fs::create_dir(&store_dir).unwrap();
        let db = Database::connect(&format!("file://{}", store_dir.join("db.json").display()))
            .await
            .unwrap();
        let topics = db.collection(&TOPICS);
        let saved = topics.insert(titled("rust")).await.unwrap();
        let id = saved["_id"].as_str().unwrap();

        std::fs::remove_dir_all(&store_dir).unwrap();
        assert!(topics.update(id, titled("go")).await.is_err());
        assert!(topics.delete(id).await.is_err());
        assert_eq!(topics.find_by_id(id).unwrap()["title"], "rust");
    }

    #[tokio::test]
    async fn test_watch_persistence_reports_failed_write() {
        let dir = tempfile::tempdir().unwrap();
        let store_dir = dir.path().join("store");
        std::fs::create_dir(&store_dir).unwrap();
        let db = Database::connect(&format!("file://{}", store_dir.join("db.json").display()))
            .await
            .unwrap();
        assert!(db.is_persistent());

        let shutdown = crate::lifecycle::Shutdown::new();
        let watcher = tokio::spawn(db.clone().watch_persistence(shutdown.subscribe()));

        std::fs::remove_dir(&store_dir).unwrap();
        assert!(db.collection(&NOTES).insert(titled("lost")).await.is_err());

        let result = tokio::time::timeout(std::time::Duration::from_secs(5), watcher)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(DbError::Persist(_))));
    }

    #[tokio::test]
    async fn test_watch_persistence_ends_on_shutdown() {
        let shutdown = crate::lifecycle::Shutdown::new();
        let watcher = tokio::spawn(Database::in_memory().watch_persistence(shutdown.subscribe()));
        shutdown.trigger(crate::lifecycle::ShutdownReason::Closed);

        let result = tokio::time::timeout(std::time::Duration::from_secs(5), watcher)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
