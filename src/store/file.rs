// JSON-file document store: one directory per collection, one file per document.
// Writers take an advisory lock on the collection and replace files by rename,
// so readers never observe a half written document.

use async_trait::async_trait;
use fd_lock::RwLock;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{merge_patch, validate_id, DocumentStore, StoreError};

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_dir(&self, collection: &str) -> Result<PathBuf, StoreError> {
        validate_id(collection)?;
        Ok(self.root.join(collection))
    }

    fn doc_path(&self, collection: &str, id: &str) -> Result<PathBuf, StoreError> {
        validate_id(id)?;
        Ok(self.collection_dir(collection)?.join(format!("{id}.json")))
    }

    /// Run `write` under the collection's exclusive lock on the blocking pool
    async fn locked<R, F>(&self, collection: &str, write: F) -> Result<R, StoreError>
    where
        R: Send + 'static,
        F: FnOnce() -> Result<R, StoreError> + Send + 'static,
    {
        let dir = self.collection_dir(collection)?;
        tokio::task::spawn_blocking(move || {
            fs::create_dir_all(&dir)?;
            let lock_file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(dir.join(".lock"))?;
            let mut lock = RwLock::new(lock_file);
            let _guard = lock.write()?;
            write()
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn write_atomically(path: &Path, doc: &Value) -> Result<(), StoreError> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(doc)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_doc(path: &Path) -> Result<Option<Value>, StoreError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let path = self.doc_path(collection, id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn insert(&self, collection: &str, id: &str, doc: Value) -> Result<(), StoreError> {
        if !doc.is_object() {
            return Err(StoreError::NotAnObject);
        }
        let path = self.doc_path(collection, id)?;
        let (collection_name, doc_id) = (collection.to_string(), id.to_string());
        self.locked(collection, move || {
            if path.exists() {
                return Err(StoreError::AlreadyExists {
                    collection: collection_name,
                    id: doc_id,
                });
            }
            write_atomically(&path, &doc)
        })
        .await?;
        debug!(collection = %collection, id = %id, "Inserted document");
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<(), StoreError> {
        let path = self.doc_path(collection, id)?;
        let (collection_name, doc_id) = (collection.to_string(), id.to_string());
        self.locked(collection, move || {
            let mut doc = read_doc(&path)?.ok_or(StoreError::NotFound {
                collection: collection_name,
                id: doc_id,
            })?;
            merge_patch(&mut doc, patch)?;
            write_atomically(&path, &doc)
        })
        .await?;
        debug!(collection = %collection, id = %id, "Updated document");
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Value>, StoreError> {
        let dir = self.collection_dir(collection)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut matches = Vec::new();
        for path in paths {
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                // Removed between listing and reading
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let doc: Value = serde_json::from_slice(&bytes)?;
            if doc.get(field) == Some(value) {
                matches.push(doc);
            }
        }
        Ok(matches)
    }
}
