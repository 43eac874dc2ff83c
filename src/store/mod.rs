// Document store collaborator
//
// The workflow only needs get / insert / per-document update / query-by-field.
// Updates are shallow merges: each top level key replaces the stored value and
// a `null` removes the field.

pub mod file;
pub mod memory;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub use file::FileStore;
pub use memory::MemoryStore;

pub const CONTRACTS: &str = "contracts";
pub const INVITES: &str = "invites";
pub const NOTIFICATIONS: &str = "notifications";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Document {collection}/{id} not found")]
    NotFound { collection: String, id: String },

    #[error("Document {collection}/{id} already exists")]
    AlreadyExists { collection: String, id: String },

    #[error("Invalid document id: {0}")]
    InvalidId(String),

    #[error("Document is not a JSON object")]
    NotAnObject,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store task failed: {0}")]
    Task(String),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError>;

    /// Create a new document; fails if the id is taken
    async fn insert(&self, collection: &str, id: &str, doc: Value) -> Result<(), StoreError>;

    /// Atomically merge `patch` into an existing document
    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<(), StoreError>;

    /// Documents whose top level `field` equals `value`, ordered by id
    async fn query(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Value>, StoreError>;
}

/// Fetch and decode a document
pub async fn fetch<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(collection, id).await? {
        Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
        None => Ok(None),
    }
}

/// Encode and insert a document
pub async fn put<T: Serialize>(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
    doc: &T,
) -> Result<(), StoreError> {
    store.insert(collection, id, serde_json::to_value(doc)?).await
}

/// Query and decode; documents that fail to decode are skipped
pub async fn query_as<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    field: &str,
    value: &Value,
) -> Result<Vec<T>, StoreError> {
    let docs = store.query(collection, field, value).await?;
    Ok(docs
        .into_iter()
        .filter_map(|doc| match serde_json::from_value(doc) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                tracing::warn!(
                    collection = %collection,
                    error = %e,
                    "Skipping undecodable document"
                );
                None
            }
        })
        .collect())
}

/// Shallow merge; `null` removes the key
pub fn merge_patch(doc: &mut Value, patch: Value) -> Result<(), StoreError> {
    let target = doc.as_object_mut().ok_or(StoreError::NotAnObject)?;
    let Value::Object(fields) = patch else {
        return Err(StoreError::NotAnObject);
    };
    for (key, value) in fields {
        if value.is_null() {
            target.remove(&key);
        } else {
            target.insert(key, value);
        }
    }
    Ok(())
}

/// Ids become file names, so keep them to a safe alphabet
pub fn validate_id(id: &str) -> Result<(), StoreError> {
    let valid = !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidId(id.to_string()))
    }
}
