//! Backend contract for schemaless per-collection documents.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::path::CollectionPath;
use crate::StoreError;

/// JSON object body of a document.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Capacity of backend change feeds. Slow subscribers lag and re-read.
pub(crate) const FEED_CAPACITY: usize = 256;

/// A document as held by a backend. `id` and `created_at` are assigned by
/// the backend and are not part of `data`.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub data: Fields,
}

/// Notification published on a backend's change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A document in this collection was inserted, updated or removed.
    Changed(CollectionPath),
    /// Changes may have been missed; every subscriber should re-read.
    Resync,
}

impl ChangeEvent {
    #[must_use]
    pub fn affects(&self, path: &CollectionPath) -> bool {
        match self {
            Self::Changed(changed) => changed == path,
            Self::Resync => true,
        }
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Stores a new document and returns it with its assigned id and
    /// creation time.
    async fn insert(
        &self,
        path: &CollectionPath,
        data: Fields,
    ) -> Result<StoredDocument, StoreError>;

    /// Shallow-merges `patch` into an existing document.
    ///
    /// Fails with [`StoreError::NotFound`] if `id` is not in `path`.
    async fn merge(&self, path: &CollectionPath, id: &str, patch: Fields)
        -> Result<(), StoreError>;

    /// Removes a document. Returns whether anything was removed.
    async fn remove(&self, path: &CollectionPath, id: &str) -> Result<bool, StoreError>;

    /// Every document in `path`, oldest first.
    async fn list(&self, path: &CollectionPath) -> Result<Vec<StoredDocument>, StoreError>;

    /// A receiver for change notifications across all collections.
    fn changes(&self) -> broadcast::Receiver<ChangeEvent>;
}
