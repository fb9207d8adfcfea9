//! In-process [`DocumentStore`] used when no database is configured and in
//! tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::document::{ChangeEvent, DocumentStore, Fields, StoredDocument, FEED_CAPACITY};
use crate::path::CollectionPath;
use crate::StoreError;

#[derive(Debug)]
pub struct MemoryStore {
    collections: RwLock<HashMap<CollectionPath, Vec<StoredDocument>>>,
    feed: broadcast::Sender<ChangeEvent>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            collections: RwLock::new(HashMap::new()),
            feed,
        }
    }

    fn publish(&self, path: &CollectionPath) {
        // No receivers is fine: nobody is subscribed yet.
        let _ = self.feed.send(ChangeEvent::Changed(path.clone()));
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(
        &self,
        path: &CollectionPath,
        data: Fields,
    ) -> Result<StoredDocument, StoreError> {
        let doc = StoredDocument {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            data,
        };
        self.collections
            .write()
            .await
            .entry(path.clone())
            .or_default()
            .push(doc.clone());
        self.publish(path);
        Ok(doc)
    }

    async fn merge(
        &self,
        path: &CollectionPath,
        id: &str,
        patch: Fields,
    ) -> Result<(), StoreError> {
        {
            let mut collections = self.collections.write().await;
            let doc = collections
                .get_mut(path)
                .and_then(|docs| docs.iter_mut().find(|d| d.id == id))
                .ok_or_else(|| StoreError::NotFound {
                    collection: path.collection(),
                    id: id.to_string(),
                })?;
            doc.data.extend(patch);
        }
        self.publish(path);
        Ok(())
    }

    async fn remove(&self, path: &CollectionPath, id: &str) -> Result<bool, StoreError> {
        let removed = {
            let mut collections = self.collections.write().await;
            match collections.get_mut(path) {
                Some(docs) => {
                    let before = docs.len();
                    docs.retain(|d| d.id != id);
                    docs.len() != before
                }
                None => false,
            }
        };
        if removed {
            self.publish(path);
        }
        Ok(removed)
    }

    async fn list(&self, path: &CollectionPath) -> Result<Vec<StoredDocument>, StoreError> {
        Ok(self
            .collections
            .read()
            .await
            .get(path)
            .cloned()
            .unwrap_or_default())
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.feed.subscribe()
    }
}
