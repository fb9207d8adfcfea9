//! Postgres-backed [`DocumentStore`].
//!
//! Documents live in the `documents` table with a `jsonb` body. A row
//! trigger issues `NOTIFY dealdesk_document_changes` with the collection
//! path as payload; a relay task forwards those notifications onto the
//! in-process change feed, so writes from any process reach subscribers.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgListener;
use sqlx::types::Json;
use sqlx::PgPool;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::document::{ChangeEvent, DocumentStore, Fields, StoredDocument, FEED_CAPACITY};
use crate::path::CollectionPath;
use crate::StoreError;

/// Channel name used by the `documents` trigger.
pub const CHANGE_CHANNEL: &str = "dealdesk_document_changes";

const RELAY_ERROR_PAUSE: Duration = Duration::from_secs(1);

#[derive(Debug, sqlx::FromRow)]
struct DocumentRow {
    id: Uuid,
    created_at: DateTime<Utc>,
    data: Json<Fields>,
}

impl From<DocumentRow> for StoredDocument {
    fn from(row: DocumentRow) -> Self {
        Self {
            id: row.id.to_string(),
            created_at: row.created_at,
            data: row.data.0,
        }
    }
}

#[derive(Debug)]
pub struct PgStore {
    pool: PgPool,
    feed: broadcast::Sender<ChangeEvent>,
    relay: JoinHandle<()>,
}

impl PgStore {
    /// Starts listening for change notifications and returns the store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlx`] if the listener connection cannot be
    /// established.
    pub async fn connect(pool: PgPool) -> Result<Self, StoreError> {
        let mut listener = PgListener::connect_with(&pool).await?;
        listener.listen(CHANGE_CHANNEL).await?;

        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        let relay = tokio::spawn(relay_notifications(listener, feed.clone()));

        Ok(Self { pool, feed, relay })
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl Drop for PgStore {
    fn drop(&mut self) {
        self.relay.abort();
    }
}

async fn relay_notifications(mut listener: PgListener, feed: broadcast::Sender<ChangeEvent>) {
    loop {
        match listener.try_recv().await {
            Ok(Some(notification)) => match notification.payload().parse::<CollectionPath>() {
                Ok(path) => {
                    let _ = feed.send(ChangeEvent::Changed(path));
                }
                Err(error) => {
                    tracing::warn!(
                        payload = notification.payload(),
                        error = %error,
                        "ignoring unrecognised change notification"
                    );
                }
            },
            // Connection dropped; the listener reconnects on the next call.
            Ok(None) => {
                tracing::warn!("change listener lost its connection, resyncing subscribers");
                let _ = feed.send(ChangeEvent::Resync);
            }
            Err(error) => {
                tracing::error!(error = %error, "change listener failed");
                let _ = feed.send(ChangeEvent::Resync);
                tokio::time::sleep(RELAY_ERROR_PAUSE).await;
            }
        }
    }
}

fn parse_id(path: &CollectionPath, id: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(id).map_err(|_| StoreError::NotFound {
        collection: path.collection(),
        id: id.to_string(),
    })
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn insert(
        &self,
        path: &CollectionPath,
        data: Fields,
    ) -> Result<StoredDocument, StoreError> {
        let row = sqlx::query_as::<_, DocumentRow>(
            "INSERT INTO documents (id, app_id, user_id, collection, data) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, created_at, data",
        )
        .bind(Uuid::new_v4())
        .bind(path.app_id())
        .bind(path.user_id())
        .bind(path.collection().as_str())
        .bind(Json(&data))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn merge(
        &self,
        path: &CollectionPath,
        id: &str,
        patch: Fields,
    ) -> Result<(), StoreError> {
        let uuid = parse_id(path, id)?;
        let result = sqlx::query(
            "UPDATE documents SET data = data || $5 \
             WHERE app_id = $1 AND user_id = $2 AND collection = $3 AND id = $4",
        )
        .bind(path.app_id())
        .bind(path.user_id())
        .bind(path.collection().as_str())
        .bind(uuid)
        .bind(Json(&patch))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                collection: path.collection(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn remove(&self, path: &CollectionPath, id: &str) -> Result<bool, StoreError> {
        let Ok(uuid) = Uuid::parse_str(id) else {
            return Ok(false);
        };
        let result = sqlx::query(
            "DELETE FROM documents \
             WHERE app_id = $1 AND user_id = $2 AND collection = $3 AND id = $4",
        )
        .bind(path.app_id())
        .bind(path.user_id())
        .bind(path.collection().as_str())
        .bind(uuid)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, path: &CollectionPath) -> Result<Vec<StoredDocument>, StoreError> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            "SELECT id, created_at, data FROM documents \
             WHERE app_id = $1 AND user_id = $2 AND collection = $3 \
             ORDER BY created_at, id",
        )
        .bind(path.app_id())
        .bind(path.user_id())
        .bind(path.collection().as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(StoredDocument::from).collect())
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.feed.subscribe()
    }
}
