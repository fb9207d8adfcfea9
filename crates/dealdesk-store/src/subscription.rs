//! Live collection subscriptions.
//!
//! A subscription owns a background task that re-reads its collection every
//! time the backend reports a change and publishes the result on a `watch`
//! channel. Only the latest snapshot is retained: a slow consumer skips
//! intermediate snapshots instead of queueing them.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::document::{ChangeEvent, DocumentStore};
use crate::gateway::{decode_snapshot, Entity};
use crate::identity::UserId;
use crate::path::CollectionPath;
use crate::StoreError;

/// Stream of full-collection snapshots for one signed-in user.
///
/// The first call to [`Subscription::next_snapshot`] yields the collection as
/// it was when the subscription was opened. Each later call waits for the
/// next change. The subscription ends (yields `None`) when the session signs
/// out or switches user, or when the backend's change feed closes. Dropping
/// it, or calling [`Subscription::unsubscribe`], stops the background task.
#[derive(Debug)]
pub struct Subscription<T> {
    snapshots: watch::Receiver<Vec<T>>,
    initial_pending: bool,
    task: JoinHandle<()>,
    // Keeps the session alive for as long as the subscription is held.
    _session: Arc<watch::Sender<Option<UserId>>>,
}

impl<T: Entity + Clone> Subscription<T> {
    pub(crate) async fn open(
        store: Arc<dyn DocumentStore>,
        path: CollectionPath,
        user: UserId,
        session: Arc<watch::Sender<Option<UserId>>>,
    ) -> Result<Self, StoreError> {
        // Subscribe before the first read so no change can slip between them.
        let session_rx = session.subscribe();
        if session_rx.borrow().as_ref() != Some(&user) {
            return Err(StoreError::NotAuthenticated);
        }
        let feed = store.changes();
        let initial = decode_snapshot::<T>(&path, store.list(&path).await?);
        let (tx, rx) = watch::channel(initial);

        tracing::debug!(collection = %path.collection(), user_id = %user, "subscription opened");
        let task = tokio::spawn(relay(store, path, user, feed, session_rx, tx));

        Ok(Self {
            snapshots: rx,
            initial_pending: true,
            task,
            _session: session,
        })
    }

    /// Waits for the next snapshot, or `None` once the subscription has ended.
    pub async fn next_snapshot(&mut self) -> Option<Vec<T>> {
        if self.initial_pending {
            self.initial_pending = false;
            return Some(self.snapshots.borrow_and_update().clone());
        }
        self.snapshots.changed().await.ok()?;
        Some(self.snapshots.borrow_and_update().clone())
    }

    /// The most recent snapshot, without waiting.
    #[must_use]
    pub fn latest(&self) -> Vec<T> {
        self.snapshots.borrow().clone()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    /// Releases the subscription.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn relay<T: Entity>(
    store: Arc<dyn DocumentStore>,
    path: CollectionPath,
    user: UserId,
    mut feed: broadcast::Receiver<ChangeEvent>,
    mut session: watch::Receiver<Option<UserId>>,
    tx: watch::Sender<Vec<T>>,
) {
    loop {
        tokio::select! {
            changed = session.changed() => {
                let still_signed_in = changed.is_ok() && session.borrow().as_ref() == Some(&user);
                if !still_signed_in {
                    tracing::debug!(collection = %path.collection(), user_id = %user, "session ended, closing subscription");
                    break;
                }
            }
            event = feed.recv() => match event {
                Ok(event) if event.affects(&path) => refresh(store.as_ref(), &path, &tx).await,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(collection = %path.collection(), skipped, "change feed lagged, re-reading collection");
                    refresh(store.as_ref(), &path, &tx).await;
                }
                Err(RecvError::Closed) => break,
            },
            () = tx.closed() => break,
        }
    }
}

async fn refresh<T: Entity>(
    store: &dyn DocumentStore,
    path: &CollectionPath,
    tx: &watch::Sender<Vec<T>>,
) {
    match store.list(path).await {
        Ok(docs) => {
            tx.send_replace(decode_snapshot(path, docs));
        }
        // Keep the previous snapshot; the next change retries the read.
        Err(error) => {
            tracing::warn!(collection = %path.collection(), error = %error, "failed to refresh subscription snapshot");
        }
    }
}
