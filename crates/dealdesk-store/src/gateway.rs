//! Session-scoped lead and contact operations.

use std::sync::Arc;

use dealdesk_core::{Contact, Lead, LeadStatus, NewContact, NewLead};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use crate::document::{DocumentStore, Fields, StoredDocument};
use crate::identity::UserId;
use crate::path::{Collection, CollectionPath};
use crate::subscription::Subscription;
use crate::StoreError;

/// A persisted entity type and the collection it lives in.
///
/// Snapshots are decoded from the stored body plus the backend-assigned
/// `id`, the owning `ownerId` and the creation `timestamp`.
pub trait Entity: DeserializeOwned + Send + Sync + 'static {
    const COLLECTION: Collection;
}

impl Entity for Lead {
    const COLLECTION: Collection = Collection::Ideas;
}

impl Entity for Contact {
    const COLLECTION: Collection = Collection::Contacts;
}

fn decode<T: Entity>(path: &CollectionPath, doc: StoredDocument) -> Result<T, serde_json::Error> {
    let mut body = doc.data;
    body.insert("id".to_string(), Value::String(doc.id));
    body.insert(
        "ownerId".to_string(),
        Value::String(path.user_id().to_string()),
    );
    body.insert("timestamp".to_string(), serde_json::to_value(doc.created_at)?);
    serde_json::from_value(Value::Object(body))
}

/// Decodes every document, skipping (and logging) ones that no longer match
/// the entity shape.
pub(crate) fn decode_snapshot<T: Entity>(
    path: &CollectionPath,
    docs: Vec<StoredDocument>,
) -> Vec<T> {
    docs.into_iter()
        .filter_map(|doc| {
            let id = doc.id.clone();
            match decode(path, doc) {
                Ok(entity) => Some(entity),
                Err(error) => {
                    tracing::warn!(
                        collection = %path.collection(),
                        id = %id,
                        error = %error,
                        "skipping undecodable document"
                    );
                    None
                }
            }
        })
        .collect()
}

fn to_fields<T: Serialize>(value: &T) -> Result<Fields, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Validation(format!(
            "expected an object body, got {other}"
        ))),
    }
}

fn require_non_blank(field: &str, value: &str) -> Result<(), StoreError> {
    if value.trim().is_empty() {
        return Err(StoreError::Validation(format!("{field} is required")));
    }
    Ok(())
}

/// Entry point for persistence. Construct one per session with the backend
/// and application id; clones share the session.
#[derive(Clone)]
pub struct Gateway {
    store: Arc<dyn DocumentStore>,
    app_id: Arc<str>,
    session: Arc<watch::Sender<Option<UserId>>>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("app_id", &self.app_id)
            .field("user", &*self.session.borrow())
            .finish_non_exhaustive()
    }
}

impl Gateway {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, app_id: &str) -> Self {
        let (session, _) = watch::channel(None);
        Self {
            store,
            app_id: Arc::from(app_id),
            session: Arc::new(session),
        }
    }

    /// A gateway already signed in as `user`.
    #[must_use]
    pub fn for_user(store: Arc<dyn DocumentStore>, app_id: &str, user: UserId) -> Self {
        let gateway = Self::new(store, app_id);
        gateway.session.send_replace(Some(user));
        gateway
    }

    #[must_use]
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn sign_in_anonymously(&self) -> UserId {
        let user = UserId::anonymous();
        self.switch_user(Some(user.clone()));
        user
    }

    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] for a blank token.
    pub fn sign_in_with_custom_token(&self, token: &str) -> Result<UserId, StoreError> {
        let user = UserId::from_custom_token(token)?;
        self.switch_user(Some(user.clone()));
        Ok(user)
    }

    /// Ends the session; open subscriptions terminate.
    pub fn sign_out(&self) {
        self.switch_user(None);
    }

    #[must_use]
    pub fn current_user(&self) -> Option<UserId> {
        self.session.borrow().clone()
    }

    fn switch_user(&self, user: Option<UserId>) {
        match &user {
            Some(id) => tracing::info!(user_id = %id, "signed in"),
            None => tracing::info!("signed out"),
        }
        self.session.send_replace(user);
    }

    fn path(&self, collection: Collection) -> Result<(UserId, CollectionPath), StoreError> {
        let user = self.current_user().ok_or(StoreError::NotAuthenticated)?;
        let path = CollectionPath::new(&self.app_id, &user, collection);
        Ok((user, path))
    }

    /// Persists a lead, defaulting its status to `New`. Returns the new id.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotAuthenticated`] without a session,
    /// [`StoreError::Validation`] for blank property details, or a backend error.
    pub async fn create_lead(&self, lead: NewLead) -> Result<String, StoreError> {
        let (user, path) = self.path(Collection::Ideas)?;
        require_non_blank("propertyDetails", &lead.property_details)?;

        let mut lead = lead;
        lead.status.get_or_insert(LeadStatus::New);
        let doc = self.store.insert(&path, to_fields(&lead)?).await?;

        tracing::info!(user_id = %user, collection = %path.collection(), id = %doc.id, "lead created");
        Ok(doc.id)
    }

    /// # Errors
    ///
    /// [`StoreError::NotAuthenticated`] without a session,
    /// [`StoreError::Validation`] for a blank seller name, or a backend error.
    pub async fn create_contact(&self, contact: NewContact) -> Result<String, StoreError> {
        let (user, path) = self.path(Collection::Contacts)?;
        require_non_blank("sellerName", &contact.seller_name)?;

        let doc = self.store.insert(&path, to_fields(&contact)?).await?;

        tracing::info!(user_id = %user, collection = %path.collection(), id = %doc.id, "contact created");
        Ok(doc.id)
    }

    /// One-off snapshot of the signed-in user's leads.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotAuthenticated`] without a session, or a backend error.
    pub async fn list_leads(&self) -> Result<Vec<Lead>, StoreError> {
        self.list().await
    }

    /// # Errors
    ///
    /// [`StoreError::NotAuthenticated`] without a session, or a backend error.
    pub async fn list_contacts(&self) -> Result<Vec<Contact>, StoreError> {
        self.list().await
    }

    async fn list<T: Entity>(&self) -> Result<Vec<T>, StoreError> {
        let (_, path) = self.path(T::COLLECTION)?;
        let docs = self.store.list(&path).await?;
        Ok(decode_snapshot(&path, docs))
    }

    /// # Errors
    ///
    /// [`StoreError::NotAuthenticated`] without a session, or a backend error
    /// from the initial read.
    pub async fn subscribe_leads(&self) -> Result<Subscription<Lead>, StoreError> {
        self.subscribe().await
    }

    /// # Errors
    ///
    /// [`StoreError::NotAuthenticated`] without a session, or a backend error
    /// from the initial read.
    pub async fn subscribe_contacts(&self) -> Result<Subscription<Contact>, StoreError> {
        self.subscribe().await
    }

    async fn subscribe<T: Entity + Clone>(&self) -> Result<Subscription<T>, StoreError> {
        let (user, path) = self.path(T::COLLECTION)?;
        Subscription::open(
            Arc::clone(&self.store),
            path,
            user,
            Arc::clone(&self.session),
        )
        .await
    }

    /// Changes only the `status` field of a lead.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if the lead does not exist for this user.
    pub async fn update_lead_status(&self, id: &str, status: LeadStatus) -> Result<(), StoreError> {
        let (user, path) = self.path(Collection::Ideas)?;
        let mut patch = Fields::new();
        patch.insert("status".to_string(), serde_json::to_value(status)?);
        self.store.merge(&path, id, patch).await?;

        tracing::info!(user_id = %user, id, status = %status, "lead status updated");
        Ok(())
    }

    /// Deletes a lead. Deleting an id that does not exist succeeds.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotAuthenticated`] without a session, or a backend error.
    pub async fn delete_lead(&self, id: &str) -> Result<(), StoreError> {
        self.delete(Collection::Ideas, id).await
    }

    /// Deletes a contact. Deleting an id that does not exist succeeds.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotAuthenticated`] without a session, or a backend error.
    pub async fn delete_contact(&self, id: &str) -> Result<(), StoreError> {
        self.delete(Collection::Contacts, id).await
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        let (user, path) = self.path(collection)?;
        let removed = self.store.remove(&path, id).await?;
        if removed {
            tracing::info!(user_id = %user, collection = %collection, id, "document deleted");
        } else {
            tracing::debug!(user_id = %user, collection = %collection, id, "delete of missing document ignored");
        }
        Ok(())
    }
}
