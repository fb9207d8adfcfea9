//! User identity for store scoping.

use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::StoreError;

/// Opaque identifier of the user that owns a set of collections.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// A fresh identity with no credentials behind it.
    #[must_use]
    pub fn anonymous() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Derives a stable identity from a custom sign-in token.
    ///
    /// The same token always maps to the same user; the token itself is
    /// never stored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] for a blank token.
    pub fn from_custom_token(token: &str) -> Result<Self, StoreError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(StoreError::Validation(
                "custom token must not be blank".to_string(),
            ));
        }
        Ok(Self(format!("{:x}", Sha256::digest(token.as_bytes()))))
    }

    /// Wraps an identifier that was already resolved elsewhere.
    #[must_use]
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
