//! Collection addressing: `artifacts/{app_id}/users/{user_id}/{collection}`.

use std::fmt;
use std::str::FromStr;

use crate::identity::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Leads. The collection keeps its historical name.
    Ideas,
    Contacts,
}

impl Collection {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ideas => "ideas",
            Self::Contacts => "contacts",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ideas" => Ok(Self::Ideas),
            "contacts" => Ok(Self::Contacts),
            other => Err(format!("unknown collection '{other}'")),
        }
    }
}

/// Address of one user's collection within one application.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionPath {
    app_id: String,
    user_id: String,
    collection: Collection,
}

impl CollectionPath {
    #[must_use]
    pub fn new(app_id: &str, user: &UserId, collection: Collection) -> Self {
        Self {
            app_id: app_id.to_string(),
            user_id: user.as_str().to_string(),
            collection,
        }
    }

    #[must_use]
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    #[must_use]
    pub fn collection(&self) -> Collection {
        self.collection
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "artifacts/{}/users/{}/{}",
            self.app_id, self.user_id, self.collection
        )
    }
}

impl FromStr for CollectionPath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments: Vec<&str> = s.split('/').collect();
        match segments.as_slice() {
            ["artifacts", app_id, "users", user_id, collection]
                if !app_id.is_empty() && !user_id.is_empty() =>
            {
                Ok(Self {
                    app_id: (*app_id).to_string(),
                    user_id: (*user_id).to_string(),
                    collection: collection.parse()?,
                })
            }
            _ => Err(format!("malformed collection path '{s}'")),
        }
    }
}
