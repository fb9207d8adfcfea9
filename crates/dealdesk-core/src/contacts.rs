use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A seller contact as read back from a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    pub owner_id: String,
    pub seller_name: String,
    #[serde(default)]
    pub seller_phone: Option<String>,
    #[serde(default)]
    pub seller_email: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewContact {
    pub seller_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seller_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seller_email: Option<String>,
}
