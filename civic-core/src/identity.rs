//! Local session identity.
//!
//! The identity provider owns these values; the live client only reads them.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Opaque user identifier.
///
/// The backend sends owner ids both as JSON strings (`"17"`, UUIDs) and as
/// bare integers depending on the endpoint, so deserialization accepts both
/// and normalizes to the string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(i64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => UserId(s),
            Raw::Number(n) => UserId(n.to_string()),
        })
    }
}

/// Snapshot of who is using this client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    /// Present only when authenticated.
    pub user_id: Option<UserId>,
    pub is_admin: bool,
    /// Bearer credential for REST calls.
    pub auth_token: Option<String>,
}

impl SessionIdentity {
    /// Signed-out identity.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Signed-in citizen.
    pub fn citizen(user_id: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            user_id: Some(UserId::new(user_id)),
            is_admin: false,
            auth_token: Some(auth_token.into()),
        }
    }

    /// Signed-in administrator.
    pub fn admin(user_id: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            is_admin: true,
            ..Self::citizen(user_id, auth_token)
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    /// Whether `owner` is the local user.
    pub fn owns(&self, owner: &UserId) -> bool {
        self.user_id.as_ref() == Some(owner)
    }
}
