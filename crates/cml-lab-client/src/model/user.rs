//! User records.

use cml_lab_core::{GroupId, UserId};
use serde::{Deserialize, Serialize};

/// A controller account.
///
/// The controller never returns `password`. The client keeps the value last
/// written through it so callers diffing desired against actual state see
/// it unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User id.
    pub id: UserId,
    /// Login name.
    pub username: String,
    /// Full name.
    #[serde(default)]
    pub fullname: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Contact address.
    #[serde(default)]
    pub email: String,
    /// Administrator rights.
    #[serde(default)]
    pub admin: bool,
    /// Groups the user belongs to.
    #[serde(default)]
    pub groups: Vec<GroupId>,
    /// Resource pool limiting the user, if any.
    #[serde(default)]
    pub resource_pool: Option<String>,
    /// Last password written through this client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Fields for creating or updating a user. `None` fields are left unchanged.
#[derive(Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserSpec {
    /// Login name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// New password. Write-only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Full name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fullname: Option<String>,
    /// Free-form description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Contact address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Administrator rights.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin: Option<bool>,
    /// Replacement group list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<GroupId>>,
    /// Resource pool.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_pool: Option<String>,
}

impl std::fmt::Debug for UserSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserSpec")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("fullname", &self.fullname)
            .field("admin", &self.admin)
            .field("groups", &self.groups)
            .finish_non_exhaustive()
    }
}
