//! Group records.

use cml_lab_core::{GroupId, LabId, UserId};
use serde::{Deserialize, Serialize};

use super::Permission;

/// A lab a group has access to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupLab {
    /// The lab.
    pub id: LabId,
    /// Access level on it.
    pub permission: Permission,
}

/// A set of users sharing lab permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Group id.
    pub id: GroupId,
    /// Unique group name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Member users.
    #[serde(default)]
    pub members: Vec<UserId>,
    /// Labs the group can access.
    #[serde(default)]
    pub labs: Vec<GroupLab>,
}

/// Fields for creating or updating a group. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupSpec {
    /// New group name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Replacement member list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<UserId>>,
    /// Replacement lab permissions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labs: Option<Vec<GroupLab>>,
}
