//! Lab records.

use std::collections::BTreeMap;

use cml_lab_core::{GroupId, LabId, NodeId, State, UserId};
use serde::{Deserialize, Serialize};

use super::{Link, Node, User};

/// Access level a group has on a lab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// View only.
    ReadOnly,
    /// View and modify.
    ReadWrite,
}

/// A group's permission on a lab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabGroup {
    /// The group.
    pub id: GroupId,
    /// Its access level.
    pub permission: Permission,
}

/// A lab as seen by the client.
///
/// A shallow read fills the scalar fields only. A deep read also resolves
/// the owner and fills `nodes` (each with its interfaces) and `links`,
/// after which `node_count` and `link_count` match the collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lab {
    /// Lab id.
    pub id: LabId,
    /// Aggregate state of the nodes.
    pub state: State,
    /// Title.
    #[serde(rename = "lab_title", default)]
    pub title: String,
    /// Free-form description.
    #[serde(rename = "lab_description", default)]
    pub description: String,
    /// Notes.
    #[serde(rename = "lab_notes", default)]
    pub notes: String,
    /// Creation timestamp.
    #[serde(default)]
    pub created: Option<String>,
    /// Last modification timestamp.
    #[serde(default)]
    pub modified: Option<String>,
    /// Owning user.
    #[serde(default)]
    pub owner: Option<UserId>,
    /// The resolved owner record (deep reads only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_user: Option<User>,
    /// Number of nodes.
    #[serde(default)]
    pub node_count: usize,
    /// Number of links.
    #[serde(default)]
    pub link_count: usize,
    /// Groups with access.
    #[serde(default)]
    pub groups: Vec<LabGroup>,
    /// Nodes by id (deep reads only).
    #[serde(default)]
    pub nodes: BTreeMap<NodeId, Node>,
    /// Sorted by link id.
    #[serde(default)]
    pub links: Vec<Link>,
}

impl Lab {
    /// Find a node by its label.
    #[must_use]
    pub fn node_by_label(&self, label: &str) -> Option<&Node> {
        self.nodes.values().find(|n| n.label == label)
    }

    /// Find a node by label, falling back to its id.
    #[must_use]
    pub fn node_by_label_or_id(&self, key: &str) -> Option<&Node> {
        self.node_by_label(key).or_else(|| {
            key.parse::<NodeId>()
                .ok()
                .and_then(|id| self.nodes.get(&id))
        })
    }

    /// Nodes carrying `tag`, in id order.
    pub fn nodes_tagged<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes
            .values()
            .filter(move |n| n.tags.iter().any(|t| t == tag))
    }

    /// True if the lab is in any running state.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.state.is_active()
    }
}

/// Fields for creating or updating a lab. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LabSpec {
    /// Title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Notes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Replacement group permissions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<LabGroup>>,
}

/// Answer of `POST /import`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImportResult {
    /// The new lab.
    pub id: LabId,
    /// Problems the controller worked around.
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_controller_record() {
        let lab: Lab = serde_json::from_value(json!({
            "id": "lab1",
            "state": "DEFINED_ON_CORE",
            "created": "2022-10-25T10:00:00+00:00",
            "modified": "2022-10-25T10:00:00+00:00",
            "lab_title": "demo",
            "lab_description": "",
            "lab_notes": "",
            "owner": "00000000-0000-4000-a000-000000000000",
            "node_count": 2,
            "link_count": 1,
            "groups": [{"id": "g1", "permission": "read_only"}]
        }))
        .unwrap();

        assert_eq!(lab.title, "demo");
        assert_eq!(lab.state, State::Defined);
        assert_eq!(lab.node_count, 2);
        assert!(lab.nodes.is_empty());
        assert_eq!(lab.groups[0].permission, Permission::ReadOnly);
    }

    #[test]
    fn spec_skips_unset_fields() {
        let spec = LabSpec {
            title: Some("t".into()),
            ..LabSpec::default()
        };
        assert_eq!(serde_json::to_value(&spec).unwrap(), json!({"title": "t"}));
    }
}
