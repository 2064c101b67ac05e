//! Directory records: image and node definitions, external connectors.

use cml_lab_core::{ImageDefinitionId, NodeDefinitionId};
use serde::{Deserialize, Serialize};

/// A disk image usable by nodes of one node definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDefinition {
    /// Image id.
    pub id: ImageDefinitionId,
    /// Node definition the image belongs to.
    pub node_definition_id: NodeDefinitionId,
    /// Display name.
    #[serde(default)]
    pub label: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Shipped with the controller, cannot be changed.
    #[serde(default)]
    pub read_only: bool,
}

/// General section of a node definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDefinitionGeneral {
    /// Device nature (`router`, `switch`, `server`, ...).
    #[serde(default)]
    pub nature: Option<String>,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Shipped with the controller, cannot be changed.
    #[serde(default)]
    pub read_only: bool,
}

/// UI section of a node definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDefinitionUi {
    /// Display name.
    #[serde(default)]
    pub label: Option<String>,
    /// Description shown in the UI.
    #[serde(default)]
    pub description: Option<String>,
}

/// A device family, from `/simplified_node_definitions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Definition id, e.g. `alpine`.
    pub id: NodeDefinitionId,
    /// Images usable with this definition.
    #[serde(default)]
    pub image_definitions: Vec<ImageDefinitionId>,
    /// General section.
    #[serde(default)]
    pub general: NodeDefinitionGeneral,
    /// UI section.
    #[serde(default)]
    pub ui: NodeDefinitionUi,
}

/// A bridge from the lab network to the outside world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalConnector {
    /// Connector id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub label: String,
    /// Host bridge or interface the connector uses.
    #[serde(default)]
    pub device_name: String,
    /// Protocol, if any (`NAT`, `bridge`).
    #[serde(default)]
    pub protocol: Option<String>,
    /// Tags selecting the connector from a node configuration.
    #[serde(default)]
    pub tags: Vec<String>,
}
