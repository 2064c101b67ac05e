//! Node records.

use std::collections::BTreeMap;

use cml_lab_core::{ImageDefinitionId, InterfaceId, LabId, NodeDefinitionId, NodeId, State};
use serde::{Deserialize, Serialize};

use super::Interface;

/// A serial console attached to a running node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialDevice {
    /// Key for opening the console.
    pub console_key: String,
    /// Serial port number.
    pub device_number: u32,
}

/// A virtual device in a lab.
///
/// `configuration` and `image_definition` may only change while the node is
/// `DEFINED_ON_CORE`. `compute_id`, `serial_devices` and `vnc_key` are only
/// populated while the node runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Node id.
    pub id: NodeId,
    /// Owning lab.
    pub lab_id: LabId,
    /// Unique label within the lab.
    pub label: String,
    /// Device family.
    pub node_definition: NodeDefinitionId,
    /// Disk image. `None` selects the definition default.
    #[serde(default)]
    pub image_definition: Option<ImageDefinitionId>,
    /// Startup configuration.
    #[serde(default)]
    pub configuration: Option<String>,
    /// Canvas x coordinate.
    #[serde(default)]
    pub x: i64,
    /// Canvas y coordinate.
    #[serde(default)]
    pub y: i64,
    /// Virtual CPUs.
    #[serde(default)]
    pub cpus: Option<u32>,
    /// CPU limit in percent.
    #[serde(default)]
    pub cpu_limit: Option<u32>,
    /// Memory in MB.
    #[serde(default)]
    pub ram: Option<u32>,
    /// Boot disk size in GB.
    #[serde(default)]
    pub boot_disk_size: Option<u32>,
    /// Data volume size in GB.
    #[serde(default)]
    pub data_volume: Option<u32>,
    /// Tags, used for staged starts.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Runtime state.
    pub state: State,
    /// Interfaces (deep reads only).
    #[serde(default)]
    pub interfaces: BTreeMap<InterfaceId, Interface>,
    /// Serial consoles.
    #[serde(default)]
    pub serial_devices: Vec<SerialDevice>,
    /// Compute host running the node.
    #[serde(default)]
    pub compute_id: Option<String>,
    /// Key for the VNC console.
    #[serde(default)]
    pub vnc_key: Option<String>,
}

impl Node {
    /// Interfaces ordered by slot, slotless ones last.
    #[must_use]
    pub fn interfaces_by_slot(&self) -> Vec<&Interface> {
        let mut interfaces: Vec<&Interface> = self.interfaces.values().collect();
        interfaces.sort_by_key(|i| (i.slot.is_none(), i.slot));
        interfaces
    }

    /// Display name used in errors and logs.
    #[must_use]
    pub fn describe(&self) -> String {
        format!("node {} ({})", self.label, self.id)
    }
}

/// Fields for creating or updating a node. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NodeSpec {
    /// Label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Device family (create only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_definition: Option<NodeDefinitionId>,
    /// Disk image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_definition: Option<ImageDefinitionId>,
    /// Startup configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<String>,
    /// Canvas x coordinate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<i64>,
    /// Canvas y coordinate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<i64>,
    /// Virtual CPUs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpus: Option<u32>,
    /// CPU limit in percent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_limit: Option<u32>,
    /// Memory in MB.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ram: Option<u32>,
    /// Boot disk size in GB.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boot_disk_size: Option<u32>,
    /// Data volume size in GB.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_volume: Option<u32>,
    /// Replacement tag list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// Minimal answer of create calls.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Created<T> {
    pub(crate) id: T,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_simplified_record() {
        let node: Node = serde_json::from_value(json!({
            "id": "n1",
            "lab_id": "lab1",
            "label": "alpine-0",
            "node_definition": "alpine",
            "image_definition": null,
            "configuration": null,
            "x": -100,
            "y": 50,
            "cpus": null,
            "tags": ["core"],
            "state": "BOOTED",
            "compute_id": "c1"
        }))
        .unwrap();
        assert_eq!(node.state, State::Booted);
        assert!(node.state.is_active());
        assert!(node.interfaces.is_empty());
        assert_eq!(node.tags, vec!["core".to_string()]);
        assert_eq!(node.describe(), "node alpine-0 (n1)");
    }

    #[test]
    fn spec_skips_unset_fields() {
        let spec = NodeSpec {
            label: Some("r1".into()),
            x: Some(0),
            ..NodeSpec::default()
        };
        assert_eq!(
            serde_json::to_value(&spec).unwrap(),
            json!({"label": "r1", "x": 0})
        );
    }
}
