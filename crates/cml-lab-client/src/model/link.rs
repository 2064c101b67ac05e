//! Link records.

use cml_lab_core::{InterfaceId, LabId, LinkId, NodeId, State};
use serde::{Deserialize, Serialize};

/// A connection between two interfaces.
///
/// `label` and the slot hints are derived by the lab assembler from the
/// endpoints, the controller does not store them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    /// Link id.
    pub id: LinkId,
    /// Owning lab.
    pub lab_id: LabId,
    /// Interface at the source end.
    #[serde(rename = "interface_a")]
    pub src_interface: InterfaceId,
    /// Interface at the destination end.
    #[serde(rename = "interface_b")]
    pub dst_interface: InterfaceId,
    /// Node at the source end.
    #[serde(rename = "node_a")]
    pub src_node: NodeId,
    /// Node at the destination end.
    #[serde(rename = "node_b")]
    pub dst_node: NodeId,
    /// Runtime state.
    pub state: State,
    /// Derived `"src-iface<->dst-iface"` label.
    #[serde(default)]
    pub label: String,
    /// Slot of the source interface.
    #[serde(default)]
    pub src_slot: Option<u32>,
    /// Slot of the destination interface.
    #[serde(default)]
    pub dst_slot: Option<u32>,
    /// Packet capture key, set while running.
    #[serde(default)]
    pub link_capture_key: Option<String>,
}

/// Compose the `"srcnode-srciface<->dstnode-dstiface"` label.
#[must_use]
pub fn link_label(src_node: &str, src_iface: &str, dst_node: &str, dst_iface: &str) -> String {
    format!("{src_node}-{src_iface}<->{dst_node}-{dst_iface}")
}
