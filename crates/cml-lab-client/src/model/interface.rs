//! Interface records.

use cml_lab_core::{InterfaceId, NodeId, State};
use serde::{Deserialize, Serialize};

/// Kind of node interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceType {
    /// A data-plane port that links attach to.
    Physical,
    /// A loopback interface.
    Loopback,
    /// Any type this client does not know.
    #[serde(other)]
    Other,
}

/// A node interface. `ip4`/`ip6` are only populated while the node runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interface {
    /// Interface id.
    pub id: InterfaceId,
    /// Owning node.
    pub node: NodeId,
    /// Name inside the node, e.g. `eth0`.
    #[serde(default)]
    pub label: String,
    /// Slot on the node. Loopbacks have none.
    #[serde(default)]
    pub slot: Option<u32>,
    /// Interface type.
    #[serde(rename = "type")]
    pub kind: InterfaceType,
    /// Runtime state.
    pub state: State,
    /// MAC address, once assigned.
    #[serde(default)]
    pub mac_address: Option<String>,
    /// True if a link uses the interface.
    #[serde(default)]
    pub is_connected: bool,
    /// IPv4 addresses learned while running.
    #[serde(default)]
    pub ip4: Vec<String>,
    /// IPv6 addresses learned while running.
    #[serde(default)]
    pub ip6: Vec<String>,
}

impl Interface {
    /// A physical interface no link uses.
    #[must_use]
    pub fn is_free(&self) -> bool {
        self.kind == InterfaceType::Physical && !self.is_connected
    }
}
