//! `GET /labs/{id}/layer3_addresses` records.

use std::collections::BTreeMap;

use cml_lab_core::{InterfaceId, NodeId};
use serde::Deserialize;

/// Addresses learned on one interface. Keyed by MAC address in the answer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Layer3Interface {
    /// Interface id.
    pub id: InterfaceId,
    /// Interface name.
    #[serde(default)]
    pub label: String,
    /// IPv4 addresses, `null` when none were learned.
    #[serde(default)]
    pub ip4: Option<Vec<String>>,
    /// IPv6 addresses, `null` when none were learned.
    #[serde(default)]
    pub ip6: Option<Vec<String>>,
}

/// Addresses learned on one node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Layer3Node {
    /// Node label.
    #[serde(default)]
    pub name: String,
    /// Interfaces keyed by MAC address.
    #[serde(default)]
    pub interfaces: BTreeMap<String, Layer3Interface>,
}

/// The whole answer, keyed by node id.
pub type Layer3Addresses = BTreeMap<NodeId, Layer3Node>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_null_address_lists() {
        let l3: Layer3Addresses = serde_json::from_value(json!({
            "n1": {
                "name": "alpine-0",
                "interfaces": {
                    "52:54:00:00:00:01": {
                        "id": "i1", "label": "eth0",
                        "ip4": ["192.168.1.10"], "ip6": null
                    }
                }
            }
        }))
        .unwrap();
        let node = &l3[&"n1".parse::<NodeId>().unwrap()];
        let iface = &node.interfaces["52:54:00:00:00:01"];
        assert_eq!(iface.ip4.as_deref(), Some(&["192.168.1.10".to_string()][..]));
        assert!(iface.ip6.is_none());
    }
}
