//! Interface reads and creation.

use cml_lab_core::{InterfaceId, LabId, NodeId};
use serde::Deserialize;

use crate::client::Client;
use crate::error::Result;
use crate::model::Interface;

#[derive(Deserialize)]
#[serde(untagged)]
enum CreatedInterfaces {
    Many(Vec<Interface>),
    One(Interface),
}

impl Client {
    /// Read one interface.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` if the interface does not exist.
    pub async fn interface(&self, lab_id: &LabId, interface_id: &InterfaceId) -> Result<Interface> {
        self.get_json(&format!("labs/{lab_id}/interfaces/{interface_id}"))
            .await
    }

    /// Read the interfaces of a node, ordered by slot.
    ///
    /// # Errors
    ///
    /// Returns the first failing read.
    pub async fn node_interfaces(&self, lab_id: &LabId, node_id: &NodeId) -> Result<Vec<Interface>> {
        let ids: Vec<InterfaceId> = self
            .get_json(&format!("labs/{lab_id}/nodes/{node_id}/interfaces"))
            .await?;
        let mut interfaces = Vec::with_capacity(ids.len());
        for id in &ids {
            interfaces.push(self.interface(lab_id, id).await?);
        }
        interfaces.sort_by_key(|i| (i.slot.is_none(), i.slot));
        Ok(interfaces)
    }

    /// Create interfaces on a node.
    ///
    /// With a slot, the controller creates every missing interface up to and
    /// including it; without one, the next free slot is used. All created
    /// interfaces are returned.
    ///
    /// # Errors
    ///
    /// Returns gate, transport, status or decode errors.
    pub async fn interface_create(
        &self,
        lab_id: &LabId,
        node_id: &NodeId,
        slot: Option<u32>,
    ) -> Result<Vec<Interface>> {
        let mut body = serde_json::json!({ "node": node_id });
        if let Some(slot) = slot {
            body["slot"] = slot.into();
        }

        let created: CreatedInterfaces = self
            .post_json(&format!("labs/{lab_id}/interfaces"), &body)
            .await?;
        let created = match created {
            CreatedInterfaces::Many(list) => list,
            CreatedInterfaces::One(one) => vec![one],
        };
        tracing::debug!(
            node_id = %node_id,
            created = created.len(),
            "Created interfaces"
        );
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::testing::MockTransport;
    use reqwest::Method;
    use serde_json::json;
    use std::sync::Arc;

    fn iface(id: &str, slot: u32) -> serde_json::Value {
        json!({
            "id": id, "node": "n1", "label": format!("eth{slot}"), "slot": slot,
            "type": "physical", "state": "DEFINED_ON_CORE", "is_connected": false
        })
    }

    #[tokio::test]
    async fn create_accepts_single_or_list() {
        let mock = Arc::new(MockTransport::with_controller("2.4.0"));
        mock.on(Method::POST, "/labs/lab1/interfaces", 200, iface("i3", 3));
        mock.on(
            Method::POST,
            "/labs/lab1/interfaces",
            200,
            json!([iface("i4", 4), iface("i5", 5)]),
        );
        let client =
            Client::with_transport(ClientConfig::with_token("https://cml", "tok"), mock.clone())
                .unwrap();
        let lab: LabId = "lab1".parse().unwrap();
        let node: NodeId = "n1".parse().unwrap();

        let one = client.interface_create(&lab, &node, None).await.unwrap();
        assert_eq!(one.len(), 1);
        let many = client.interface_create(&lab, &node, Some(5)).await.unwrap();
        assert_eq!(many.len(), 2);

        let sent = mock.last_request(&Method::POST, "/labs/lab1/interfaces").unwrap();
        let body: serde_json::Value = serde_json::from_slice(sent.body.as_ref().unwrap()).unwrap();
        assert_eq!(body, json!({"node": "n1", "slot": 5}));
    }

    #[tokio::test]
    async fn node_interfaces_sorted_by_slot() {
        let mock = Arc::new(MockTransport::with_controller("2.4.0"));
        mock.on(Method::GET, "/labs/lab1/nodes/n1/interfaces", 200, json!(["b", "a"]));
        mock.on(Method::GET, "/labs/lab1/interfaces/a", 200, iface("a", 1));
        mock.on(Method::GET, "/labs/lab1/interfaces/b", 200, iface("b", 0));
        let client =
            Client::with_transport(ClientConfig::with_token("https://cml", "tok"), mock).unwrap();

        let list = client
            .node_interfaces(&"lab1".parse().unwrap(), &"n1".parse().unwrap())
            .await
            .unwrap();
        let slots: Vec<Option<u32>> = list.iter().map(|i| i.slot).collect();
        assert_eq!(slots, vec![Some(0), Some(1)]);
    }
}
