//! Lab assembler: shallow and deep lab reads.
//!
//! A deep read runs four tasks concurrently:
//!
//! - T1 resolves the owner.
//! - T2 reads every node with its interfaces.
//! - T3 reads the lab's layer-3 addresses.
//! - T4 reads every link.
//!
//! T3 and T4 fetch in parallel with T2 but only merge after T2 has
//! published the node map on a watch channel. All requests of one read share
//! a semaphore bounding in-flight requests to `max_parallelism`. The first
//! failing task fails the read and the others are dropped.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use cml_lab_core::{InterfaceId, LabId, LinkId, NodeId, UserId};
use futures::future::try_join_all;
use tokio::sync::{watch, Semaphore};

use crate::client::Client;
use crate::error::{ClientError, Result};
use crate::model::{link_label, Interface, Lab, Layer3Addresses, Link, Node, User};

type NodeMap = BTreeMap<NodeId, Node>;
type Published = watch::Receiver<Option<Arc<NodeMap>>>;

/// IP addresses to apply to one interface.
#[derive(Debug)]
struct AddressUpdate {
    node: NodeId,
    interface: InterfaceId,
    ip4: Vec<String>,
    ip6: Vec<String>,
}

impl Client {
    /// Read the lab's scalar fields with a single `GET /labs/{id}`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` if the lab does not exist, or any
    /// gate, transport or decode error.
    pub async fn lab(&self, id: &LabId) -> Result<Lab> {
        self.get_json(&format!("labs/{id}")).await
    }

    /// Read the lab with its owner, nodes, interfaces, addresses and links.
    ///
    /// # Errors
    ///
    /// Returns the first error of any fan-out task. No partial lab is
    /// returned.
    pub async fn lab_deep(&self, id: &LabId) -> Result<Lab> {
        let mut lab = self.lab(id).await?;

        let limit = Semaphore::new(self.inner.max_parallelism);
        let (publish, published) = watch::channel(None);
        let owner = lab.owner.clone();

        let (owner_user, nodes, addresses, links) = tokio::try_join!(
            self.fetch_owner(owner.as_ref(), &limit),
            self.fetch_nodes(id, publish, &limit),
            self.fetch_addresses(id, published.clone(), &limit),
            self.fetch_links(id, published, &limit),
        )?;

        let mut nodes = Arc::unwrap_or_clone(nodes);
        for update in addresses {
            if let Some(iface) = nodes
                .get_mut(&update.node)
                .and_then(|n| n.interfaces.get_mut(&update.interface))
            {
                iface.ip4 = update.ip4;
                iface.ip6 = update.ip6;
            }
        }

        lab.owner_user = owner_user;
        lab.node_count = nodes.len();
        lab.link_count = links.len();
        lab.nodes = nodes;
        lab.links = links;

        tracing::debug!(
            lab_id = %id,
            nodes = lab.node_count,
            links = lab.link_count,
            "Assembled lab"
        );
        Ok(lab)
    }

    /// Run `fut` while holding a permit of `limit`.
    async fn limited<T, F>(&self, limit: &Semaphore, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let _permit = self
            .cancellable(async { limit.acquire().await.map_err(|_| ClientError::Cancelled) })
            .await?;
        fut.await
    }

    async fn fetch_owner(&self, owner: Option<&UserId>, limit: &Semaphore) -> Result<Option<User>> {
        let Some(owner) = owner else {
            return Ok(None);
        };
        let path = format!("users/{owner}");
        self.limited(limit, self.get_json(&path)).await.map(Some)
    }

    async fn fetch_nodes(
        &self,
        lab_id: &LabId,
        publish: watch::Sender<Option<Arc<NodeMap>>>,
        limit: &Semaphore,
    ) -> Result<Arc<NodeMap>> {
        let path = format!("labs/{lab_id}/nodes");
        let ids: Vec<NodeId> = self.limited(limit, self.get_json(&path)).await?;

        let nodes = try_join_all(ids.iter().map(|nid| self.fetch_node(lab_id, nid, limit))).await?;
        let nodes: Arc<NodeMap> = Arc::new(nodes.into_iter().map(|n| (n.id.clone(), n)).collect());

        publish.send_replace(Some(Arc::clone(&nodes)));
        Ok(nodes)
    }

    /// Read one node record with all of its interfaces.
    pub(crate) async fn fetch_node(
        &self,
        lab_id: &LabId,
        node_id: &NodeId,
        limit: &Semaphore,
    ) -> Result<Node> {
        let node_path = format!("labs/{lab_id}/nodes/{node_id}");
        let interfaces_path = format!("labs/{lab_id}/nodes/{node_id}/interfaces");

        let (mut node, interface_ids) = tokio::try_join!(
            self.limited(limit, self.get_json::<Node>(&node_path)),
            self.limited(limit, self.get_json::<Vec<InterfaceId>>(&interfaces_path)),
        )?;

        let interfaces = try_join_all(
            interface_ids
                .iter()
                .map(|iid| self.fetch_interface(lab_id, iid, limit)),
        )
        .await?;
        node.interfaces = interfaces.into_iter().map(|i| (i.id.clone(), i)).collect();
        Ok(node)
    }

    async fn fetch_interface(
        &self,
        lab_id: &LabId,
        interface_id: &InterfaceId,
        limit: &Semaphore,
    ) -> Result<Interface> {
        let path = format!("labs/{lab_id}/interfaces/{interface_id}");
        self.limited(limit, self.get_json(&path)).await
    }

    async fn fetch_addresses(
        &self,
        lab_id: &LabId,
        published: Published,
        limit: &Semaphore,
    ) -> Result<Vec<AddressUpdate>> {
        let path = format!("labs/{lab_id}/layer3_addresses");
        let addresses: Layer3Addresses = self.limited(limit, self.get_json(&path)).await?;
        let nodes = wait_published(published).await?;
        Ok(resolve_addresses(addresses, &nodes))
    }

    async fn fetch_links(
        &self,
        lab_id: &LabId,
        published: Published,
        limit: &Semaphore,
    ) -> Result<Vec<Link>> {
        let path = format!("labs/{lab_id}/links");
        let ids: Vec<LinkId> = self.limited(limit, self.get_json(&path)).await?;
        let mut links =
            try_join_all(ids.iter().map(|lid| self.fetch_link(lab_id, lid, limit))).await?;

        let nodes = wait_published(published).await?;
        for link in &mut links {
            resolve_link(link, &nodes)?;
        }
        links.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(links)
    }

    async fn fetch_link(&self, lab_id: &LabId, link_id: &LinkId, limit: &Semaphore) -> Result<Link> {
        let path = format!("labs/{lab_id}/links/{link_id}");
        self.limited(limit, self.get_json(&path)).await
    }
}

/// Block until T2 has published the node map.
async fn wait_published(mut published: Published) -> Result<Arc<NodeMap>> {
    let nodes = {
        let guard = published
            .wait_for(Option::is_some)
            .await
            .map_err(|_| ClientError::Cancelled)?;
        (*guard).clone()
    };
    nodes.ok_or(ClientError::Cancelled)
}

/// Keep addresses of known interfaces on running nodes.
fn resolve_addresses(addresses: Layer3Addresses, nodes: &NodeMap) -> Vec<AddressUpdate> {
    let mut updates = Vec::new();
    for (node_id, entry) in addresses {
        let Some(node) = nodes.get(&node_id) else {
            continue;
        };
        if !node.state.is_active() {
            continue;
        }
        for iface in entry.interfaces.into_values() {
            if node.interfaces.contains_key(&iface.id) {
                updates.push(AddressUpdate {
                    node: node_id.clone(),
                    interface: iface.id,
                    ip4: iface.ip4.unwrap_or_default(),
                    ip6: iface.ip6.unwrap_or_default(),
                });
            }
        }
    }
    updates
}

fn endpoint<'a>(
    nodes: &'a NodeMap,
    link: &Link,
    node_id: &NodeId,
    interface_id: &InterfaceId,
) -> Result<(&'a Node, &'a Interface)> {
    let node = nodes.get(node_id);
    let iface = node.and_then(|n| n.interfaces.get(interface_id));
    match (node, iface) {
        (Some(node), Some(iface)) => Ok((node, iface)),
        _ => Err(ClientError::MalformedResponse {
            path: format!("/labs/{}/links/{}", link.lab_id, link.id),
            reason: format!("link references unknown interface {interface_id} on node {node_id}"),
        }),
    }
}

/// Derive label and slot hints from the link's endpoints.
fn resolve_link(link: &mut Link, nodes: &NodeMap) -> Result<()> {
    let (src_node, src_iface) = endpoint(nodes, link, &link.src_node, &link.src_interface)?;
    let (dst_node, dst_iface) = endpoint(nodes, link, &link.dst_node, &link.dst_interface)?;

    let label = link_label(&src_node.label, &src_iface.label, &dst_node.label, &dst_iface.label);
    let (src_slot, dst_slot) = (src_iface.slot, dst_iface.slot);

    link.label = label;
    link.src_slot = src_slot;
    link.dst_slot = dst_slot;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::testing::MockTransport;
    use cml_lab_core::State;
    use reqwest::Method;
    use serde_json::{json, Value};

    const OWNER: &str = "00000000-0000-4000-a000-000000000001";

    fn lab_record(state: &str) -> Value {
        json!({
            "id": "lab1", "state": state, "lab_title": "demo",
            "lab_description": "", "lab_notes": "", "owner": OWNER,
            "node_count": 2, "link_count": 1, "groups": []
        })
    }

    fn node_record(id: &str, label: &str, state: &str) -> Value {
        json!({
            "id": id, "lab_id": "lab1", "label": label,
            "node_definition": "alpine", "x": 0, "y": 0, "tags": [],
            "state": state, "configuration": "hostname x"
        })
    }

    fn iface_record(id: &str, node: &str, slot: u32, state: &str) -> Value {
        json!({
            "id": id, "node": node, "label": format!("eth{slot}"), "slot": slot,
            "type": "physical", "state": state, "is_connected": true,
            "mac_address": format!("52:54:00:00:00:0{slot}")
        })
    }

    fn script_two_nodes(mock: &MockTransport, state: &str) {
        mock.on(Method::GET, "/labs/lab1", 200, lab_record(state));
        mock.on(
            Method::GET,
            &format!("/users/{OWNER}"),
            200,
            json!({"id": OWNER, "username": "admin", "admin": true}),
        );
        mock.on(Method::GET, "/labs/lab1/nodes", 200, json!(["n2", "n1"]));
        mock.on(Method::GET, "/labs/lab1/nodes/n1", 200, node_record("n1", "r1", state));
        mock.on(Method::GET, "/labs/lab1/nodes/n2", 200, node_record("n2", "r2", state));
        mock.on(Method::GET, "/labs/lab1/nodes/n1/interfaces", 200, json!(["i1"]));
        mock.on(Method::GET, "/labs/lab1/nodes/n2/interfaces", 200, json!(["i2"]));
        mock.on(Method::GET, "/labs/lab1/interfaces/i1", 200, iface_record("i1", "n1", 0, state));
        mock.on(Method::GET, "/labs/lab1/interfaces/i2", 200, iface_record("i2", "n2", 1, state));
        mock.on(Method::GET, "/labs/lab1/links", 200, json!(["l1"]));
        mock.on(
            Method::GET,
            "/labs/lab1/links/l1",
            200,
            json!({
                "id": "l1", "lab_id": "lab1",
                "interface_a": "i1", "interface_b": "i2",
                "node_a": "n1", "node_b": "n2", "state": state
            }),
        );
    }

    fn client(mock: Arc<MockTransport>) -> Client {
        Client::with_transport(ClientConfig::with_token("https://cml", "tok"), mock).unwrap()
    }

    #[tokio::test]
    async fn shallow_read_is_one_request() {
        let mock = Arc::new(MockTransport::with_controller("2.4.0"));
        script_two_nodes(&mock, "DEFINED_ON_CORE");
        let lab = client(mock.clone()).lab(&"lab1".parse().unwrap()).await.unwrap();

        assert_eq!(lab.node_count, 2);
        assert!(lab.nodes.is_empty());
        assert!(lab.owner_user.is_none());
        assert_eq!(mock.requests().len(), 2);
    }

    #[tokio::test]
    async fn deep_read_assembles_everything() {
        let mock = Arc::new(MockTransport::with_controller("2.4.0"));
        script_two_nodes(&mock, "DEFINED_ON_CORE");
        mock.on(Method::GET, "/labs/lab1/layer3_addresses", 200, json!({}));

        let lab = client(mock).lab_deep(&"lab1".parse().unwrap()).await.unwrap();

        assert_eq!(lab.nodes.len(), 2);
        assert_eq!(lab.node_count, 2);
        assert_eq!(lab.link_count, 1);
        assert_eq!(lab.owner_user.as_ref().unwrap().username, "admin");

        let keys: Vec<&str> = lab.nodes.keys().map(NodeId::as_str).collect();
        assert_eq!(keys, vec!["n1", "n2"]);
        for node in lab.nodes.values() {
            assert_eq!(node.interfaces.len(), 1);
            assert!(node.interfaces.values().all(|i| i.ip4.is_empty() && i.ip6.is_empty()));
        }

        let link = &lab.links[0];
        assert_eq!(link.label, "r1-eth0<->r2-eth1");
        assert_eq!(link.src_slot, Some(0));
        assert_eq!(link.dst_slot, Some(1));
    }

    #[tokio::test]
    async fn deep_read_merges_addresses_of_running_nodes() {
        let mock = Arc::new(MockTransport::with_controller("2.4.0"));
        script_two_nodes(&mock, "BOOTED");
        mock.on(
            Method::GET,
            "/labs/lab1/layer3_addresses",
            200,
            json!({
                "n1": {"name": "r1", "interfaces": {
                    "52:54:00:00:00:00": {"id": "i1", "label": "eth0",
                        "ip4": ["10.0.0.1"], "ip6": ["fe80::1"]}
                }},
                "ghost": {"name": "gone", "interfaces": {}}
            }),
        );

        let lab = client(mock).lab_deep(&"lab1".parse().unwrap()).await.unwrap();
        let n1 = &lab.nodes[&"n1".parse::<NodeId>().unwrap()];
        let i1 = &n1.interfaces[&"i1".parse::<InterfaceId>().unwrap()];
        assert_eq!(i1.ip4, vec!["10.0.0.1".to_string()]);
        assert_eq!(i1.ip6, vec!["fe80::1".to_string()]);
        assert_eq!(lab.state, State::Booted);
    }

    #[tokio::test]
    async fn deep_read_serialization_is_stable() {
        let mock = Arc::new(MockTransport::with_controller("2.4.0"));
        script_two_nodes(&mock, "DEFINED_ON_CORE");
        mock.on(Method::GET, "/labs/lab1/layer3_addresses", 200, json!({}));
        let client = client(mock);

        let first = serde_json::to_string(&client.lab_deep(&"lab1".parse().unwrap()).await.unwrap())
            .unwrap();
        let second = serde_json::to_string(&client.lab_deep(&"lab1".parse().unwrap()).await.unwrap())
            .unwrap();
        assert_eq!(first, second);

        let decoded: Lab = serde_json::from_str(&first).unwrap();
        assert_eq!(serde_json::to_string(&decoded).unwrap(), first);
    }

    #[tokio::test]
    async fn failing_task_fails_the_read() {
        let mock = Arc::new(MockTransport::with_controller("2.4.0"));
        script_two_nodes(&mock, "DEFINED_ON_CORE");
        mock.on(Method::GET, "/labs/lab1/layer3_addresses", 200, json!({}));
        mock.clear(&Method::GET, "/labs/lab1/interfaces/i2");
        mock.on(Method::GET, "/labs/lab1/interfaces/i2", 500, json!({"description": "boom"}));

        let err = client(mock)
            .lab_deep(&"lab1".parse().unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.label(), "server-error");
    }

    #[tokio::test]
    async fn dangling_link_is_malformed() {
        let mock = Arc::new(MockTransport::with_controller("2.4.0"));
        script_two_nodes(&mock, "DEFINED_ON_CORE");
        mock.on(Method::GET, "/labs/lab1/layer3_addresses", 200, json!({}));
        mock.clear(&Method::GET, "/labs/lab1/links/l1");
        mock.on(
            Method::GET,
            "/labs/lab1/links/l1",
            200,
            json!({
                "id": "l1", "lab_id": "lab1",
                "interface_a": "i1", "interface_b": "i9",
                "node_a": "n1", "node_b": "n2", "state": "DEFINED_ON_CORE"
            }),
        );

        let err = client(mock)
            .lab_deep(&"lab1".parse().unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.label(), "malformed-response");
    }

    #[tokio::test]
    async fn missing_lab_is_not_found() {
        let mock = Arc::new(MockTransport::with_controller("2.4.0"));
        mock.on(
            Method::GET,
            "/labs/nope",
            404,
            json!({"code": 404, "description": "Lab not found: nope"}),
        );
        let err = client(mock)
            .lab_deep(&"nope".parse().unwrap())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
