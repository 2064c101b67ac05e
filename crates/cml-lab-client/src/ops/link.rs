//! Link creation and removal.
//!
//! Creating a link picks a free interface on each endpoint. Two concurrent
//! creations could pick the same "next free" interface of a shared node, so
//! the whole pick-and-create round trip runs under the client's link lock.

use cml_lab_core::{LabId, LinkId};

use crate::client::Client;
use crate::error::{ClientError, Result};
use crate::model::{link_label, Created, Interface, Link, Node};

/// Which interface a link endpoint should use.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotChoice<'a> {
    /// Use this existing, unconnected interface.
    Existing(&'a Interface),
    /// Create an interface, in the given slot or the next free one.
    Create(Option<u32>),
}

/// Choose the interface of `node` a new link should attach to.
///
/// With a slot, that slot's interface is used (or created if missing).
/// Without one, the lowest-slot free physical interface is used, or a new
/// interface is created.
///
/// # Errors
///
/// Returns `ClientError::InvalidRequest` if the requested slot is already
/// connected.
pub fn select_interface(node: &Node, slot: Option<u32>) -> Result<SlotChoice<'_>> {
    let Some(slot) = slot else {
        return Ok(node
            .interfaces_by_slot()
            .into_iter()
            .find(|i| i.is_free())
            .map_or(SlotChoice::Create(None), SlotChoice::Existing));
    };

    match node.interfaces.values().find(|i| i.slot == Some(slot)) {
        Some(iface) if iface.is_connected => Err(ClientError::InvalidRequest(format!(
            "slot {slot} of {} is already connected",
            node.describe()
        ))),
        Some(iface) => Ok(SlotChoice::Existing(iface)),
        None => Ok(SlotChoice::Create(Some(slot))),
    }
}

impl Client {
    /// Read the links of a lab, sorted by id.
    ///
    /// Labels and slot hints are only derived by [`Client::lab_deep`].
    ///
    /// # Errors
    ///
    /// Returns the first failing read.
    pub async fn links(&self, lab_id: &LabId) -> Result<Vec<Link>> {
        let ids: Vec<LinkId> = self.get_json(&format!("labs/{lab_id}/links")).await?;
        let mut links = Vec::with_capacity(ids.len());
        for id in &ids {
            links.push(self.link(lab_id, id).await?);
        }
        links.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(links)
    }

    /// Read one link.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` if the link does not exist.
    pub async fn link(&self, lab_id: &LabId, link_id: &LinkId) -> Result<Link> {
        self.get_json(&format!("labs/{lab_id}/links/{link_id}")).await
    }

    /// Connect two nodes of the same lab.
    ///
    /// Endpoint interfaces are selected with [`select_interface`] against a
    /// fresh read of each node. Runs under [`Client::link_create_lock`].
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidRequest` for a self-link, nodes of
    /// different labs or an occupied slot; otherwise any gate, transport,
    /// status or decode error.
    pub async fn link_create(
        &self,
        src: &Node,
        dst: &Node,
        src_slot: Option<u32>,
        dst_slot: Option<u32>,
    ) -> Result<Link> {
        if src.lab_id != dst.lab_id {
            return Err(ClientError::InvalidRequest(format!(
                "{} and {} are in different labs",
                src.describe(),
                dst.describe()
            )));
        }
        if src.id == dst.id {
            return Err(ClientError::InvalidRequest(format!(
                "cannot link {} to itself",
                src.describe()
            )));
        }
        let lab_id = &src.lab_id;

        let _guard = self
            .cancellable(async { Ok(self.inner.link_lock.lock().await) })
            .await?;

        let src_node = self.node(lab_id, &src.id).await?;
        let src_iface = self.endpoint_interface(&src_node, src_slot).await?;
        let dst_node = self.node(lab_id, &dst.id).await?;
        let dst_iface = self.endpoint_interface(&dst_node, dst_slot).await?;

        let created: Created<LinkId> = self
            .post_json(
                &format!("labs/{lab_id}/links"),
                &serde_json::json!({ "src_int": src_iface.id, "dst_int": dst_iface.id }),
            )
            .await?;
        let mut link = self.link(lab_id, &created.id).await?;

        link.label = link_label(&src_node.label, &src_iface.label, &dst_node.label, &dst_iface.label);
        link.src_slot = src_iface.slot;
        link.dst_slot = dst_iface.slot;

        tracing::info!(lab_id = %lab_id, link_id = %link.id, label = %link.label, "Created link");
        Ok(link)
    }

    async fn endpoint_interface(&self, node: &Node, slot: Option<u32>) -> Result<Interface> {
        let wanted = match select_interface(node, slot)? {
            SlotChoice::Existing(iface) => return Ok(iface.clone()),
            SlotChoice::Create(wanted) => wanted,
        };

        let created = self.interface_create(&node.lab_id, &node.id, wanted).await?;
        let picked = match wanted {
            Some(slot) => created.into_iter().find(|i| i.slot == Some(slot)),
            None => created
                .into_iter()
                .filter(Interface::is_free)
                .min_by_key(|i| i.slot),
        };
        picked.ok_or_else(|| ClientError::MalformedResponse {
            path: format!("/labs/{}/interfaces", node.lab_id),
            reason: format!("no usable interface created on {}", node.describe()),
        })
    }

    /// Remove a link.
    ///
    /// # Errors
    ///
    /// Returns gate, transport or status errors.
    pub async fn link_destroy(&self, lab_id: &LabId, link_id: &LinkId) -> Result<()> {
        self.delete(&format!("labs/{lab_id}/links/{link_id}")).await?;
        tracing::info!(lab_id = %lab_id, link_id = %link_id, "Destroyed link");
        Ok(())
    }
}
