//! Node CRUD and state operations.

use cml_lab_core::{ImageDefinitionId, LabId, NodeId, State};
use futures::future::try_join_all;
use tokio::sync::Semaphore;

use super::{ensure_state, ensure_transition};
use crate::client::Client;
use crate::error::{ClientError, Result};
use crate::model::{Created, ImageDefinition, Node, NodeSpec};

impl Client {
    /// Read every node of a lab with its interfaces, sorted by id.
    ///
    /// # Errors
    ///
    /// Returns the first failing read.
    pub async fn nodes(&self, lab_id: &LabId) -> Result<Vec<Node>> {
        let ids: Vec<NodeId> = self.get_json(&format!("labs/{lab_id}/nodes")).await?;
        let limit = Semaphore::new(self.inner.max_parallelism);
        let mut nodes =
            try_join_all(ids.iter().map(|nid| self.fetch_node(lab_id, nid, &limit))).await?;
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(nodes)
    }

    /// Read one node with its interfaces.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` if the node does not exist.
    pub async fn node(&self, lab_id: &LabId, node_id: &NodeId) -> Result<Node> {
        let limit = Semaphore::new(self.inner.max_parallelism);
        self.fetch_node(lab_id, node_id, &limit).await
    }

    /// Find a node by label.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ElementNotFound` if no node has that label.
    pub async fn node_by_label(&self, lab_id: &LabId, label: &str) -> Result<Node> {
        self.nodes(lab_id)
            .await?
            .into_iter()
            .find(|n| n.label == label)
            .ok_or_else(|| ClientError::ElementNotFound {
                kind: "node",
                key: label.to_string(),
            })
    }

    /// Create a node with its default interfaces.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidRequest` if `label` or `node_definition`
    /// is missing, or any gate, transport, status or decode error.
    pub async fn node_create(&self, lab_id: &LabId, spec: &NodeSpec) -> Result<Node> {
        if spec.label.as_deref().unwrap_or_default().is_empty() {
            return Err(ClientError::InvalidRequest("node label is required".into()));
        }
        if spec.node_definition.is_none() {
            return Err(ClientError::InvalidRequest(
                "node definition is required".into(),
            ));
        }

        let created: Created<NodeId> = self
            .post_json(
                &format!("labs/{lab_id}/nodes?populate_interfaces=true"),
                spec,
            )
            .await?;
        tracing::info!(lab_id = %lab_id, node_id = %created.id, "Created node");
        self.node(lab_id, &created.id).await
    }

    /// Update a node and return the fresh record.
    ///
    /// Changing `configuration` or `image_definition` requires the node to
    /// be `DEFINED_ON_CORE`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotInState` without issuing a request if the
    /// update touches a definition-only field of a node that is not
    /// `DEFINED_ON_CORE`.
    pub async fn node_update(&self, node: &Node, spec: &NodeSpec) -> Result<Node> {
        if spec.configuration.is_some() || spec.image_definition.is_some() {
            ensure_state(node.describe(), node.state, State::Defined)?;
        }
        self.patch_json(&format!("labs/{}/nodes/{}", node.lab_id, node.id), spec)
            .await?;
        tracing::debug!(node_id = %node.id, "Updated node");
        self.node(&node.lab_id, &node.id).await
    }

    /// Replace the node's startup configuration.
    ///
    /// Nothing is sent if the configuration is already `config`. On success
    /// `node` reflects the new value.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotInState` without issuing a request unless
    /// the node is `DEFINED_ON_CORE`.
    pub async fn node_set_config(&self, node: &mut Node, config: &str) -> Result<()> {
        ensure_state(node.describe(), node.state, State::Defined)?;
        if node.configuration.as_deref() == Some(config) {
            return Ok(());
        }

        self.patch_json(
            &format!("labs/{}/nodes/{}", node.lab_id, node.id),
            &serde_json::json!({ "configuration": config }),
        )
        .await?;
        node.configuration = Some(config.to_string());
        tracing::debug!(node_id = %node.id, label = %node.label, "Set node configuration");
        Ok(())
    }

    /// Replace the node's image definition.
    ///
    /// The image must belong to the node's definition.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotInState` unless the node is
    /// `DEFINED_ON_CORE`, or `ClientError::InvalidRequest` if the image
    /// belongs to another node definition.
    pub async fn node_set_image(&self, node: &mut Node, image: &ImageDefinitionId) -> Result<()> {
        ensure_state(node.describe(), node.state, State::Defined)?;
        if node.image_definition.as_ref() == Some(image) {
            return Ok(());
        }

        let definition: ImageDefinition = self.image_definition(image).await?;
        if definition.node_definition_id != node.node_definition {
            return Err(ClientError::InvalidRequest(format!(
                "image {image} belongs to {}, not {}",
                definition.node_definition_id, node.node_definition
            )));
        }

        self.patch_json(
            &format!("labs/{}/nodes/{}", node.lab_id, node.id),
            &serde_json::json!({ "image_definition": image }),
        )
        .await?;
        node.image_definition = Some(image.clone());
        Ok(())
    }

    /// Start a `DEFINED_ON_CORE` or `STOPPED` node.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::IllegalStateTransition` without issuing a
    /// request if the node is already running.
    pub async fn node_start(&self, node: &Node) -> Result<()> {
        ensure_transition(node.describe(), node.state, State::Started)?;
        self.put(&format!("labs/{}/nodes/{}/state/start", node.lab_id, node.id))
            .await?;
        tracing::info!(node_id = %node.id, label = %node.label, "Started node");
        Ok(())
    }

    /// Stop a running node.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::IllegalStateTransition` without issuing a
    /// request if the node is not running.
    pub async fn node_stop(&self, node: &Node) -> Result<()> {
        ensure_transition(node.describe(), node.state, State::Stopped)?;
        self.put(&format!("labs/{}/nodes/{}/state/stop", node.lab_id, node.id))
            .await?;
        tracing::info!(node_id = %node.id, label = %node.label, "Stopped node");
        Ok(())
    }

    /// Wipe the disks of a stopped node.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::IllegalStateTransition` without issuing a
    /// request unless the node is `STOPPED`.
    pub async fn node_wipe(&self, node: &Node) -> Result<()> {
        ensure_transition(node.describe(), node.state, State::Defined)?;
        self.put(&format!("labs/{}/nodes/{}/wipe_disks", node.lab_id, node.id))
            .await?;
        tracing::info!(node_id = %node.id, label = %node.label, "Wiped node");
        Ok(())
    }

    /// Delete a `DEFINED_ON_CORE` node.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotInState` without issuing a request unless
    /// the node is `DEFINED_ON_CORE`.
    pub async fn node_destroy(&self, node: &Node) -> Result<()> {
        ensure_state(node.describe(), node.state, State::Defined)?;
        self.delete(&format!("labs/{}/nodes/{}", node.lab_id, node.id))
            .await?;
        tracing::info!(node_id = %node.id, label = %node.label, "Destroyed node");
        Ok(())
    }
}
