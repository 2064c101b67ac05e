//! Read-only directory: image and node definitions, external connectors.

use cml_lab_core::ImageDefinitionId;

use crate::client::Client;
use crate::error::Result;
use crate::model::{ExternalConnector, ImageDefinition, NodeDefinition};

impl Client {
    /// List all image definitions.
    ///
    /// # Errors
    ///
    /// Returns gate, transport or decode errors.
    pub async fn image_definitions(&self) -> Result<Vec<ImageDefinition>> {
        self.get_json("image_definitions").await
    }

    /// Read one image definition.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` if it does not exist.
    pub async fn image_definition(&self, id: &ImageDefinitionId) -> Result<ImageDefinition> {
        self.get_json(&format!("image_definitions/{id}")).await
    }

    /// List all node definitions in simplified form.
    ///
    /// # Errors
    ///
    /// Returns gate, transport or decode errors.
    pub async fn node_definitions(&self) -> Result<Vec<NodeDefinition>> {
        self.get_json("simplified_node_definitions").await
    }

    /// List the external connectors of the controller.
    ///
    /// # Errors
    ///
    /// Returns gate, transport or decode errors.
    pub async fn external_connectors(&self) -> Result<Vec<ExternalConnector>> {
        self.get_json("system/external_connectors").await
    }
}
