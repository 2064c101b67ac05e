//! Lab CRUD, state operations and import.

use cml_lab_core::{LabId, State};
use futures::{stream, StreamExt, TryStreamExt};

use super::ensure_state;
use crate::client::Client;
use crate::error::{ClientError, Result};
use crate::model::{ImportResult, Lab, LabSpec};
use crate::rpc::Payload;

impl Client {
    /// List the ids of all labs visible to the user.
    ///
    /// # Errors
    ///
    /// Returns gate, transport or decode errors.
    pub async fn labs(&self) -> Result<Vec<LabId>> {
        self.get_json("labs").await
    }

    /// Find a lab by title. Ties resolve to the smallest lab id.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ElementNotFound` if no lab has that title.
    pub async fn lab_by_title(&self, title: &str) -> Result<Lab> {
        let ids = self.labs().await?;
        let labs: Vec<Lab> = stream::iter(ids)
            .map(|id| async move { self.lab(&id).await })
            .buffer_unordered(self.inner.max_parallelism)
            .try_collect()
            .await?;

        labs.into_iter()
            .filter(|lab| lab.title == title)
            .min_by(|a, b| a.id.cmp(&b.id))
            .ok_or_else(|| ClientError::ElementNotFound {
                kind: "lab",
                key: title.to_string(),
            })
    }

    /// Create an empty lab.
    ///
    /// # Errors
    ///
    /// Returns gate, transport, status or decode errors.
    pub async fn lab_create(&self, spec: &LabSpec) -> Result<Lab> {
        let lab: Lab = self.post_json("labs", spec).await?;
        tracing::info!(lab_id = %lab.id, title = %lab.title, "Created lab");
        Ok(lab)
    }

    /// Update the lab's scalar fields and return the new shallow view.
    ///
    /// # Errors
    ///
    /// Returns gate, transport, status or decode errors.
    pub async fn lab_update(&self, id: &LabId, spec: &LabSpec) -> Result<Lab> {
        self.patch_json(&format!("labs/{id}"), spec).await?;
        tracing::debug!(lab_id = %id, "Updated lab");
        self.lab(id).await
    }

    /// Delete a lab. The lab must be stopped and wiped first.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotInState` without issuing the delete if the
    /// lab is not `DEFINED_ON_CORE`.
    pub async fn lab_destroy(&self, id: &LabId) -> Result<()> {
        let lab = self.lab(id).await?;
        ensure_state(format!("lab {id}"), lab.state, State::Defined)?;
        self.delete(&format!("labs/{id}")).await?;
        tracing::info!(lab_id = %id, "Destroyed lab");
        Ok(())
    }

    /// Start every node of the lab that is not running yet.
    ///
    /// # Errors
    ///
    /// Returns gate, transport or status errors.
    pub async fn lab_start(&self, id: &LabId) -> Result<()> {
        self.put(&format!("labs/{id}/start")).await?;
        tracing::info!(lab_id = %id, "Started lab");
        Ok(())
    }

    /// Stop every running node of the lab.
    ///
    /// # Errors
    ///
    /// Returns gate, transport or status errors.
    pub async fn lab_stop(&self, id: &LabId) -> Result<()> {
        self.put(&format!("labs/{id}/stop")).await?;
        tracing::info!(lab_id = %id, "Stopped lab");
        Ok(())
    }

    /// Release the runtime state of every stopped node.
    ///
    /// # Errors
    ///
    /// Returns gate, transport or status errors.
    pub async fn lab_wipe(&self, id: &LabId) -> Result<()> {
        self.put(&format!("labs/{id}/wipe")).await?;
        tracing::info!(lab_id = %id, "Wiped lab");
        Ok(())
    }

    /// Import a topology (YAML or JSON) as a new lab and return its shallow
    /// view. Controller warnings are logged.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidRequest` for an empty topology, or any
    /// gate, transport, status or decode error.
    pub async fn lab_import(&self, topology: &str) -> Result<Lab> {
        let trimmed = topology.trim_start();
        if trimmed.is_empty() {
            return Err(ClientError::InvalidRequest("topology is empty".to_string()));
        }
        let content_type = if trimmed.starts_with('{') {
            "application/json"
        } else {
            "application/x-yaml"
        };

        let result: ImportResult = self
            .post_raw("import", Payload::raw(topology, content_type))
            .await?;
        for warning in &result.warnings {
            tracing::warn!(lab_id = %result.id, warning = %warning, "Topology import warning");
        }
        tracing::info!(lab_id = %result.id, "Imported lab");
        self.lab(&result.id).await
    }

    /// Export the lab topology as the controller renders it.
    ///
    /// # Errors
    ///
    /// Returns gate, transport, status or decode errors.
    pub async fn lab_topology(&self, id: &LabId) -> Result<serde_json::Value> {
        self.get_json(&format!("labs/{id}/topology")).await
    }
}
