//! Lifecycle request types.
//!
//! A [`LifecycleRequest`] describes the lab a caller wants: where it comes
//! from (an imported topology or an existing lab), which state it should
//! be in, which nodes get which startup configuration, and how nodes are
//! started.

use std::collections::BTreeMap;
use std::time::Duration;

use cml_lab_core::{LabId, State};
use serde::{Deserialize, Serialize};

use crate::error::{LifecycleError, Result};
use crate::transitions;

/// Default budget for each of create, update and delete: two hours.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 2 * 60 * 60;

/// Upper bound for the convergence wait before a delete.
pub const DELETE_CONVERGE_CAP: Duration = Duration::from_secs(60 * 60);

/// Where the lab of a request comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabSource<'a> {
    /// Import this topology as a new lab.
    Topology(&'a str),
    /// Adopt an existing lab.
    Existing {
        /// The lab to adopt.
        lab_id: &'a LabId,
        /// Node and link ids the caller claims.
        elements: &'a [String],
    },
}

/// Ordered start of nodes by tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Staging {
    /// Tags, in start order. Each stage starts the nodes carrying its tag.
    pub stages: Vec<String>,

    /// Start every remaining node after the last stage.
    #[serde(default = "Staging::default_start_remaining")]
    pub start_remaining: bool,
}

impl Staging {
    const fn default_start_remaining() -> bool {
        true
    }

    /// Create a staging plan that starts the remaining nodes at the end.
    #[must_use]
    pub fn new<I, S>(stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stages: stages.into_iter().map(Into::into).collect(),
            start_remaining: true,
        }
    }
}

/// Time budgets of the lifecycle operations, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    /// Budget for each convergence wait while creating.
    #[serde(default = "Timeouts::default_seconds")]
    pub create_seconds: u64,
    /// Budget for the convergence wait while updating.
    #[serde(default = "Timeouts::default_seconds")]
    pub update_seconds: u64,
    /// Budget for the convergence wait while deleting, capped at one hour.
    #[serde(default = "Timeouts::default_seconds")]
    pub delete_seconds: u64,
}

impl Timeouts {
    const fn default_seconds() -> u64 {
        DEFAULT_TIMEOUT_SECONDS
    }

    /// Create budget as a `Duration`.
    #[must_use]
    pub const fn create(&self) -> Duration {
        Duration::from_secs(self.create_seconds)
    }

    /// Update budget as a `Duration`.
    #[must_use]
    pub const fn update(&self) -> Duration {
        Duration::from_secs(self.update_seconds)
    }

    /// Delete budget as a `Duration`, at most one hour.
    #[must_use]
    pub fn delete(&self) -> Duration {
        Duration::from_secs(self.delete_seconds).min(DELETE_CONVERGE_CAP)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create_seconds: DEFAULT_TIMEOUT_SECONDS,
            update_seconds: DEFAULT_TIMEOUT_SECONDS,
            delete_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

/// The desired shape of a lab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleRequest {
    /// Topology (YAML or JSON) to import. Exclusive with `lab_id`.
    #[serde(default)]
    pub topology: Option<String>,

    /// Existing lab to adopt. Exclusive with `topology`.
    #[serde(default)]
    pub lab_id: Option<LabId>,

    /// Node and link ids of the adopted lab the caller manages.
    #[serde(default)]
    pub elements: Vec<String>,

    /// Desired lab state.
    #[serde(default = "LifecycleRequest::default_state")]
    pub state: State,

    /// Wait for convergence after state changes.
    #[serde(default = "LifecycleRequest::default_wait")]
    pub wait: bool,

    /// Startup configuration per node, keyed by node label or id.
    #[serde(default)]
    pub configs: BTreeMap<String, String>,

    /// Staged start. Without it the whole lab is started at once.
    #[serde(default)]
    pub staging: Option<Staging>,

    /// Time budgets.
    #[serde(default)]
    pub timeouts: Timeouts,
}

impl LifecycleRequest {
    const fn default_state() -> State {
        State::Started
    }

    const fn default_wait() -> bool {
        true
    }

    fn base() -> Self {
        Self {
            topology: None,
            lab_id: None,
            elements: Vec::new(),
            state: Self::default_state(),
            wait: Self::default_wait(),
            configs: BTreeMap::new(),
            staging: None,
            timeouts: Timeouts::default(),
        }
    }

    /// Request a new lab imported from `topology`.
    #[must_use]
    pub fn import(topology: impl Into<String>) -> Self {
        Self {
            topology: Some(topology.into()),
            ..Self::base()
        }
    }

    /// Request an existing lab to be adopted.
    #[must_use]
    pub fn adopt(lab_id: LabId) -> Self {
        Self {
            lab_id: Some(lab_id),
            ..Self::base()
        }
    }

    /// Set the desired state.
    #[must_use]
    pub fn with_state(mut self, state: State) -> Self {
        self.state = state;
        self
    }

    /// Set the startup configuration of a node.
    #[must_use]
    pub fn with_config(mut self, node: impl Into<String>, config: impl Into<String>) -> Self {
        self.configs.insert(node.into(), config.into());
        self
    }

    /// Set the staging plan.
    #[must_use]
    pub fn with_staging(mut self, staging: Staging) -> Self {
        self.staging = Some(staging);
        self
    }

    /// Where the lab comes from.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::InvalidRequest` unless exactly one of
    /// `topology` and `lab_id` is set.
    pub fn source(&self) -> Result<LabSource<'_>> {
        match (&self.topology, &self.lab_id) {
            (Some(topology), None) => Ok(LabSource::Topology(topology)),
            (None, Some(lab_id)) => Ok(LabSource::Existing {
                lab_id,
                elements: &self.elements,
            }),
            (Some(_), Some(_)) => Err(LifecycleError::InvalidRequest(
                "topology and lab_id are mutually exclusive".into(),
            )),
            (None, None) => Err(LifecycleError::InvalidRequest(
                "either topology or lab_id is required".into(),
            )),
        }
    }

    /// Returns true if the lab was adopted rather than imported.
    #[must_use]
    pub const fn is_adopted(&self) -> bool {
        self.lab_id.is_some()
    }

    /// Check the request for consistency.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::InvalidRequest` for a missing or ambiguous
    /// source, an undesirable state, or empty stage tags.
    pub fn validate(&self) -> Result<()> {
        self.source()?;
        if !transitions::is_desirable(self.state) {
            return Err(LifecycleError::InvalidRequest(format!(
                "state must be one of DEFINED_ON_CORE, STOPPED, STARTED, got {}",
                self.state
            )));
        }
        if let Some(staging) = &self.staging {
            if staging.stages.iter().any(|s| s.trim().is_empty()) {
                return Err(LifecycleError::InvalidRequest(
                    "stage tags must not be empty".into(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_json() {
        let request: LifecycleRequest =
            serde_json::from_str(r#"{"topology": "lab: {}"}"#).unwrap();
        assert_eq!(request.state, State::Started);
        assert!(request.wait);
        assert!(request.staging.is_none());
        assert_eq!(request.timeouts.create(), Duration::from_secs(7200));
        assert_eq!(request.timeouts.delete(), Duration::from_secs(3600));
        assert!(matches!(request.source().unwrap(), LabSource::Topology(_)));
        assert!(!request.is_adopted());
    }

    #[test]
    fn staging_from_json() {
        let request: LifecycleRequest = serde_json::from_str(
            r#"{
                "lab_id": "lab-1",
                "elements": ["n1", "l1"],
                "state": "STOPPED",
                "staging": {"stages": ["core", "edge"]},
                "timeouts": {"create_seconds": 60}
            }"#,
        )
        .unwrap();
        let staging = request.staging.as_ref().unwrap();
        assert_eq!(staging.stages, vec!["core", "edge"]);
        assert!(staging.start_remaining);
        assert_eq!(request.timeouts.create(), Duration::from_secs(60));
        assert_eq!(request.timeouts.update(), Duration::from_secs(7200));
        match request.source().unwrap() {
            LabSource::Existing { lab_id, elements } => {
                assert_eq!(lab_id.as_str(), "lab-1");
                assert_eq!(elements.len(), 2);
            }
            LabSource::Topology(_) => panic!("expected existing lab"),
        }
    }

    #[test]
    fn source_is_exclusive() {
        let mut request = LifecycleRequest::import("lab: {}");
        request.lab_id = Some("lab-1".parse().unwrap());
        assert_eq!(request.validate().unwrap_err().label(), "invalid-request");

        request.topology = None;
        request.lab_id = None;
        assert_eq!(request.validate().unwrap_err().label(), "invalid-request");
    }

    #[test]
    fn booted_is_not_a_desired_state() {
        let request = LifecycleRequest::import("lab: {}").with_state(State::Booted);
        assert!(request.validate().is_err());
        let request = LifecycleRequest::import("lab: {}").with_state(State::Defined);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn empty_stage_rejected() {
        let request =
            LifecycleRequest::import("lab: {}").with_staging(Staging::new(["core", " "]));
        assert!(request.validate().is_err());
    }
}
