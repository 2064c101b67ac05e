//! Lifecycle controller.
//!
//! Drives a whole lab towards a [`LifecycleRequest`]: imports or adopts it,
//! injects node configurations, starts nodes stage by stage and waits for
//! the lab to converge. Every transition is planned before the first
//! mutation is sent, so an illegal request leaves the lab untouched.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use cml_lab_client::model::Lab;
use cml_lab_client::{Client, ClientError};
use cml_lab_core::{LabId, NodeId, State};

use crate::error::{LifecycleError, Result};
use crate::request::{LabSource, LifecycleRequest, Staging, Timeouts};
use crate::transitions::{self, Action};

/// Node configurations resolved against a lab.
type ConfigTargets<'a> = Vec<(NodeId, &'a str)>;

/// Create, read, update and delete of a lab as one managed resource.
#[async_trait]
pub trait LabLifecycle: Send + Sync {
    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Bring a new or adopted lab into the requested shape.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::IllegalTransition` before any mutation if
    /// the desired state is unreachable, `NodeNotFound`/`NodeNotDefined` for
    /// bad configuration targets, or the first controller error.
    async fn create(&self, request: &LifecycleRequest) -> Result<Lab>;

    /// Read the lab with all of its elements.
    async fn read(&self, lab_id: &LabId) -> Result<Lab>;

    /// Move a lab from `current` to the requested shape.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::IllegalTransition` without issuing any
    /// request if the transition is not legal.
    async fn update(&self, current: &Lab, request: &LifecycleRequest) -> Result<Lab>;

    /// Stop and wipe the lab, then destroy it if `destroy` is set.
    ///
    /// Labs adopted through [`LifecycleRequest::adopt`] are usually released
    /// with `destroy = false`; their owner destroys them. A lab that no
    /// longer exists counts as deleted.
    async fn delete(&self, lab_id: &LabId, timeouts: &Timeouts, destroy: bool) -> Result<()>;
}

/// The lifecycle controller, built on a [`Client`].
#[derive(Debug, Clone)]
pub struct LifecycleController {
    client: Client,
}

impl LifecycleController {
    /// Create a controller.
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    /// Get the underlying client.
    #[must_use]
    pub const fn client(&self) -> &Client {
        &self.client
    }

    /// Start the lab, stage by stage if `staging` is set.
    ///
    /// Each stage starts the not yet running nodes carrying its tag and then
    /// converges with the full `timeout`. Returns true if the last thing
    /// done was a convergence wait.
    async fn staged_start(
        &self,
        lab: &Lab,
        staging: Option<&Staging>,
        timeout: Duration,
        wait: bool,
    ) -> Result<bool> {
        let Some(staging) = staging else {
            self.client.lab_start(&lab.id).await?;
            if wait {
                self.client.converge(&lab.id, timeout).await?;
            }
            return Ok(wait);
        };

        let mut started: BTreeSet<&NodeId> = lab
            .nodes
            .values()
            .filter(|n| n.state.is_active())
            .map(|n| &n.id)
            .collect();

        for tag in &staging.stages {
            let stage: Vec<_> = lab
                .nodes_tagged(tag)
                .filter(|n| !started.contains(&n.id))
                .collect();
            tracing::info!(lab_id = %lab.id, stage = %tag, nodes = stage.len(), "Starting stage");

            for node in stage {
                self.client.node_start(node).await?;
                started.insert(&node.id);
            }
            self.client.converge(&lab.id, timeout).await?;
        }

        if staging.start_remaining {
            tracing::info!(lab_id = %lab.id, "Starting remaining nodes");
            self.client.lab_start(&lab.id).await?;
            if wait {
                self.client.converge(&lab.id, timeout).await?;
            }
            return Ok(wait);
        }
        Ok(true)
    }

    /// Inject configurations into the nodes of `lab`.
    async fn inject(&self, lab: &mut Lab, targets: &[(NodeId, &str)]) -> Result<()> {
        for (node_id, config) in targets {
            if let Some(node) = lab.nodes.get_mut(node_id) {
                self.client.node_set_config(node, config).await?;
            }
        }
        Ok(())
    }

    /// Run planned actions. Configurations in `pending` are injected right
    /// after a wipe. Returns true if the last thing done was a convergence
    /// wait.
    async fn apply(
        &self,
        lab_id: &LabId,
        actions: &[Action],
        request: &LifecycleRequest,
        timeout: Duration,
        pending: &[(NodeId, &str)],
    ) -> Result<bool> {
        let mut converged = false;
        for action in actions {
            tracing::info!(lab_id = %lab_id, action = %action, "Applying lab transition");
            converged = match action {
                Action::Start => {
                    let lab = self.client.lab_deep(lab_id).await?;
                    self.staged_start(&lab, request.staging.as_ref(), timeout, request.wait)
                        .await?
                }
                Action::Stop => {
                    self.client.lab_stop(lab_id).await?;
                    false
                }
                Action::Wipe => {
                    self.client.lab_wipe(lab_id).await?;
                    if !pending.is_empty() {
                        let mut lab = self.client.lab_deep(lab_id).await?;
                        ensure_defined(&lab, pending)?;
                        self.inject(&mut lab, pending).await?;
                    }
                    false
                }
            };
        }
        Ok(converged)
    }
}

#[async_trait]
impl LabLifecycle for LifecycleController {
    async fn create(&self, request: &LifecycleRequest) -> Result<Lab> {
        request.validate()?;
        let timeout = request.timeouts.create();

        let (mut lab, actions) = match request.source()? {
            LabSource::Topology(topology) => {
                transitions::plan_new(request.state)?;
                let imported = self.client.lab_import(topology).await?;
                let lab = self.client.lab_deep(&imported.id).await?;
                let actions = if request.state.normalized() == State::Started {
                    vec![Action::Start]
                } else {
                    Vec::new()
                };
                (lab, actions)
            }
            LabSource::Existing { lab_id, elements } => {
                let lab = self.client.lab_deep(lab_id).await?;
                check_elements(&lab, elements)?;
                let actions = transitions::plan(lab.state, request.state)?;
                tracing::info!(lab_id = %lab_id, state = %lab.state, "Adopted lab");
                (lab, actions)
            }
        };

        let targets = config_targets(&lab, &request.configs, false)?;
        ensure_defined(&lab, &targets)?;
        self.inject(&mut lab, &targets).await?;

        let converged = self
            .apply(&lab.id, &actions, request, timeout, &[])
            .await?;
        if request.wait && !converged {
            self.client.converge(&lab.id, timeout).await?;
        }

        let lab = self.client.lab_deep(&lab.id).await?;
        tracing::info!(lab_id = %lab.id, state = %lab.state, "Lab created");
        Ok(lab)
    }

    async fn read(&self, lab_id: &LabId) -> Result<Lab> {
        Ok(self.client.lab_deep(lab_id).await?)
    }

    async fn update(&self, current: &Lab, request: &LifecycleRequest) -> Result<Lab> {
        request.validate()?;
        let actions = transitions::plan(current.state, request.state)?;

        let targets = config_targets(current, &request.configs, true)?;
        let wipes = actions.contains(&Action::Wipe);
        if !wipes {
            ensure_defined(current, &targets)?;
        }

        let timeout = request.timeouts.update();
        if !targets.is_empty() && !wipes {
            let mut lab = self.client.lab_deep(&current.id).await?;
            ensure_defined(&lab, &targets)?;
            self.inject(&mut lab, &targets).await?;
        }

        let pending = if wipes { targets } else { Vec::new() };
        let converged = self
            .apply(&current.id, &actions, request, timeout, &pending)
            .await?;
        if request.wait && !converged {
            self.client.converge(&current.id, timeout).await?;
        }

        let lab = self.client.lab_deep(&current.id).await?;
        tracing::info!(lab_id = %lab.id, state = %lab.state, "Lab updated");
        Ok(lab)
    }

    async fn delete(&self, lab_id: &LabId, timeouts: &Timeouts, destroy: bool) -> Result<()> {
        match self.client.converge(lab_id, timeouts.delete()).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                tracing::info!(lab_id = %lab_id, "Lab already gone");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        let mut lab = self.client.lab(lab_id).await?;
        if lab.is_active() {
            self.client.lab_stop(lab_id).await?;
            lab = self.client.lab(lab_id).await?;
        }
        if !lab.state.is_defined() {
            self.client.lab_wipe(lab_id).await?;
        }

        if !destroy {
            tracing::info!(lab_id = %lab_id, "Released lab");
            return Ok(());
        }

        self.client.lab_destroy(lab_id).await?;
        Ok(())
    }
}

/// Check that every claimed element is a node or link of `lab`.
fn check_elements(lab: &Lab, elements: &[String]) -> Result<()> {
    for element in elements {
        let known = lab.nodes.keys().any(|id| id.as_str() == element)
            || lab.links.iter().any(|l| l.id.as_str() == element);
        if !known {
            return Err(ClientError::ElementNotFound {
                kind: "element",
                key: element.clone(),
            }
            .into());
        }
    }
    Ok(())
}

/// Resolve configuration keys (label, else id) to nodes of `lab`.
///
/// With `only_changed`, configurations equal to the node's current one are
/// left out.
fn config_targets<'a>(
    lab: &Lab,
    configs: &'a BTreeMap<String, String>,
    only_changed: bool,
) -> Result<ConfigTargets<'a>> {
    let mut targets = Vec::with_capacity(configs.len());
    for (key, config) in configs {
        let node = lab
            .node_by_label_or_id(key)
            .ok_or_else(|| LifecycleError::NodeNotFound(key.clone()))?;
        if only_changed && node.configuration.as_deref() == Some(config.as_str()) {
            continue;
        }
        targets.push((node.id.clone(), config.as_str()));
    }
    Ok(targets)
}

fn ensure_defined(lab: &Lab, targets: &[(NodeId, &str)]) -> Result<()> {
    for (node_id, _) in targets {
        let Some(node) = lab.nodes.get(node_id) else {
            return Err(LifecycleError::NodeNotFound(node_id.to_string()));
        };
        if !node.state.is_defined() {
            return Err(LifecycleError::NodeNotDefined {
                label: node.label.clone(),
                state: node.state,
            });
        }
    }
    Ok(())
}
