//! Error types for lifecycle orchestration.

use cml_lab_client::ClientError;
use cml_lab_core::State;
use thiserror::Error;

/// A result type using `LifecycleError`.
pub type Result<T> = std::result::Result<T, LifecycleError>;

/// Errors that can occur while driving a lab through its lifecycle.
#[derive(Debug, Clone, Error)]
pub enum LifecycleError {
    /// A controller call failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// The desired state cannot be reached from the current one.
    ///
    /// `from` is `None` for a lab that does not exist yet.
    #[error(
        "can't transition from {} to {to}",
        .from.map_or("absent", State::as_str)
    )]
    IllegalTransition {
        /// Current lab state.
        from: Option<State>,
        /// Requested lab state.
        to: State,
    },

    /// A configuration targets a node that is not in the lab.
    #[error("node {0} not found in lab")]
    NodeNotFound(String),

    /// A configuration targets a node that is not `DEFINED_ON_CORE`.
    #[error("node {label} is {state}, configuration requires DEFINED_ON_CORE")]
    NodeNotDefined {
        /// Label of the node.
        label: String,
        /// Its current state.
        state: State,
    },

    /// The lifecycle request is inconsistent.
    #[error("invalid lifecycle request: {0}")]
    InvalidRequest(String),
}

impl LifecycleError {
    /// Stable label identifying the error kind.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Client(e) => e.label(),
            Self::IllegalTransition { .. } | Self::NodeNotDefined { .. } => {
                "illegal-state-transition"
            }
            Self::NodeNotFound(_) => "element-not-found",
            Self::InvalidRequest(_) => "invalid-request",
        }
    }

    /// Returns true if retrying the whole operation may succeed.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        match self {
            Self::Client(e) => e.is_retriable(),
            _ => false,
        }
    }
}
