//! Error types for controller client operations.
//!
//! Every variant corresponds to one of the error kinds callers branch on,
//! and carries a stable [`label`](ClientError::label) that is reported to
//! the host framework alongside the human message.

use std::time::Duration;

use cml_lab_core::State;
use thiserror::Error;

use crate::transport::TransportError;

/// A result type using `ClientError`.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur while talking to the controller.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Network-level failure.
    #[error("transport error: {0}")]
    Transport(TransportError),

    /// The controller answered with a body that does not match the expected schema.
    #[error("malformed response from {path}: {reason}")]
    MalformedResponse {
        /// Request path that produced the response.
        path: String,
        /// Decoder message.
        reason: String,
    },

    /// The controller rejected the request and re-authentication failed.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The token is invalid and there are no credentials to obtain a new one.
    #[error("invalid token and no username/password to obtain a new one")]
    InvalidTokenNoCredentials,

    /// The controller version is outside the supported range.
    #[error("controller version incompatible: want {want}, got {got}")]
    IncompatibleController {
        /// Accepted version constraint.
        want: String,
        /// Version reported by the controller.
        got: String,
    },

    /// The controller reported `ready=false`.
    #[error("controller is not ready")]
    SystemNotReady,

    /// The controller returned 404.
    #[error("not found: {path}: {message}")]
    NotFound {
        /// Request path.
        path: String,
        /// Message from the controller.
        message: String,
    },

    /// A lookup by label, title or name found nothing.
    #[error("{kind} not found: {key}")]
    ElementNotFound {
        /// Kind of element looked up (`node`, `lab`, ...).
        kind: &'static str,
        /// The label, title, name or ID searched for.
        key: String,
    },

    /// The requested transition is not legal from the entity's current state.
    #[error("illegal state transition for {entity}: can't transition from {from} to {to}")]
    IllegalStateTransition {
        /// Entity being transitioned.
        entity: String,
        /// Current state.
        from: State,
        /// Requested state.
        to: State,
    },

    /// The operation requires the entity to be in a specific state.
    #[error("{entity} is {state}, operation requires {required}")]
    NotInState {
        /// Entity the operation targets.
        entity: String,
        /// Current state.
        state: State,
        /// State the operation requires.
        required: State,
    },

    /// Convergence or operation deadline exceeded.
    #[error("timed out: {0}")]
    Timeout(String),

    /// A single request ran past the transport deadline. Unlike
    /// [`ClientError::Timeout`] the operation may be retried.
    #[error("timed out: request deadline of {0:?} exceeded")]
    RequestTimeout(Duration),

    /// The controller returned 409.
    #[error("conflict on {path}: {message}")]
    Conflict {
        /// Request path.
        path: String,
        /// Message from the controller.
        message: String,
    },

    /// The controller returned another 4xx status.
    #[error("API error ({status}) on {path}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Request path.
        path: String,
        /// Message from the controller.
        message: String,
    },

    /// The controller returned a 5xx status.
    #[error("server error ({status}) on {path}: {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Request path.
        path: String,
        /// Message from the controller.
        message: String,
    },

    /// The request was rejected locally before reaching the controller.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The client configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// The ambient cancellation signal fired while the operation was pending.
    #[error("operation cancelled")]
    Cancelled,
}

impl ClientError {
    /// Stable label identifying the error kind.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::MalformedResponse { .. } => "malformed-response",
            Self::Unauthorized(_) => "unauthorized",
            Self::InvalidTokenNoCredentials => "invalid-token-no-credentials",
            Self::IncompatibleController { .. } => "incompatible-controller",
            Self::SystemNotReady => "system-not-ready",
            Self::NotFound { .. } => "not-found",
            Self::ElementNotFound { .. } => "element-not-found",
            Self::IllegalStateTransition { .. } | Self::NotInState { .. } => {
                "illegal-state-transition"
            }
            Self::Timeout(_) | Self::RequestTimeout(_) => "timeout",
            Self::Conflict { .. } => "conflict",
            Self::Api { .. } => "api-error",
            Self::Server { .. } => "server-error",
            Self::InvalidRequest(_) => "invalid-request",
            Self::Config(_) => "config",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns true if the caller may retry the operation unchanged.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::RequestTimeout(_) | Self::Server { .. }
        )
    }

    /// Returns the HTTP status code the controller answered with, if any.
    #[must_use]
    pub const fn http_status_code(&self) -> Option<u16> {
        match self {
            Self::Unauthorized(_) | Self::InvalidTokenNoCredentials => Some(401),
            Self::NotFound { .. } => Some(404),
            Self::Conflict { .. } => Some(409),
            Self::Api { status, .. } | Self::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true for 404 responses and failed lookups.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::ElementNotFound { .. })
    }
}

impl From<TransportError> for ClientError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Timeout(after) => Self::RequestTimeout(after),
            other => Self::Transport(other),
        }
    }
}
