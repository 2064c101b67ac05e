//! Lab state transition planning.
//!
//! A lab moves between three states with single-step actions:
//!
//! ```text
//!   DEFINED_ON_CORE --start--> STARTED --stop--> STOPPED
//!          ▲                                        │
//!          └─────────────────wipe───────────────────┘
//!   STOPPED --start--> STARTED
//! ```
//!
//! `QUEUED` and `BOOTED` count as `STARTED`. There is no way from
//! `DEFINED_ON_CORE` to `STOPPED`, and a lab that does not exist yet cannot
//! be created stopped.

use std::fmt;

use cml_lab_core::State;

use crate::error::{LifecycleError, Result};

/// One lab-wide state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Start the lab (staged if staging is configured).
    Start,
    /// Stop every running node.
    Stop,
    /// Wipe every stopped node.
    Wipe,
}

impl Action {
    /// State the lab is in after the action.
    #[must_use]
    pub const fn target(self) -> State {
        match self {
            Self::Start => State::Started,
            Self::Stop => State::Stopped,
            Self::Wipe => State::Defined,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Wipe => "wipe",
        })
    }
}

/// Returns true if `state` may be requested as a desired lab state.
#[must_use]
pub const fn is_desirable(state: State) -> bool {
    matches!(state, State::Defined | State::Stopped | State::Started)
}

/// Compute the actions that move a lab from `from` to `to`.
///
/// # Errors
///
/// Returns `LifecycleError::IllegalTransition` if no legal sequence exists.
pub fn plan(from: State, to: State) -> Result<Vec<Action>> {
    use State::{Defined, Started, Stopped};

    let actions = match (from.normalized(), to.normalized()) {
        (a, b) if a == b => Vec::new(),
        (Defined | Stopped, Started) => vec![Action::Start],
        (Started, Stopped) => vec![Action::Stop],
        (Stopped, Defined) => vec![Action::Wipe],
        (Started, Defined) => vec![Action::Stop, Action::Wipe],
        _ => {
            return Err(LifecycleError::IllegalTransition {
                from: Some(from),
                to,
            })
        }
    };
    Ok(actions)
}

/// Check that a lab about to be created can end up in `to`.
///
/// # Errors
///
/// Returns `LifecycleError::IllegalTransition` for `STOPPED`.
pub fn plan_new(to: State) -> Result<()> {
    if to.normalized() == State::Stopped {
        return Err(LifecycleError::IllegalTransition { from: None, to });
    }
    Ok(())
}
