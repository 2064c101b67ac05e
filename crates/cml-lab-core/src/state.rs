//! Lifecycle states shared by labs and nodes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The lifecycle state the controller reports for a lab, node, interface or
/// link.
///
/// Values are carried verbatim from the controller. For transition purposes
/// [`State::Booted`] and [`State::Queued`] count as started; see
/// [`State::normalized`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    /// Not running and holding no runtime resources.
    #[serde(rename = "DEFINED_ON_CORE", alias = "DEFINED_ON_CLUSTER")]
    Defined,
    /// Stopped, but runtime resources (disks, MACs) are still allocated.
    #[serde(rename = "STOPPED")]
    Stopped,
    /// Queued for start on a compute host.
    #[serde(rename = "QUEUED")]
    Queued,
    /// Started, possibly still booting.
    #[serde(rename = "STARTED")]
    Started,
    /// Fully booted.
    #[serde(rename = "BOOTED")]
    Booted,
}

impl State {
    /// The controller's wire name for this state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Defined => "DEFINED_ON_CORE",
            Self::Stopped => "STOPPED",
            Self::Queued => "QUEUED",
            Self::Started => "STARTED",
            Self::Booted => "BOOTED",
        }
    }

    /// Collapse the running sub-states onto [`State::Started`].
    #[must_use]
    pub const fn normalized(self) -> Self {
        match self {
            Self::Queued | Self::Started | Self::Booted => Self::Started,
            other => other,
        }
    }

    /// Returns true if the entity is running or about to run.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Queued | Self::Started | Self::Booted)
    }

    /// Returns true if the entity holds no runtime resources.
    #[must_use]
    pub const fn is_defined(self) -> bool {
        matches!(self, Self::Defined)
    }

    /// Returns true if a single start, stop or wipe moves an entity from
    /// `self` to `to`.
    ///
    /// ```text
    ///   DEFINED  --start-->  STARTED
    ///   STOPPED  --start-->  STARTED
    ///   STARTED  --stop--->  STOPPED
    ///   STOPPED  --wipe--->  DEFINED
    /// ```
    ///
    /// Running sub-states count as `STARTED`. `DEFINED` to `STOPPED` is never
    /// a single step.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self.normalized(), to.normalized()),
            (Self::Defined | Self::Stopped, Self::Started)
                | (Self::Started, Self::Stopped)
                | (Self::Stopped, Self::Defined)
        )
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
