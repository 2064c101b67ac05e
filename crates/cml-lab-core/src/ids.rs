//! Identifier types for controller entities.
//!
//! The controller hands out opaque, UUID-like strings for every entity. They
//! are never interpreted locally, only compared, ordered and echoed back in
//! request paths, so each kind gets its own newtype to keep a `NodeId` from
//! being passed where an `InterfaceId` is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input string is empty or only whitespace.
    #[error("identifier must not be empty")]
    Empty,

    /// The input contains characters that cannot appear in a URL path segment.
    #[error("identifier contains invalid character {0:?}")]
    InvalidCharacter(char),
}

fn validate(s: &str) -> Result<(), IdError> {
    if s.trim().is_empty() {
        return Err(IdError::Empty);
    }
    match s.chars().find(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#')) {
        Some(c) => Err(IdError::InvalidCharacter(c)),
        None => Ok(()),
    }
}

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh random identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Return the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                validate(s)?;
                Ok(Self(s.to_string()))
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                validate(&value)?;
                Ok(Self(value))
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

opaque_id!(
    /// Identifier of a lab.
    LabId
);
opaque_id!(
    /// Identifier of a node within a lab.
    NodeId
);
opaque_id!(
    /// Identifier of an interface on a node.
    InterfaceId
);
opaque_id!(
    /// Identifier of a link between two interfaces.
    LinkId
);
opaque_id!(
    /// Identifier of a controller user.
    UserId
);
opaque_id!(
    /// Identifier of a controller group.
    GroupId
);
opaque_id!(
    /// Identifier of an image definition (e.g. `alpine-3-13-2-base`).
    ImageDefinitionId
);
opaque_id!(
    /// Identifier of a node definition (e.g. `alpine`, `iosv`).
    NodeDefinitionId
);
