//! Core types shared by the cml-lab crates.
//!
//! This crate provides the foundational types used throughout the workspace:
//!
//! - **Identifiers**: Strongly-typed, opaque IDs for labs, nodes, interfaces,
//!   links, users, groups and definitions
//! - **States**: The node/lab lifecycle [`State`] with its controller wire names
//!
//! # Example
//!
//! ```
//! use cml_lab_core::{LabId, NodeId, State};
//!
//! let lab_id: LabId = "4a5c6f0e-1d38-4b7e-9a52-3f1a2c7c9d10".parse().unwrap();
//! let node_id = NodeId::generate();
//! assert_ne!(lab_id.as_str(), node_id.as_str());
//!
//! let state: State = serde_json::from_str("\"DEFINED_ON_CORE\"").unwrap();
//! assert_eq!(state.to_string(), "DEFINED_ON_CORE");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod ids;
pub mod state;

pub use ids::{
    GroupId, IdError, ImageDefinitionId, InterfaceId, LabId, LinkId, NodeDefinitionId, NodeId,
    UserId,
};
pub use state::State;
