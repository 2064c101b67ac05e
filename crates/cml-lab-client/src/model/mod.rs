//! Domain model.
//!
//! Records mirror the controller's JSON schema. Collections use ordered maps
//! and sorted vectors so serializing a lab is deterministic.

mod definitions;
mod group;
mod interface;
mod lab;
mod layer3;
mod link;
mod node;
mod user;

pub use definitions::{
    ExternalConnector, ImageDefinition, NodeDefinition, NodeDefinitionGeneral, NodeDefinitionUi,
};
pub use group::{Group, GroupLab, GroupSpec};
pub use interface::{Interface, InterfaceType};
pub use lab::{ImportResult, Lab, LabGroup, LabSpec, Permission};
pub use layer3::{Layer3Addresses, Layer3Interface, Layer3Node};
pub use link::{link_label, Link};
pub use node::{Node, NodeSpec, SerialDevice};
pub use user::{User, UserSpec};

pub(crate) use node::Created;
