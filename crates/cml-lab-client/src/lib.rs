//! Async client for the Cisco Modeling Labs controller API.
//!
//! This crate provides everything needed to read and mutate labs on a CML
//! controller:
//!
//! - **Transport**: a [`Transport`] trait with an HTTPS implementation
//! - **Gate**: a one-time version check plus token and credential handling,
//!   with a single re-authentication on 401
//! - **Model**: typed records for labs, nodes, interfaces, links, users and
//!   groups
//! - **Assembler**: shallow and deep lab reads, fanned out under a shared
//!   parallelism limit
//! - **Mutators**: create, update, start, stop, wipe and destroy operations
//! - **Convergence**: polling until a lab reaches a steady state
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐
//! │   ops / assembler│────▶│   Client (rpc)   │
//! │   converge       │     │   version + auth │
//! └──────────────────┘     └────────┬─────────┘
//!                                   │
//!                          ┌────────▼─────────┐
//!                          │    Transport     │
//!                          │    (trait)       │
//!                          └────────┬─────────┘
//!                                   │ HTTPS
//!                          ┌────────▼─────────┐
//!                          │  CML controller  │
//!                          │  /api/v0         │
//!                          └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use cml_lab_client::{Client, ClientConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::with_credentials("https://cml.example.com", "admin", "secret");
//! let client = Client::new(config)?;
//!
//! for id in client.labs().await? {
//!     let lab = client.lab(&id).await?;
//!     println!("{} {} ({})", lab.id, lab.title, lab.state);
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod model;
pub mod token;
pub mod transport;
pub mod version;

mod assembler;
mod client;
mod converge;
mod gate;
mod ops;
mod rpc;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use client::Client;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use ops::{select_interface, SlotChoice};
pub use transport::{ApiRequest, ApiResponse, HttpsTransport, Transport, TransportError};
pub use version::{check_version, Compatibility, SystemInformation, VERSION_CONSTRAINT};
