//! Lifecycle orchestration for CML labs.
//!
//! Treats a lab as one managed resource with create, read, update and delete
//! operations:
//!
//! - **Request**: where the lab comes from, its desired state, node
//!   configurations, staging and time budgets
//! - **Transitions**: planning of lab-wide start, stop and wipe steps
//! - **Controller**: executes a plan against the controller and waits for
//!   convergence
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────────┐
//! │ LifecycleRequest │────▶│  LifecycleController │
//! └──────────────────┘     │  plan ─▶ configure   │
//!                          │  ─▶ staged start     │
//!                          │  ─▶ converge         │
//!                          └──────────┬───────────┘
//!                                     │
//!                          ┌──────────▼───────────┐
//!                          │  cml_lab_client      │
//!                          │  Client              │
//!                          └──────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use cml_lab_client::{Client, ClientConfig};
//! use cml_lab_lifecycle::{LabLifecycle, LifecycleController, LifecycleRequest, Staging};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::new(ClientConfig::with_credentials(
//!     "https://cml.example.com",
//!     "admin",
//!     "secret",
//! ))?;
//! let controller = LifecycleController::new(client);
//!
//! let topology = std::fs::read_to_string("lab.yaml")?;
//! let request = LifecycleRequest::import(topology)
//!     .with_config("r1", "hostname r1")
//!     .with_staging(Staging::new(["core", "edge"]));
//!
//! let lab = controller.create(&request).await?;
//! println!("{} is {}", lab.id, lab.state);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod controller;
pub mod error;
pub mod request;
pub mod transitions;

pub use controller::{LabLifecycle, LifecycleController};
pub use error::{LifecycleError, Result};
pub use request::{LabSource, LifecycleRequest, Staging, Timeouts};
pub use transitions::{plan, Action};
