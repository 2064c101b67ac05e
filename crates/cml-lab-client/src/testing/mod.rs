//! Test doubles for the controller.
//!
//! [`MockTransport`] answers from a per-route script and is meant for unit
//! tests of a single operation. [`FakeController`] keeps lab state in memory
//! and follows the controller's transition rules, for tests that drive whole
//! workflows.

mod fake;
mod mock;

pub use fake::{FakeController, ADMIN_ID, FAKE_TOKEN};
pub use mock::MockTransport;
