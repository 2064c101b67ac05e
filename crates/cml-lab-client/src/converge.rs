//! Convergence poller.

use std::time::Duration;

use cml_lab_core::LabId;
use tokio::time::Instant;

use crate::client::Client;
use crate::error::{ClientError, Result};

impl Client {
    /// Ask the controller whether the lab reached a steady state.
    ///
    /// # Errors
    ///
    /// Returns gate, transport, status or decode errors.
    pub async fn has_lab_converged(&self, id: &LabId) -> Result<bool> {
        self.get_json(&format!("labs/{id}/check_if_converged")).await
    }

    /// Poll until the lab converges or `timeout` elapses.
    ///
    /// Polls every [`Client::converge_interval`]. Transient failures (5xx,
    /// network, a single request running past its deadline) are logged and
    /// polled again. When the client's cancellation
    /// token fires, returns `Ok(())` right away.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Timeout` if the lab has not converged in time,
    /// or the first non-retriable error.
    pub async fn converge(&self, id: &LabId, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        let interval = self.inner.converge_interval;

        loop {
            match self.has_lab_converged(id).await {
                Ok(true) => {
                    tracing::debug!(lab_id = %id, elapsed = ?started.elapsed(), "Lab converged");
                    return Ok(());
                }
                Ok(false) => {}
                Err(ClientError::Cancelled) => {
                    tracing::debug!(lab_id = %id, "Convergence wait cancelled");
                    return Ok(());
                }
                Err(e) if e.is_retriable() => {
                    tracing::warn!(lab_id = %id, error = %e, "Convergence check failed, retrying");
                }
                Err(e) => return Err(e),
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(ClientError::Timeout(format!(
                    "lab {id} did not converge within {timeout:?}"
                )));
            }

            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!(lab_id = %id, "Convergence wait cancelled");
                    return Ok(());
                }
                () = tokio::time::sleep(interval.min(timeout - elapsed)) => {}
            }
        }
    }
}
