//! The controller client handle.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::gate::{AuthGate, Credentials};
use crate::transport::{HttpsTransport, Transport};
use crate::version::SystemInformation;

/// Client for one CML controller.
///
/// Cloning is cheap and clones share the auth gate, the cached token and the
/// link-creation lock. Every clone carries a cancellation token; when it
/// fires, pending requests fail with [`ClientError::Cancelled`].
#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<Inner>,
    pub(crate) cancel: CancellationToken,
}

pub(crate) struct Inner {
    pub(crate) api_base: String,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) gate: AuthGate,
    pub(crate) link_lock: tokio::sync::Mutex<()>,
    pub(crate) max_parallelism: usize,
    pub(crate) converge_interval: Duration,
}

impl Client {
    /// Create a client talking HTTPS to the configured controller.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if the configuration is invalid.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut config = config;
        config.validate()?;
        let transport = HttpsTransport::new(&config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a client with a custom transport.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if the configuration is invalid.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let mut config = config;
        config.validate()?;

        let credentials = match (&config.username, &config.password) {
            (Some(username), Some(password)) => Some(Credentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        };

        tracing::debug!(
            host = %config.host,
            token = config.token.is_some(),
            credentials = credentials.is_some(),
            "Created controller client"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                api_base: config.api_base(),
                transport,
                gate: AuthGate::new(config.token.clone(), credentials),
                link_lock: tokio::sync::Mutex::new(()),
                max_parallelism: config.max_parallelism,
                converge_interval: config.converge_interval(),
            }),
            cancel: CancellationToken::new(),
        })
    }

    /// Return a clone of this client bound to another cancellation token.
    ///
    /// The clone shares all state with `self`.
    #[must_use]
    pub fn with_cancellation(&self, cancel: CancellationToken) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            cancel,
        }
    }

    /// The cancellation token requests of this clone observe.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Base URL of the v0 API.
    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.inner.api_base
    }

    /// Interval between convergence polls.
    #[must_use]
    pub fn converge_interval(&self) -> Duration {
        self.inner.converge_interval
    }

    /// Maximum concurrent requests for fan-out reads.
    #[must_use]
    pub fn max_parallelism(&self) -> usize {
        self.inner.max_parallelism
    }

    /// The currently cached bearer token.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.inner.gate.token()
    }

    /// Replace the bearer token and clear a sticky authentication failure.
    ///
    /// A version incompatibility stays sticky.
    pub fn set_token(&self, token: impl Into<String>) {
        self.inner.gate.set_token(token.into());
    }

    /// Replace the username/password and clear a sticky authentication
    /// failure. The next request authenticates afresh.
    pub fn set_credentials(&self, username: impl Into<String>, password: impl Into<String>) {
        self.inner.gate.set_credentials(Credentials {
            username: username.into(),
            password: password.into(),
        });
    }

    /// The lock serializing link creation.
    ///
    /// Held by [`Client::link_create`] for the whole interface selection and
    /// creation round trip. Callers composing their own link workflows take
    /// it to avoid racing for the same free interface.
    #[must_use]
    pub fn link_create_lock(&self) -> &tokio::sync::Mutex<()> {
        &self.inner.link_lock
    }

    /// Fetch `/system_information`. No authentication is required.
    ///
    /// # Errors
    ///
    /// Returns transport, status or decode errors.
    pub async fn system_information(&self) -> Result<SystemInformation> {
        self.fetch_system_information().await
    }

    /// Run the version gate and report whether the controller is ready.
    ///
    /// A controller that is not ready yields `Ok(false)` and is checked
    /// again on the next call.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::IncompatibleController` (sticky) for an
    /// unsupported version, or transport, status or decode errors.
    pub async fn ready(&self) -> Result<bool> {
        match self.ensure_version().await {
            Ok(()) => Ok(self.system_information().await?.ready),
            Err(ClientError::SystemNotReady) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Check that the configured credentials are accepted.
    ///
    /// Passes the version gate and calls `GET /auth_test`, re-authenticating
    /// on 401 like any other request.
    ///
    /// # Errors
    ///
    /// Returns the gate or authentication error.
    pub async fn verify_token(&self) -> Result<()> {
        self.send(reqwest::Method::GET, "auth_test", None).await?;
        Ok(())
    }

    /// Await `fut` unless the cancellation token fires first.
    pub(crate) async fn cancellable<T, F>(&self, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(ClientError::Cancelled),
            out = fut => out,
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("api_base", &self.inner.api_base)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use reqwest::Method;
    use serde_json::json;

    const INFO: &str = "/system_information";

    fn client(mock: &Arc<MockTransport>) -> Client {
        Client::with_transport(ClientConfig::with_token("https://cml", "tok"), mock.clone())
            .unwrap()
    }

    #[tokio::test]
    async fn ready_rejects_incompatible_controller() {
        let mock = Arc::new(MockTransport::with_controller("2.5.1"));
        let client = client(&mock);

        assert_eq!(
            client.ready().await.unwrap_err().label(),
            "incompatible-controller"
        );
        // the verdict is sticky for later calls
        assert_eq!(
            client.labs().await.unwrap_err().label(),
            "incompatible-controller"
        );
        assert_eq!(mock.count(&Method::GET, INFO), 1);
        assert_eq!(mock.count(&Method::GET, "/labs"), 0);
    }

    #[tokio::test]
    async fn ready_reports_booting_controller() {
        let mock = Arc::new(MockTransport::new());
        mock.on(Method::GET, INFO, 200, json!({"version": "2.4.0", "ready": false}))
            .on(Method::GET, INFO, 200, json!({"version": "2.4.0", "ready": true}));
        let client = client(&mock);

        assert!(!client.ready().await.unwrap());
        assert!(client.ready().await.unwrap());
    }
}
