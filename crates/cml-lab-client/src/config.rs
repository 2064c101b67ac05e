//! Client configuration.
//!
//! A [`ClientConfig`] can be deserialized from a config file, built in code
//! with [`ClientConfig::with_token`] / [`ClientConfig::with_credentials`], or
//! read from the `CML_*` environment variables with
//! [`ClientConfig::from_env`].

use std::fmt;
use std::time::Duration;

use base64::prelude::*;
use serde::Deserialize;

use crate::error::{ClientError, Result};

/// Environment variable holding the controller URL.
pub const ENV_CML_HOST: &str = "CML_HOST";
/// Environment variable holding the username.
pub const ENV_CML_USER: &str = "CML_USER";
/// Environment variable holding the password.
pub const ENV_CML_PASS: &str = "CML_PASS";
/// Environment variable holding the base64-encoded password.
pub const ENV_CML_PASS64: &str = "CML_PASS64";
/// Environment variable holding a bearer token.
pub const ENV_CML_TOKEN: &str = "CML_TOKEN";
/// Environment variable holding the path to a PEM CA certificate.
pub const ENV_CML_CACERT: &str = "CML_CACERT";
/// Environment variable disabling TLS verification.
pub const ENV_CML_SKIP_VERIFY: &str = "CML_SKIP_VERIFY";

/// Configuration for a controller client.
#[derive(Clone, Deserialize)]
pub struct ClientConfig {
    /// Controller base URL, e.g. `https://cml.example.com`.
    pub host: String,

    /// Accept any TLS certificate.
    #[serde(default)]
    pub insecure_skip_verify: bool,

    /// PEM-encoded CA certificate to trust in addition to the system roots.
    #[serde(default)]
    pub ca_cert: Option<String>,

    /// Bearer token (JWT).
    #[serde(default)]
    pub token: Option<String>,

    /// Username for `/authenticate`.
    #[serde(default)]
    pub username: Option<String>,

    /// Password for `/authenticate`.
    #[serde(default)]
    pub password: Option<String>,

    /// Per-request deadline in seconds.
    #[serde(default = "ClientConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Maximum number of concurrent requests in a deep lab read.
    #[serde(default = "ClientConfig::default_max_parallelism")]
    pub max_parallelism: usize,

    /// Interval between convergence polls in seconds.
    #[serde(default = "ClientConfig::default_converge_interval")]
    pub converge_interval_seconds: u64,
}

impl ClientConfig {
    const fn default_request_timeout() -> u64 {
        15
    }

    const fn default_max_parallelism() -> usize {
        16
    }

    const fn default_converge_interval() -> u64 {
        5
    }

    fn base(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            insecure_skip_verify: false,
            ca_cert: None,
            token: None,
            username: None,
            password: None,
            request_timeout_seconds: Self::default_request_timeout(),
            max_parallelism: Self::default_max_parallelism(),
            converge_interval_seconds: Self::default_converge_interval(),
        }
    }

    /// Create a configuration that authenticates with a bearer token.
    #[must_use]
    pub fn with_token(host: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Self::base(host)
        }
    }

    /// Create a configuration that authenticates with username and password.
    #[must_use]
    pub fn with_credentials(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
            ..Self::base(host)
        }
    }

    /// Read the configuration from the `CML_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if a variable is missing or invalid, or
    /// the CA certificate file cannot be read.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`ClientConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup(ENV_CML_HOST).ok_or_else(|| {
            ClientError::Config(format!("missing environment variable `{ENV_CML_HOST}`"))
        })?;

        let mut config = Self::base(host);
        config.username = lookup(ENV_CML_USER);
        config.token = lookup(ENV_CML_TOKEN);

        // CML_PASS64 wins over CML_PASS when both are set
        config.password = match lookup(ENV_CML_PASS64) {
            Some(encoded) => {
                let bytes = BASE64_STANDARD.decode(encoded.trim()).map_err(|e| {
                    ClientError::Config(format!("`{ENV_CML_PASS64}` is not valid base64: {e}"))
                })?;
                Some(String::from_utf8(bytes).map_err(|_| {
                    ClientError::Config(format!("`{ENV_CML_PASS64}` is not valid UTF-8"))
                })?)
            }
            None => lookup(ENV_CML_PASS),
        };

        if let Some(path) = lookup(ENV_CML_CACERT) {
            let pem = std::fs::read_to_string(&path).map_err(|e| {
                ClientError::Config(format!("failed to read CA certificate `{path}`: {e}"))
            })?;
            config.ca_cert = Some(pem);
        }

        if let Some(flag) = lookup(ENV_CML_SKIP_VERIFY) {
            config.insecure_skip_verify = parse_flag(&flag).ok_or_else(|| {
                ClientError::Config(format!("`{ENV_CML_SKIP_VERIFY}` is not a boolean: {flag}"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for consistency and normalize the host.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if the host is not an HTTP(S) URL, no
    /// authentication method is configured, or only half of a
    /// username/password pair is present.
    pub fn validate(&mut self) -> Result<()> {
        let host = self.host.trim().trim_end_matches('/').to_string();
        if !(host.starts_with("https://") || host.starts_with("http://")) {
            return Err(ClientError::Config(format!(
                "host must be an http(s) URL, got `{}`",
                self.host
            )));
        }
        self.host = host;

        match (&self.username, &self.password) {
            (Some(_), None) => {
                return Err(ClientError::Config(
                    "username given without password".to_string(),
                ))
            }
            (None, Some(_)) => {
                return Err(ClientError::Config(
                    "password given without username".to_string(),
                ))
            }
            _ => {}
        }

        if self.token.is_none() && !self.has_credentials() {
            return Err(ClientError::Config(
                "either a token or username and password are required".to_string(),
            ));
        }

        if self.max_parallelism == 0 {
            return Err(ClientError::Config(
                "max_parallelism must be at least 1".to_string(),
            ));
        }

        if self.converge_interval_seconds == 0 {
            return Err(ClientError::Config(
                "converge_interval_seconds must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Returns true if both username and password are configured.
    #[must_use]
    pub const fn has_credentials(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    /// Base URL of the v0 API.
    #[must_use]
    pub fn api_base(&self) -> String {
        format!("{}/api/v0", self.host.trim_end_matches('/'))
    }

    /// Get the per-request deadline as a `Duration`.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Get the convergence poll interval as a `Duration`.
    #[must_use]
    pub const fn converge_interval(&self) -> Duration {
        Duration::from_secs(self.converge_interval_seconds)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("host", &self.host)
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .field("ca_cert", &self.ca_cert.as_ref().map(|_| "<pem>"))
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("max_parallelism", &self.max_parallelism)
            .field("converge_interval_seconds", &self.converge_interval_seconds)
            .finish()
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
