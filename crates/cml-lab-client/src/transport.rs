//! HTTP transport abstraction.
//!
//! The rest of the client only ever talks to the controller through
//! [`Transport::perform`]. The production implementation is
//! [`HttpsTransport`]; tests swap in the mock transport from the `testing`
//! module (feature `test-utils`).

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// Network-level failures reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The per-request deadline elapsed.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The connection could not be established.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The request failed after the connection was established.
    #[error("request failed: {0}")]
    Request(String),
}

/// A fully composed request, ready to be sent.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL including any query string.
    pub url: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Optional request body.
    pub body: Option<Vec<u8>>,
}

impl ApiRequest {
    /// Create a request without headers or body.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// The path below `/api/v0`, without the query string.
    ///
    /// `https://cml/api/v0/labs/abc?x=1` yields `/labs/abc`.
    #[must_use]
    pub fn api_path(&self) -> &str {
        let after_scheme = self.url.find("://").map_or(0, |i| i + 3);
        let rest = &self.url[after_scheme..];
        let path = rest.find('/').map_or("/", |i| &rest[i..]);
        let path = path.split(['?', '#']).next().unwrap_or(path);
        path.strip_prefix("/api/v0").unwrap_or(path)
    }

    /// The bearer token carried by this request, if any.
    #[must_use]
    pub fn bearer_token(&self) -> Option<&str> {
        self.headers
            .get(reqwest::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
    }
}

/// A response as received from the controller.
#[derive(Clone)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Raw body bytes.
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// Create a response with the given status and body.
    #[must_use]
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Create a `200 OK` response carrying the JSON encoding of `value`.
    #[must_use]
    pub fn json(status: StatusCode, value: &serde_json::Value) -> Self {
        let mut resp = Self::new(status, value.to_string());
        resp.headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        resp
    }

    /// Body decoded lossily as UTF-8, for error messages.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl fmt::Debug for ApiResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiResponse")
            .field("status", &self.status)
            .field("body_len", &self.body.len())
            .finish_non_exhaustive()
    }
}

/// Trait for sending requests to the controller.
///
/// Implementations must preserve status code, body bytes and headers.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and return the controller's response.
    ///
    /// # Errors
    ///
    /// Returns a `TransportError` if no response could be obtained.
    async fn perform(&self, request: ApiRequest)
        -> std::result::Result<ApiResponse, TransportError>;
}

/// HTTPS transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpsTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpsTransport {
    /// Build a transport from the client configuration.
    ///
    /// Honors `insecure_skip_verify`, an optional PEM CA certificate and the
    /// per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if the CA certificate cannot be parsed or
    /// the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let timeout = config.request_timeout();
        let mut builder = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .danger_accept_invalid_certs(config.insecure_skip_verify);

        if let Some(pem) = &config.ca_cert {
            if !pem.contains("-----BEGIN CERTIFICATE-----") {
                return Err(ClientError::Config(
                    "invalid CA certificate: no PEM certificate block found".to_string(),
                ));
            }
            let cert = reqwest::Certificate::from_pem(pem.as_bytes())
                .map_err(|e| ClientError::Config(format!("invalid CA certificate: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder
            .build()
            .map_err(|e| ClientError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client, timeout })
    }

    /// Create a transport with a custom reqwest client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl Transport for HttpsTransport {
    async fn perform(
        &self,
        request: ApiRequest,
    ) -> std::result::Result<ApiResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| self.classify(&e))?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| self.classify(&e))?;

        Ok(ApiResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}

impl HttpsTransport {
    fn classify(&self, e: &reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Request(e.to_string())
        }
    }
}
