//! JSON RPC layer and the request flow through the auth & version gate.
//!
//! Every business call goes through [`Client::send`]:
//!
//! 1. the version gate runs once per client (sticky on incompatibility);
//! 2. the cached token is attached, refreshed first if its JWT expired;
//! 3. a 401 triggers at most one re-authentication and one retry.
//!
//! Re-authentication is serialized on the gate's refresh mutex. A request
//! that loses the race finds the token generation changed and simply
//! retries with the new token.

use chrono::Utc;
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::client::Client;
use crate::error::{ClientError, Result};
use crate::gate::VersionState;
use crate::token;
use crate::transport::{ApiRequest, ApiResponse};
use crate::version::{check_version, SystemInformation};

const JSON: &str = "application/json";

/// A serialized request body with its content type.
#[derive(Debug, Clone)]
pub(crate) struct Payload {
    bytes: Vec<u8>,
    content_type: &'static str,
}

impl Payload {
    pub(crate) fn json<B: Serialize + ?Sized>(path: &str, body: &B) -> Result<Self> {
        let bytes = serde_json::to_vec(body).map_err(|e| {
            ClientError::InvalidRequest(format!("failed to encode body for {path}: {e}"))
        })?;
        Ok(Self {
            bytes,
            content_type: JSON,
        })
    }

    pub(crate) fn raw(bytes: impl Into<Vec<u8>>, content_type: &'static str) -> Self {
        Self {
            bytes: bytes.into(),
            content_type,
        }
    }
}

impl Client {
    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.inner.api_base, path.trim_start_matches('/'))
    }

    fn compose(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        payload: Option<&Payload>,
    ) -> Result<ApiRequest> {
        let mut request = ApiRequest::new(method, self.url(path));
        request
            .headers
            .insert(ACCEPT, HeaderValue::from_static(JSON));

        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                ClientError::Config("token contains characters not allowed in a header".into())
            })?;
            request.headers.insert(AUTHORIZATION, value);
        }

        if let Some(payload) = payload {
            request
                .headers
                .insert(CONTENT_TYPE, HeaderValue::from_static(payload.content_type));
            request.body = Some(payload.bytes.clone());
        }

        Ok(request)
    }

    async fn perform(&self, request: ApiRequest) -> Result<ApiResponse> {
        let method = request.method.clone();
        let path = request.api_path().to_string();

        let result = self
            .cancellable(async {
                self.inner
                    .transport
                    .perform(request)
                    .await
                    .map_err(ClientError::from)
            })
            .await;

        match &result {
            Ok(response) => tracing::debug!(
                %method,
                path = %path,
                status = response.status.as_u16(),
                "Controller request"
            ),
            Err(e) => tracing::debug!(%method, path = %path, error = %e, "Controller request failed"),
        }
        result
    }

    pub(crate) async fn fetch_system_information(&self) -> Result<SystemInformation> {
        let path = "system_information";
        let request = self.compose(Method::GET, path, None, None)?;
        let response = self.perform(request).await?;
        decode(path, classify(path, response)?)
    }

    /// Run the one-time version check.
    pub(crate) async fn ensure_version(&self) -> Result<()> {
        let mut state = self
            .cancellable(async { Ok(self.inner.gate.version.lock().await) })
            .await?;

        match &*state {
            VersionState::Compatible => return Ok(()),
            VersionState::Incompatible(e) => return Err(e.clone()),
            VersionState::Unchecked => {}
        }

        let info = self.fetch_system_information().await?;
        match check_version(&info.version) {
            Ok(compat) if compat.development => {
                tracing::warn!(version = %info.version, "Controller runs a development build");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(version = %info.version, "Controller version not supported");
                *state = VersionState::Incompatible(e.clone());
                return Err(e);
            }
        }

        if !info.ready {
            return Err(ClientError::SystemNotReady);
        }

        tracing::info!(version = %info.version, "Controller version accepted");
        *state = VersionState::Compatible;
        Ok(())
    }

    /// Exchange the credentials for a new token.
    ///
    /// `seen_generation` is the token generation the caller used. If it has
    /// moved on, another request refreshed (or failed) in the meantime and
    /// no second `/authenticate` is issued.
    async fn reauthenticate(&self, seen_generation: u64) -> Result<()> {
        let gate = &self.inner.gate;
        let _guard = self
            .cancellable(async { Ok(gate.refresh.lock().await) })
            .await?;

        if gate.generation() != seen_generation {
            return gate.sticky_failure().map_or(Ok(()), Err);
        }

        let Some(credentials) = gate.credentials() else {
            gate.fail(ClientError::InvalidTokenNoCredentials);
            return Err(ClientError::InvalidTokenNoCredentials);
        };

        let path = "authenticate";
        let body = serde_json::json!({
            "username": credentials.username,
            "password": credentials.password,
        });
        let payload = Payload::json(path, &body)?;
        let request = self.compose(Method::POST, path, None, Some(&payload))?;
        let response = self.perform(request).await?;

        match response.status {
            status if status.is_success() => {
                let token: String = decode(path, Some(response.body))?;
                gate.install_token(token);
                tracing::info!(username = %credentials.username, "Authenticated to controller");
                Ok(())
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let err = ClientError::Unauthorized(format!(
                    "authentication as {} failed: {}",
                    credentials.username,
                    error_message(&response)
                ));
                gate.fail(err.clone());
                Err(err)
            }
            _ => Err(status_error(path, &response)),
        }
    }

    /// Send a request through the gate and return the raw success body.
    ///
    /// `None` means the controller answered 204 or with an empty body.
    pub(crate) async fn send(
        &self,
        method: Method,
        path: &str,
        payload: Option<Payload>,
    ) -> Result<Option<Vec<u8>>> {
        self.ensure_version().await?;

        let mut reauthenticated = false;
        let mut refreshed_expired = false;
        loop {
            let ticket = self.inner.gate.ticket()?;

            if !refreshed_expired && ticket.has_credentials {
                if let Some(current) = &ticket.token {
                    if token::is_expired(current, Utc::now()) {
                        tracing::warn!("Cached token expired, re-authenticating");
                        refreshed_expired = true;
                        self.reauthenticate(ticket.generation).await?;
                        continue;
                    }
                }
            }

            let request =
                self.compose(method.clone(), path, ticket.token.as_deref(), payload.as_ref())?;
            let response = self.perform(request).await?;

            if response.status != StatusCode::UNAUTHORIZED {
                return classify(path, response);
            }

            if reauthenticated {
                return Err(ClientError::Unauthorized(error_message(&response)));
            }

            if !ticket.has_credentials {
                tracing::warn!("Token rejected and no credentials configured");
                self.inner.gate.fail(ClientError::InvalidTokenNoCredentials);
                return Err(ClientError::InvalidTokenNoCredentials);
            }

            tracing::debug!(path = %path, "Received 401, re-authenticating");
            self.reauthenticate(ticket.generation).await?;
            reauthenticated = true;
        }
    }

    /// `GET` and decode.
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let body = self.send(Method::GET, path, None).await?;
        decode(path, body)
    }

    /// `POST` a JSON body and decode the answer.
    pub(crate) async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = Payload::json(path, body)?;
        let body = self.send(Method::POST, path, Some(payload)).await?;
        decode(path, body)
    }

    /// `POST` a raw body and decode the answer.
    pub(crate) async fn post_raw<T: DeserializeOwned>(
        &self,
        path: &str,
        payload: Payload,
    ) -> Result<T> {
        let body = self.send(Method::POST, path, Some(payload)).await?;
        decode(path, body)
    }

    /// `PATCH` a JSON body, ignoring any answer.
    pub(crate) async fn patch_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        let payload = Payload::json(path, body)?;
        self.send(Method::PATCH, path, Some(payload)).await?;
        Ok(())
    }

    /// `PUT` without a body, ignoring any answer.
    pub(crate) async fn put(&self, path: &str) -> Result<()> {
        self.send(Method::PUT, path, None).await?;
        Ok(())
    }

    /// `DELETE`, ignoring any answer.
    pub(crate) async fn delete(&self, path: &str) -> Result<()> {
        self.send(Method::DELETE, path, None).await?;
        Ok(())
    }
}

/// Map a response to its success body or a typed error.
pub(crate) fn classify(path: &str, response: ApiResponse) -> Result<Option<Vec<u8>>> {
    if response.status == StatusCode::NO_CONTENT {
        return Ok(None);
    }
    if response.status.is_success() {
        return Ok((!response.body.is_empty()).then_some(response.body));
    }
    Err(status_error(path, &response))
}

fn status_error(path: &str, response: &ApiResponse) -> ClientError {
    let path = format!("/{}", path.trim_start_matches('/'));
    let message = error_message(response);
    match response.status.as_u16() {
        401 => ClientError::Unauthorized(message),
        404 => ClientError::NotFound { path, message },
        409 => ClientError::Conflict { path, message },
        status @ 500..=599 => ClientError::Server {
            status,
            path,
            message,
        },
        status => ClientError::Api {
            status,
            path,
            message,
        },
    }
}

/// Extract the controller's message from an error body.
///
/// The controller answers errors with `{"code": .., "description": ..}`;
/// anything else is passed through as text.
fn error_message(response: &ApiResponse) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&response.body) {
        for key in ["description", "message", "detail"] {
            if let Some(text) = value.get(key).and_then(serde_json::Value::as_str) {
                return text.to_string();
            }
        }
        if let Some(text) = value.as_str() {
            return text.to_string();
        }
    }
    response.text().trim().to_string()
}

/// Decode a success body.
pub(crate) fn decode<T: DeserializeOwned>(path: &str, body: Option<Vec<u8>>) -> Result<T> {
    let path = format!("/{}", path.trim_start_matches('/'));
    let Some(body) = body else {
        return Err(ClientError::MalformedResponse {
            path,
            reason: "empty response body".to_string(),
        });
    };
    serde_json::from_slice(&body).map_err(|e| ClientError::MalformedResponse {
        path,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::testing::MockTransport;
    use serde_json::json;
    use std::sync::Arc;

    fn client(mock: &Arc<MockTransport>, config: ClientConfig) -> Client {
        Client::with_transport(config, mock.clone()).unwrap()
    }

    #[test]
    fn classify_statuses() {
        let ok = ApiResponse::json(StatusCode::OK, &json!({"a": 1}));
        assert!(classify("labs", ok).unwrap().is_some());

        let none = ApiResponse::new(StatusCode::NO_CONTENT, Vec::new());
        assert!(classify("labs", none).unwrap().is_none());

        let missing = ApiResponse::json(
            StatusCode::NOT_FOUND,
            &json!({"code": 404, "description": "Lab not found: abc"}),
        );
        let err = classify("labs/abc", missing).unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("Lab not found: abc"));
        assert!(err.to_string().contains("/labs/abc"));

        let conflict = ApiResponse::new(StatusCode::CONFLICT, "busy");
        assert_eq!(classify("x", conflict).unwrap_err().label(), "conflict");

        let bad = ApiResponse::new(StatusCode::BAD_REQUEST, "nope");
        let err = classify("x", bad).unwrap_err();
        assert_eq!(err.http_status_code(), Some(400));
        assert!(!err.is_retriable());

        let down = ApiResponse::new(StatusCode::BAD_GATEWAY, "");
        let err = classify("x", down).unwrap_err();
        assert_eq!(err.label(), "server-error");
        assert!(err.is_retriable());
    }

    #[test]
    fn decode_failures_are_malformed() {
        let err = decode::<Vec<String>>("labs", Some(b"{".to_vec())).unwrap_err();
        assert_eq!(err.label(), "malformed-response");
        let err = decode::<Vec<String>>("labs", None).unwrap_err();
        assert_eq!(err.label(), "malformed-response");
    }

    #[tokio::test]
    async fn headers_are_set() {
        let mock = Arc::new(MockTransport::with_controller("2.4.0"));
        mock.on(Method::POST, "/labs", 200, json!({"id": "lab1"}));
        let client = client(&mock, ClientConfig::with_token("https://cml", "tok"));

        let _: serde_json::Value = client
            .post_json("labs", &json!({"title": "x"}))
            .await
            .unwrap();

        let sent = mock.last_request(&Method::POST, "/labs").unwrap();
        assert_eq!(sent.url, "https://cml/api/v0/labs");
        assert_eq!(sent.bearer_token(), Some("tok"));
        assert_eq!(sent.headers.get(ACCEPT).unwrap(), JSON);
        assert_eq!(sent.headers.get(CONTENT_TYPE).unwrap(), JSON);

        let info = mock.last_request(&Method::GET, "/system_information").unwrap();
        assert!(info.bearer_token().is_none());
        assert!(info.headers.get(CONTENT_TYPE).is_none());
    }

    #[tokio::test]
    async fn version_checked_once() {
        let mock = Arc::new(MockTransport::with_controller("2.3.1"));
        mock.on(Method::GET, "/labs", 200, json!([]));
        let client = client(&mock, ClientConfig::with_token("https://cml", "tok"));

        for _ in 0..3 {
            let labs: Vec<String> = client.get_json("labs").await.unwrap();
            assert!(labs.is_empty());
        }
        assert_eq!(mock.count(&Method::GET, "/system_information"), 1);
        assert_eq!(mock.count(&Method::GET, "/labs"), 3);
    }

    #[tokio::test]
    async fn incompatible_version_is_sticky() {
        let mock = Arc::new(MockTransport::with_controller("2.5.1"));
        let client = client(&mock, ClientConfig::with_token("https://cml", "tok"));

        for _ in 0..2 {
            let err = client.get_json::<Vec<String>>("labs").await.unwrap_err();
            assert_eq!(err.label(), "incompatible-controller");
            assert!(err.to_string().contains("want >=2.3.0,<2.5.0, got 2.5.1"));
        }
        client.set_token("other");
        let err = client.get_json::<Vec<String>>("labs").await.unwrap_err();
        assert_eq!(err.label(), "incompatible-controller");

        assert_eq!(mock.count(&Method::GET, "/system_information"), 1);
        assert_eq!(mock.count(&Method::GET, "/labs"), 0);
    }

    #[tokio::test]
    async fn version_check_retried_after_transient_failure() {
        let mock = Arc::new(MockTransport::new());
        mock.on(Method::GET, "/system_information", 503, json!({"description": "starting"}));
        mock.on(
            Method::GET,
            "/system_information",
            200,
            json!({"version": "2.4.0", "ready": true}),
        );
        mock.on(Method::GET, "/labs", 200, json!([]));
        let client = client(&mock, ClientConfig::with_token("https://cml", "tok"));

        let err = client.get_json::<Vec<String>>("labs").await.unwrap_err();
        assert_eq!(err.label(), "server-error");
        assert!(client.get_json::<Vec<String>>("labs").await.is_ok());
    }

    #[tokio::test]
    async fn not_ready_controller() {
        let mock = Arc::new(MockTransport::new());
        mock.on(
            Method::GET,
            "/system_information",
            200,
            json!({"version": "2.4.0", "ready": false}),
        );
        let client = client(&mock, ClientConfig::with_token("https://cml", "tok"));
        let err = client.get_json::<Vec<String>>("labs").await.unwrap_err();
        assert_eq!(err.label(), "system-not-ready");
    }

    #[tokio::test]
    async fn rejected_token_without_credentials_is_sticky() {
        let mock = Arc::new(MockTransport::with_controller("2.4.0"));
        mock.on(Method::GET, "/labs", 401, json!({"description": "invalid token"}));
        let client = client(&mock, ClientConfig::with_token("https://cml", "stale"));

        let err = client.get_json::<Vec<String>>("labs").await.unwrap_err();
        assert_eq!(err.label(), "invalid-token-no-credentials");
        let err = client.get_json::<Vec<String>>("labs").await.unwrap_err();
        assert_eq!(err.label(), "invalid-token-no-credentials");
        assert_eq!(mock.count(&Method::GET, "/labs"), 1);
    }

    #[tokio::test]
    async fn reauthenticates_once_on_401() {
        let mock = Arc::new(MockTransport::with_controller("2.4.0"));
        mock.on(Method::GET, "/labs", 401, json!({"description": "No authorization token provided."}));
        mock.on(Method::GET, "/labs", 200, json!(["lab1"]));
        mock.on(Method::POST, "/authenticate", 200, json!("secret"));
        let client = client(&mock, ClientConfig::with_credentials("https://cml", "qwe", "qwe"));

        let labs: Vec<String> = client.get_json("labs").await.unwrap();
        assert_eq!(labs, vec!["lab1".to_string()]);
        assert_eq!(client.token().as_deref(), Some("secret"));

        let auth = mock.last_request(&Method::POST, "/authenticate").unwrap();
        let body: serde_json::Value = serde_json::from_slice(auth.body.as_ref().unwrap()).unwrap();
        assert_eq!(body, json!({"username": "qwe", "password": "qwe"}));

        let retried = mock.last_request(&Method::GET, "/labs").unwrap();
        assert_eq!(retried.bearer_token(), Some("secret"));
    }

    #[tokio::test]
    async fn failed_login_is_sticky_until_credentials_reset() {
        let mock = Arc::new(MockTransport::with_controller("2.4.0"));
        mock.on(Method::GET, "/labs", 401, json!({"description": "no token"}));
        mock.on(Method::POST, "/authenticate", 403, json!({"description": "Authentication failed!"}));
        let client = client(&mock, ClientConfig::with_credentials("https://cml", "qwe", "wrong"));

        let err = client.get_json::<Vec<String>>("labs").await.unwrap_err();
        assert_eq!(err.label(), "unauthorized");
        let err = client.get_json::<Vec<String>>("labs").await.unwrap_err();
        assert_eq!(err.label(), "unauthorized");
        assert_eq!(mock.count(&Method::POST, "/authenticate"), 1);

        mock.clear(&Method::POST, "/authenticate");
        mock.clear(&Method::GET, "/labs");
        mock.on(Method::POST, "/authenticate", 200, json!("secret"));
        mock.on(Method::GET, "/labs", 401, json!({"description": "no token"}));
        mock.on(Method::GET, "/labs", 200, json!([]));
        client.set_credentials("qwe", "qwe");
        assert!(client.get_json::<Vec<String>>("labs").await.is_ok());
        assert_eq!(client.token().as_deref(), Some("secret"));
    }

    #[tokio::test]
    async fn cancelled_client_returns_cancelled() {
        let mock = Arc::new(MockTransport::with_controller("2.4.0"));
        let client = client(&mock, ClientConfig::with_token("https://cml", "tok"));
        let cancel = tokio_util::sync::CancellationToken::new();
        cancel.cancel();
        let err = client
            .with_cancellation(cancel)
            .get_json::<Vec<String>>("labs")
            .await
            .unwrap_err();
        assert_eq!(err.label(), "cancelled");
        assert!(mock.requests().is_empty());
    }

    #[test]
    fn error_message_fallbacks() {
        let resp = ApiResponse::new(StatusCode::BAD_REQUEST, "  plain text \n");
        assert_eq!(error_message(&resp), "plain text");
        let resp = ApiResponse::json(StatusCode::BAD_REQUEST, &json!("just a string"));
        assert_eq!(error_message(&resp), "just a string");
    }
}
