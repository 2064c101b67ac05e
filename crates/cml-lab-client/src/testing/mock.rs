//! Scripted transport.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Method, StatusCode};

use crate::transport::{ApiRequest, ApiResponse, Transport, TransportError};

#[derive(Clone)]
enum Reply {
    Response(ApiResponse),
    Error(TransportError),
}

struct Route {
    method: Method,
    path: String,
    replies: VecDeque<Reply>,
}

/// A transport answering from a script of `(method, path) → reply` routes.
///
/// Replies registered for the same route are returned in order; the last
/// one repeats. Unscripted requests get a controller-style 404. Every
/// request is journaled.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<Vec<Route>>,
    journal: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
    /// Create an empty mock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock whose `/system_information` reports `version` and ready.
    #[must_use]
    pub fn with_controller(version: &str) -> Self {
        let mock = Self::new();
        mock.on(
            Method::GET,
            "/system_information",
            200,
            serde_json::json!({"version": version, "ready": true}),
        );
        mock
    }

    /// Script a JSON reply. `path` is relative to `/api/v0`, without query.
    ///
    /// # Panics
    ///
    /// Panics if `status` is not a valid HTTP status code.
    pub fn on(&self, method: Method, path: &str, status: u16, body: serde_json::Value) -> &Self {
        let status = StatusCode::from_u16(status).expect("valid status code");
        let response = if status == StatusCode::NO_CONTENT {
            ApiResponse::new(status, Vec::new())
        } else {
            ApiResponse::json(status, &body)
        };
        self.push(method, path, Reply::Response(response))
    }

    /// Script a raw reply.
    pub fn on_response(&self, method: Method, path: &str, response: ApiResponse) -> &Self {
        self.push(method, path, Reply::Response(response))
    }

    /// Script a transport failure.
    pub fn on_error(&self, method: Method, path: &str, error: TransportError) -> &Self {
        self.push(method, path, Reply::Error(error))
    }

    /// Drop every reply scripted for a route.
    pub fn clear(&self, method: &Method, path: &str) {
        self.routes
            .lock()
            .retain(|r| !(r.method == *method && r.path == path));
    }

    fn push(&self, method: Method, path: &str, reply: Reply) -> &Self {
        let mut routes = self.routes.lock();
        if let Some(route) = routes
            .iter_mut()
            .find(|r| r.method == method && r.path == path)
        {
            route.replies.push_back(reply);
        } else {
            routes.push(Route {
                method,
                path: path.to_string(),
                replies: VecDeque::from([reply]),
            });
        }
        self
    }

    /// All requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.journal.lock().clone()
    }

    /// Number of requests received for a route.
    #[must_use]
    pub fn count(&self, method: &Method, path: &str) -> usize {
        self.journal
            .lock()
            .iter()
            .filter(|r| r.method == *method && r.api_path() == path)
            .count()
    }

    /// The most recent request received for a route.
    #[must_use]
    pub fn last_request(&self, method: &Method, path: &str) -> Option<ApiRequest> {
        self.journal
            .lock()
            .iter()
            .rev()
            .find(|r| r.method == *method && r.api_path() == path)
            .cloned()
    }

    fn next_reply(&self, request: &ApiRequest) -> Reply {
        let path = request.api_path();
        let mut routes = self.routes.lock();
        let route = routes
            .iter_mut()
            .find(|r| r.method == request.method && r.path == path);

        match route {
            Some(route) if route.replies.len() > 1 => route
                .replies
                .pop_front()
                .unwrap_or_else(|| not_found(&request.method, path)),
            Some(route) => route
                .replies
                .front()
                .cloned()
                .unwrap_or_else(|| not_found(&request.method, path)),
            None => not_found(&request.method, path),
        }
    }
}

fn not_found(method: &Method, path: &str) -> Reply {
    Reply::Response(ApiResponse::json(
        StatusCode::NOT_FOUND,
        &serde_json::json!({
            "code": 404,
            "description": format!("no route for {method} {path}"),
        }),
    ))
}

#[async_trait]
impl Transport for MockTransport {
    async fn perform(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let reply = self.next_reply(&request);
        self.journal.lock().push(request);
        match reply {
            Reply::Response(response) => Ok(response),
            Reply::Error(error) => Err(error),
        }
    }
}
