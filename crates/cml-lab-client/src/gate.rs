//! Auth & version gate state.
//!
//! Holds the sticky flags that decide whether a business API call may go
//! out: whether the controller version has been confirmed, which bearer
//! token to attach, and any sticky failure. The request flow that drives
//! these transitions lives in [`crate::rpc`].
//!
//! ```text
//!   [init] --ok-->  [version-ok, unauth]
//!   [init] --fail-> [incompatible]                (terminal)
//!   [version-ok, unauth] --login-ok-->  [ready]
//!   [version-ok, unauth] --login-fail-> [version-ok, unauth] (sticky error)
//!   [ready] --401-> [version-ok, unauth]          (token discarded, one retry)
//! ```

use parking_lot::RwLock;

use crate::error::ClientError;

/// Result of the one-time version check.
#[derive(Debug, Clone)]
pub(crate) enum VersionState {
    Unchecked,
    Compatible,
    Incompatible(ClientError),
}

/// Username/password pair for `/authenticate`.
#[derive(Clone)]
pub(crate) struct Credentials {
    pub(crate) username: String,
    pub(crate) password: String,
}

struct TokenState {
    token: Option<String>,
    credentials: Option<Credentials>,
    failure: Option<ClientError>,
    generation: u64,
}

/// Snapshot of the token state taken before sending a request.
#[derive(Debug, Clone)]
pub(crate) struct TokenTicket {
    pub(crate) token: Option<String>,
    pub(crate) generation: u64,
    pub(crate) has_credentials: bool,
}

/// Process-wide auth state for one client instance.
pub(crate) struct AuthGate {
    pub(crate) version: tokio::sync::Mutex<VersionState>,
    pub(crate) refresh: tokio::sync::Mutex<()>,
    state: RwLock<TokenState>,
}

impl AuthGate {
    pub(crate) fn new(token: Option<String>, credentials: Option<Credentials>) -> Self {
        Self {
            version: tokio::sync::Mutex::new(VersionState::Unchecked),
            refresh: tokio::sync::Mutex::new(()),
            state: RwLock::new(TokenState {
                token,
                credentials,
                failure: None,
                generation: 0,
            }),
        }
    }

    /// Take a ticket for the next request, or the sticky auth failure.
    pub(crate) fn ticket(&self) -> Result<TokenTicket, ClientError> {
        let state = self.state.read();
        if let Some(failure) = &state.failure {
            return Err(failure.clone());
        }
        Ok(TokenTicket {
            token: state.token.clone(),
            generation: state.generation,
            has_credentials: state.credentials.is_some(),
        })
    }

    pub(crate) fn generation(&self) -> u64 {
        self.state.read().generation
    }

    pub(crate) fn credentials(&self) -> Option<Credentials> {
        self.state.read().credentials.clone()
    }

    pub(crate) fn sticky_failure(&self) -> Option<ClientError> {
        self.state.read().failure.clone()
    }

    /// Store a freshly obtained token and clear any sticky failure.
    pub(crate) fn install_token(&self, token: String) {
        let mut state = self.state.write();
        state.token = Some(token);
        state.failure = None;
        state.generation += 1;
    }

    /// Discard the current token and remember why.
    pub(crate) fn fail(&self, error: ClientError) {
        let mut state = self.state.write();
        state.token = None;
        state.failure = Some(error);
        state.generation += 1;
    }

    /// Replace the token, clearing sticky auth failures.
    pub(crate) fn set_token(&self, token: String) {
        self.install_token(token);
    }

    /// Replace the credentials and drop the current token, clearing sticky
    /// auth failures.
    pub(crate) fn set_credentials(&self, credentials: Credentials) {
        let mut state = self.state.write();
        state.credentials = Some(credentials);
        state.token = None;
        state.failure = None;
        state.generation += 1;
    }

    pub(crate) fn token(&self) -> Option<String> {
        self.state.read().token.clone()
    }
}
