use std::sync::{Arc, RwLock};

use anyhow::Result;
use gateway_core::observability::TracedClientExt;
use tokio::sync::watch;

use crate::config::BackendApiSettings;
use crate::models::session::SessionData;

/// Broadcast raised when the backend stops accepting the session credential.
///
/// Consumers must treat an observation as "invalidate the session now",
/// typically by forcing sign-out and redirecting to the sign-in page. Any
/// component may raise it.
#[derive(Clone)]
pub struct SessionErrorSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl SessionErrorSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn raise(&self) {
        let _ = self.tx.send(true);
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for SessionErrorSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared client for the property REST backend.
///
/// Every call carries the session's bearer token. The token is mirrored into
/// a local slot here so call sites that never see the session still send an
/// authenticated request.
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
    bearer: RwLock<Option<String>>,
    session_error: SessionErrorSignal,
}

impl BackendClient {
    pub fn new(settings: BackendApiSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: settings.url.trim_end_matches('/').to_string(),
            bearer: RwLock::new(None),
            session_error: SessionErrorSignal::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session_error(&self) -> &SessionErrorSignal {
        &self.session_error
    }

    /// Adopt the session's credential when it differs from the one held.
    pub fn apply_session(&self, session: &SessionData) {
        let mut bearer = match self.bearer.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if bearer.as_deref() != session.access_token.as_deref() {
            *bearer = session.access_token.clone();
        }
    }

    pub fn current_bearer(&self) -> Option<String> {
        match self.bearer.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Send an authenticated GET with trace context propagation.
    pub async fn get(&self, path: &str) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);

        let mut request = self.client.traced_get(&url);
        if let Some(token) = self.current_bearer() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!("Failed to send GET request to {}: {}", url, e);
            anyhow::anyhow!("HTTP request failed: {}", e)
        })?;

        self.observe_auth_failure(&response);
        Ok(response)
    }

    /// Send an authenticated POST with trace context propagation.
    pub async fn post(&self, path: &str, body: serde_json::Value) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);

        let mut request = self.client.traced_post(&url).json(&body);
        if let Some(token) = self.current_bearer() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!("Failed to send POST request to {}: {}", url, e);
            anyhow::anyhow!("HTTP request failed: {}", e)
        })?;

        self.observe_auth_failure(&response);
        Ok(response)
    }

    // No retry here: the signal's consumers decide how to recover.
    fn observe_auth_failure(&self, response: &reqwest::Response) {
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            tracing::warn!("backend rejected the bearer token");
            self.session_error.raise();
        }
    }
}
