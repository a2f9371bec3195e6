//! Builder pattern for constructing an [`InferenceClient`].

use std::sync::Arc;
use std::time::Duration;

use jota_db::ConversationStore;
use jota_domain::config::InferenceConfig;

use crate::backoff::ReconnectBackoff;
use crate::client::InferenceClient;
use crate::error::InferenceError;
use crate::supervisor::ConnectSettings;

/// Fluent builder for [`InferenceClient`].
///
/// # Example
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use jota_inference::InferenceClientBuilder;
/// # fn store() -> Arc<dyn jota_db::ConversationStore> { unimplemented!() }
/// let client = InferenceClientBuilder::new()
///     .url("ws://localhost:9001")
///     .client_id("jota")
///     .api_key("secret")
///     .store(store())
///     .build()
///     .unwrap();
/// ```
pub struct InferenceClientBuilder {
    url: String,
    client_id: String,
    api_key: String,
    jota_db_url: Option<String>,
    ssl_verify: bool,
    backoff: ReconnectBackoff,
    auth_timeout: Duration,
    session_create_timeout: Duration,
    stream_idle_timeout: Duration,
    store: Option<Arc<dyn ConversationStore>>,
}

impl InferenceClientBuilder {
    pub fn new() -> Self {
        Self {
            url: "ws://localhost:9001".into(),
            client_id: String::new(),
            api_key: String::new(),
            jota_db_url: None,
            ssl_verify: true,
            backoff: ReconnectBackoff::default(),
            auth_timeout: Duration::from_secs(10),
            session_create_timeout: Duration::from_secs(5),
            stream_idle_timeout: Duration::from_secs(30),
            store: None,
        }
    }

    // ── Required ─────────────────────────────────────────────────────

    /// Engine endpoint (e.g. `wss://engine.example.com:9001`).
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Conversation store used for journaling assistant responses.
    pub fn store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    // ── Credentials ──────────────────────────────────────────────────

    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = id.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = key.into();
        self
    }

    /// JotaDB endpoint forwarded to the engine in the auth frame, so the
    /// engine can journal on its own side.
    pub fn jota_db_url(mut self, url: impl Into<String>) -> Self {
        self.jota_db_url = Some(url.into());
        self
    }

    /// Apply endpoint and credentials from the shared [`InferenceConfig`].
    pub fn config(mut self, cfg: &InferenceConfig) -> Self {
        self.url = cfg.url.clone();
        self.client_id = cfg.client_id.clone();
        self.api_key = cfg.api_key.clone();
        self.ssl_verify = cfg.ssl_verify;
        self
    }

    // ── Behavior ─────────────────────────────────────────────────────

    /// Verify the server certificate on `wss://` endpoints (default true).
    pub fn ssl_verify(mut self, verify: bool) -> Self {
        self.ssl_verify = verify;
        self
    }

    /// Override the reconnect back-off policy.
    pub fn reconnect_backoff(mut self, backoff: ReconnectBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Override the auth handshake deadline (default 10 s).
    pub fn auth_timeout(mut self, d: Duration) -> Self {
        self.auth_timeout = d;
        self
    }

    /// Override the `create_session` deadline (default 5 s).
    pub fn session_create_timeout(mut self, d: Duration) -> Self {
        self.session_create_timeout = d;
        self
    }

    /// Override the per-frame inactivity deadline during `infer`
    /// (default 30 s).
    pub fn stream_idle_timeout(mut self, d: Duration) -> Self {
        self.stream_idle_timeout = d;
        self
    }

    /// Build the [`InferenceClient`].
    pub fn build(self) -> Result<InferenceClient, InferenceError> {
        if self.url.is_empty() {
            return Err(InferenceError::Config("url is required".into()));
        }
        let store = self
            .store
            .ok_or_else(|| InferenceError::Config("conversation store is required".into()))?;

        let settings = ConnectSettings {
            url: self.url,
            client_id: self.client_id,
            api_key: self.api_key,
            jota_db_url: self.jota_db_url,
            ssl_verify: self.ssl_verify,
            backoff: self.backoff,
            auth_timeout: self.auth_timeout,
        };

        Ok(InferenceClient::from_parts(
            store,
            settings,
            self.session_create_timeout,
            self.stream_idle_timeout,
        ))
    }
}

impl Default for InferenceClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
