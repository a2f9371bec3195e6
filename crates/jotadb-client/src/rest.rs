//! REST implementation of [`ConversationStore`].
//!
//! `RestJotaDbClient` wraps a `reqwest::Client` and translates every trait
//! method into the corresponding HTTP call against the JotaDB API, with
//! automatic retry + exponential back-off on transient (5xx / timeout)
//! failures.

use std::time::Duration;

use async_trait::async_trait;
use jota_domain::config::JotaDbConfig;
use jota_domain::error::{Error, Result};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use uuid::Uuid;

use crate::provider::ConversationStore;
use crate::types::{
    Conversation, ConversationPatch, ConversationRequest, MessageRequest, Role,
    ValidateKeyRequest, ValidateKeyResponse,
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A REST-based client for JotaDB.
///
/// Created once and reused for the lifetime of the process. The underlying
/// `reqwest::Client` maintains a connection pool.
#[derive(Debug, Clone)]
pub struct RestJotaDbClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    max_retries: u32,
}

impl RestJotaDbClient {
    /// Build a new client from the shared [`JotaDbConfig`].
    pub fn new(cfg: &JotaDbConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_owned(),
            api_key: cfg.api_key.clone(),
            max_retries: cfg.max_retries,
        })
    }

    // ── request helpers ──────────────────────────────────────────────

    fn decorate(&self, rb: RequestBuilder) -> RequestBuilder {
        let trace_id = Uuid::new_v4().to_string();
        let mut rb = rb
            .header("X-Client-Type", "jota-orchestrator")
            .header("X-Trace-Id", &trace_id);

        if let Some(ref key) = self.api_key {
            rb = rb.header("X-Api-Key", key);
        }
        rb
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn parse_json<T: serde::de::DeserializeOwned>(
        endpoint: &str,
        resp: Response,
    ) -> Result<T> {
        let body = resp.text().await.map_err(from_reqwest)?;
        serde_json::from_str(&body)
            .map_err(|e| Error::Store(format!("failed to parse {endpoint} response: {e}: {body}")))
    }

    // ── retry engine ─────────────────────────────────────────────────

    /// Execute a request with retry + exponential back-off on transient errors.
    ///
    /// * Retries on 5xx status codes and on timeouts.
    /// * Does **not** retry on 4xx (client errors are permanent).
    async fn execute_with_retry(
        &self,
        endpoint: &str,
        build_request: impl Fn() -> RequestBuilder,
    ) -> Result<Response> {
        let mut last_err: Option<Error> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = Duration::from_millis(100 * 2u64.pow(attempt - 1));
                tokio::time::sleep(backoff).await;
            }

            let rb = self.decorate(build_request());
            match rb.send().await {
                Ok(resp) => {
                    let status = resp.status().as_u16();

                    if resp.status().is_server_error() {
                        // 5xx — transient, retry
                        let body = resp.text().await.unwrap_or_default();
                        last_err = Some(Error::Store(format!(
                            "{endpoint} returned {status}: {body}"
                        )));
                        continue;
                    }

                    if resp.status().is_client_error() {
                        // 4xx — permanent, do NOT retry
                        let resp_status = resp.status();
                        let body = resp.text().await.unwrap_or_default();
                        if resp_status == StatusCode::UNAUTHORIZED
                            || resp_status == StatusCode::FORBIDDEN
                        {
                            return Err(Error::Auth(format!(
                                "{endpoint} auth failed ({status}): {body}"
                            )));
                        }
                        return Err(Error::Store(format!(
                            "{endpoint} returned {status}: {body}"
                        )));
                    }

                    return Ok(resp);
                }
                Err(e) => {
                    // Timeouts and connection errors are transient — retry
                    last_err = Some(from_reqwest(e));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| Error::Store(format!("{endpoint}: all retries exhausted"))))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
impl ConversationStore for RestJotaDbClient {
    async fn validate_client_key(&self, api_key: &str) -> Result<bool> {
        let url = self.url("/api/clients/validate");
        let req = ValidateKeyRequest {
            api_key: api_key.to_owned(),
        };
        let resp = self
            .execute_with_retry("POST /api/clients/validate", || {
                self.http.post(&url).json(&req)
            })
            .await?;

        let body: ValidateKeyResponse =
            Self::parse_json("POST /api/clients/validate", resp).await?;
        Ok(body.valid)
    }

    async fn get_or_create_conversation(&self, client_ref: &str) -> Result<Conversation> {
        let url = self.url("/api/conversations");
        let req = ConversationRequest {
            client_ref: client_ref.to_owned(),
        };
        let resp = self
            .execute_with_retry("POST /api/conversations", || {
                self.http.post(&url).json(&req)
            })
            .await?;

        Self::parse_json("POST /api/conversations", resp).await
    }

    async fn update_conversation_session(
        &self,
        conversation_id: &str,
        session_id: &str,
    ) -> Result<()> {
        let url = self.url(&format!("/api/conversations/{conversation_id}"));
        let patch = ConversationPatch {
            inference_session_id: Some(session_id.to_owned()),
            status: None,
        };
        self.execute_with_retry(&format!("PATCH /api/conversations/{conversation_id}"), || {
            self.http.patch(&url).json(&patch)
        })
        .await?;
        Ok(())
    }

    async fn save_message(&self, conversation_id: &str, role: Role, content: &str) -> Result<()> {
        let url = self.url(&format!("/api/conversations/{conversation_id}/messages"));
        let req = MessageRequest {
            role,
            content: content.to_owned(),
        };
        self.execute_with_retry(
            &format!("POST /api/conversations/{conversation_id}/messages"),
            || self.http.post(&url).json(&req),
        )
        .await?;
        Ok(())
    }

    async fn mark_conversation_error(&self, conversation_id: &str) -> Result<()> {
        let url = self.url(&format!("/api/conversations/{conversation_id}"));
        let patch = ConversationPatch {
            inference_session_id: None,
            status: Some("error".into()),
        };
        self.execute_with_retry(&format!("PATCH /api/conversations/{conversation_id}"), || {
            self.http.patch(&url).json(&patch)
        })
        .await?;
        Ok(())
    }

    async fn health(&self) -> Result<bool> {
        let url = self.url("/health");
        match self
            .execute_with_retry("GET /health", || self.http.get(&url))
            .await
        {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(e) => {
                tracing::debug!(error = %e, "JotaDB health probe failed");
                Ok(false)
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error conversion helper
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Convert a `reqwest::Error` into a domain `Error`.
///
/// Timeout errors become `Error::Timeout`; everything else becomes
/// `Error::Http`.
pub fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}
