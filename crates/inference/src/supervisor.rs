//! Connection supervisor — owns the socket lifecycle: dial (TLS optional),
//! auth handshake, read pump, disconnect detection, back-off retry.
//!
//! Exactly one supervisor task runs per client. It never surfaces
//! connection errors to callers; they observe `EngineUnavailable` until
//! the next successful handshake.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use jota_protocol::EngineFrame;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::backoff::ReconnectBackoff;
use crate::client::{ConnectionState, Shared};
use crate::pump;
use crate::tls;

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Everything the supervisor needs to dial and authenticate.
#[derive(Debug, Clone)]
pub(crate) struct ConnectSettings {
    pub(crate) url: String,
    pub(crate) client_id: String,
    pub(crate) api_key: String,
    pub(crate) jota_db_url: Option<String>,
    pub(crate) ssl_verify: bool,
    pub(crate) backoff: ReconnectBackoff,
    pub(crate) auth_timeout: Duration,
}

/// Run the connection loop until `shutdown` fires.
pub(crate) async fn run(
    shared: Arc<Shared>,
    settings: ConnectSettings,
    shutdown: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        match connect_once(&shared, &settings, &shutdown).await {
            Ok(Authenticated::Yes) => {
                tracing::warn!(url = %settings.url, "engine connection lost");
                // A completed handshake restarts the back-off schedule.
                attempt = 0;
            }
            Ok(Authenticated::Cancelled) => {}
            Err(e) => {
                tracing::error!(
                    url = %settings.url,
                    attempt,
                    error = %e,
                    "engine connection attempt failed"
                );
            }
        }

        // The connection is gone: every waiting caller gets the sentinel.
        shared.transition(ConnectionState::Disconnected);
        shared.fail_pending();

        if shutdown.is_cancelled() {
            break;
        }

        let delay = settings.backoff.delay_for_attempt(attempt);
        attempt = attempt.saturating_add(1);
        tracing::info!(
            delay_ms = delay.as_millis() as u64,
            "retrying engine connection"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.cancelled() => break,
        }
    }
}

/// Outcome of a single connection attempt that did not error.
enum Authenticated {
    /// The handshake completed before the connection closed.
    Yes,
    /// Shutdown fired mid-attempt.
    Cancelled,
}

/// Single connection lifecycle: dial → handshake → pump until disconnect.
async fn connect_once(
    shared: &Arc<Shared>,
    settings: &ConnectSettings,
    shutdown: &CancellationToken,
) -> anyhow::Result<Authenticated> {
    shared.transition(ConnectionState::Dialing);
    tracing::info!(url = %settings.url, "connecting to inference engine");

    let connector = tls::connector_for(&settings.url, settings.ssl_verify)?;

    let ws = tokio::select! {
        r = tokio_tungstenite::connect_async_tls_with_config(
            settings.url.as_str(),
            None,
            false,
            connector,
        ) => r?.0,
        _ = shutdown.cancelled() => return Ok(Authenticated::Cancelled),
    };
    let (mut sink, stream) = ws.split();

    shared.transition(ConnectionState::Authenticating);

    // Single-writer queue: request handlers post frames, only this task
    // touches the sink, so each frame is written as one unit.
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<EngineFrame>(64);
    let writer_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let json = match serde_json::to_string(&frame) {
                Ok(j) => j,
                Err(e) => {
                    tracing::error!(error = %e, "failed to serialize outbound frame");
                    continue;
                }
            };
            if sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let (auth_tx, auth_rx) = oneshot::channel();
    *shared.auth_waiter.lock() = Some(auth_tx);

    let mut pump_task = tokio::spawn(pump::run(stream, shared.clone()));

    let auth = EngineFrame::Auth {
        client_id: settings.client_id.clone(),
        api_key: settings.api_key.clone(),
        jota_db_url: settings.jota_db_url.clone(),
    };
    if outbound_tx.send(auth).await.is_err() {
        pump_task.abort();
        anyhow::bail!("connection closed before auth could be sent");
    }
    tracing::info!("sent authentication credentials, waiting for confirmation");

    let auth_result = tokio::select! {
        r = tokio::time::timeout(settings.auth_timeout, auth_rx) => r,
        _ = shutdown.cancelled() => {
            pump_task.abort();
            writer_task.abort();
            return Ok(Authenticated::Cancelled);
        }
    };

    match auth_result {
        Ok(Ok(Ok(()))) => {
            tracing::info!("authenticated with inference engine");
        }
        Ok(Ok(Err(message))) => {
            pump_task.abort();
            writer_task.abort();
            anyhow::bail!("authentication rejected: {message}");
        }
        Ok(Err(_)) => {
            // The waiter vanished without an answer (torn-down connection).
            pump_task.abort();
            writer_task.abort();
            anyhow::bail!("connection closed during authentication");
        }
        Err(_) => {
            *shared.auth_waiter.lock() = None;
            pump_task.abort();
            writer_task.abort();
            anyhow::bail!("authentication timed out");
        }
    }

    // Connection is usable: publish the writer handle and go ready.
    *shared.outbound.lock() = Some(outbound_tx);
    shared.transition(ConnectionState::Ready);

    // Stay here until the pump exits (socket closed or read error).
    tokio::select! {
        _ = &mut pump_task => {}
        _ = shutdown.cancelled() => pump_task.abort(),
    }
    writer_task.abort();

    Ok(Authenticated::Yes)
}
