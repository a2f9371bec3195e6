//! Read pump — the single consumer of the engine socket.
//!
//! Decodes each text frame and dispatches it to the right waiter: the auth
//! waiter, the session-creation waiter, a session's delivery channel, or
//! the log. Malformed frames are dropped; they never fail the pump.

use std::sync::Arc;

use futures_util::stream::SplitStream;
use futures_util::StreamExt;
use jota_protocol::EngineFrame;
use tokio_tungstenite::tungstenite::Message;

use crate::client::Shared;
use crate::supervisor::WsStream;

/// Read until the socket closes or errors. On exit, every delivery channel
/// receives the connection-loss sentinel.
pub(crate) async fn run(mut stream: SplitStream<WsStream>, shared: Arc<Shared>) {
    while let Some(next) = stream.next().await {
        let msg = match next {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!(error = %e, "engine socket read error");
                break;
            }
        };
        match msg {
            Message::Text(text) => dispatch(&shared, &text),
            Message::Close(_) => {
                tracing::info!("engine closed the connection");
                break;
            }
            _ => {}
        }
    }

    // A handshake still in flight fails immediately rather than waiting
    // out its timeout.
    if let Some(waiter) = shared.auth_waiter.lock().take() {
        let _ = waiter.send(Err("connection closed".into()));
    }
    shared.registry.close_all();
}

fn dispatch(shared: &Shared, text: &str) {
    let frame = match serde_json::from_str::<EngineFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(error = %e, "dropping undecodable engine frame");
            return;
        }
    };

    match frame {
        EngineFrame::Hello { message } => {
            tracing::info!(
                message = message.as_deref().unwrap_or("ready"),
                "engine hello"
            );
        }
        EngineFrame::AuthSuccess { .. } => match shared.auth_waiter.lock().take() {
            Some(waiter) => {
                let _ = waiter.send(Ok(()));
            }
            None => tracing::debug!("auth_success with no pending handshake"),
        },
        EngineFrame::SessionCreated { ref session_id } => {
            match shared.session_waiter.lock().take() {
                Some(waiter) => {
                    let _ = waiter.send(session_id.clone());
                }
                None => {
                    tracing::warn!(
                        session_id = %session_id,
                        "session_created with no pending request"
                    )
                }
            }
        }
        EngineFrame::Token { .. } | EngineFrame::End { .. } => {
            let session_id = frame.session_id().unwrap_or_default().to_owned();
            if !shared.registry.route(&session_id, frame) {
                tracing::warn!(
                    session_id = %session_id,
                    "dropping frame for session with no waiting caller"
                );
            }
        }
        EngineFrame::Error {
            ref session_id,
            ref message,
        } => {
            let text = message.clone().unwrap_or_else(|| "unknown error".into());
            tracing::error!(session_id = ?session_id, error = %text, "engine error frame");

            // A pending handshake fails first; the error is fatal for the
            // current connection attempt.
            if let Some(waiter) = shared.auth_waiter.lock().take() {
                let _ = waiter.send(Err(text));
                return;
            }

            let session_id = session_id.clone();
            if let Some(sid) = session_id {
                if shared.registry.route(&sid, frame) {
                    return;
                }
            }
            tracing::warn!("engine error matched no pending caller");
        }
        other => {
            tracing::debug!(frame = ?other, "ignoring unexpected frame");
        }
    }
}
