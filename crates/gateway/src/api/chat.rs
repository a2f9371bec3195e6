//! Chat endpoints — the primary interface for running inference turns.
//!
//! - `POST /chat`              — non-streaming: returns the full response
//! - `GET  /ws/chat/{user_id}` — WebSocket: streams tokens in real time

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use futures_util::StreamExt;
use serde::Deserialize;

use jota_db::Role;
use jota_domain::stream::BoxStream;
use jota_inference::InferenceError;

use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request shape
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// User message text.
    pub text: String,
    /// Client-supplied end-user identifier; conversations group under it.
    #[serde(default = "d_user")]
    pub user_id: String,
}

fn d_user() -> String {
    "default".into()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /chat (non-streaming)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ChatRequest>,
) -> impl IntoResponse {
    if let Err(resp) = check_client_key(&state, &headers).await {
        return resp.into_response();
    }
    if body.text.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "text must not be empty" })),
        )
            .into_response();
    }

    let (_session_id, mut stream) = match run_turn(&state, &body.user_id, &body.text).await {
        Ok(turn) => turn,
        Err(e) => return e.into_response(),
    };

    // Consume the whole stream; this is a plain POST, not a stream. Errors
    // fold into the response text the way streaming clients see them.
    let mut full = String::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(tok) => full.push_str(&tok),
            Err(e) => {
                full.push_str(&format!(" [Error: {e}]"));
                break;
            }
        }
    }

    Json(serde_json::json!({ "status": "success", "response": full })).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /ws/chat/{user_id} (streaming)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn ws_chat(
    ws: WebSocketUpgrade,
    Path(user_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if let Err(resp) = check_client_key(&state, &headers).await {
        return resp.into_response();
    }
    ws.on_upgrade(move |socket| handle_ws(socket, state, user_id))
        .into_response()
}

async fn handle_ws(mut socket: WebSocket, state: AppState, user_id: String) {
    tracing::info!(user_id = %user_id, "chat websocket connected");

    while let Some(Ok(msg)) = socket.recv().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let (session_id, mut stream) = match run_turn(&state, &user_id, &text).await {
            Ok(turn) => turn,
            Err(e) => {
                if socket
                    .send(Message::Text(format!(" [Error: {}]", e.message)))
                    .await
                    .is_err()
                {
                    break;
                }
                continue;
            }
        };

        while let Some(item) = stream.next().await {
            match item {
                Ok(tok) => {
                    if socket.send(Message::Text(tok)).await.is_err() {
                        // Client went away mid-generation: stop the engine
                        // side too.
                        state.inference.abort_session(&session_id);
                        tracing::info!(user_id = %user_id, "chat websocket dropped mid-stream");
                        return;
                    }
                }
                Err(e) => {
                    let _ = socket.send(Message::Text(format!(" [Error: {e}]"))).await;
                    break;
                }
            }
        }
    }

    tracing::info!(user_id = %user_id, "chat websocket disconnected");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn execution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Failure before the token stream could start.
struct TurnError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for TurnError {
    fn into_response(self) -> axum::response::Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

/// Resolve the conversation and engine session for a user, journal the user
/// message, and start the inference stream.
///
/// The ingress is the sole writer of user messages; the transport journals
/// assistant output on its own.
async fn run_turn(
    state: &AppState,
    user_id: &str,
    text: &str,
) -> Result<(String, BoxStream<'static, Result<String, InferenceError>>), TurnError> {
    let conversation = state
        .store
        .get_or_create_conversation(user_id)
        .await
        .map_err(|e| TurnError {
            status: StatusCode::BAD_GATEWAY,
            message: format!("conversation store unavailable: {e}"),
        })?;

    let session_id = match conversation.inference_session_id.clone() {
        Some(id) => id,
        None => {
            let id = state
                .inference
                .session_for_user(user_id)
                .await
                .map_err(|e| TurnError {
                    status: match e {
                        InferenceError::EngineUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                        _ => StatusCode::BAD_GATEWAY,
                    },
                    message: e.to_string(),
                })?;
            if let Err(e) = state
                .store
                .update_conversation_session(&conversation.id, &id)
                .await
            {
                tracing::warn!(
                    conversation_id = %conversation.id,
                    error = %e,
                    "failed to bind engine session to conversation"
                );
            }
            id
        }
    };

    if let Err(e) = state
        .store
        .save_message(&conversation.id, Role::User, text)
        .await
    {
        tracing::warn!(
            conversation_id = %conversation.id,
            error = %e,
            "failed to journal user message"
        );
    }

    let stream = state
        .inference
        .infer(&session_id, text, &conversation.id, None);
    Ok((session_id, stream))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client key gate
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Validate `X-Client-Key` against the store when present. Requests without
/// a key pass through (open access, dev mode).
async fn check_client_key(state: &AppState, headers: &HeaderMap) -> Result<(), TurnError> {
    let Some(key) = headers.get("x-client-key").and_then(|v| v.to_str().ok()) else {
        return Ok(());
    };

    match state.store.validate_client_key(key).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(TurnError {
            status: StatusCode::UNAUTHORIZED,
            message: "invalid client key".into(),
        }),
        Err(e) => {
            tracing::warn!(error = %e, "client key validation failed");
            Err(TurnError {
                status: StatusCode::SERVICE_UNAVAILABLE,
                message: "conversation store unavailable".into(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_defaults_user_id() {
        let req: ChatRequest = serde_json::from_str(r#"{"text":"hi"}"#).unwrap();
        assert_eq!(req.user_id, "default");
        assert_eq!(req.text, "hi");
    }

    #[test]
    fn chat_request_explicit_user_id() {
        let req: ChatRequest =
            serde_json::from_str(r#"{"text":"hi","user_id":"alice"}"#).unwrap();
        assert_eq!(req.user_id, "alice");
    }
}
