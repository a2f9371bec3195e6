//! Integration tests: boot an in-process WebSocket server that plays the
//! Inference Engine, connect a real [`InferenceClient`], and drive the full
//! protocol — handshake, session creation, multiplexed token streams, and
//! the journaling side effects on success and failure.
//!
//! The mock engine is scripted per session: complete normally, fail
//! mid-stream, drop the connection, or go silent. A recording store double
//! asserts the journaling discipline (exactly-once save, `[INTERRUPTED]`
//! suffix on partial output, conversation error marking).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use jota_db::types::Conversation;
use jota_db::{ConversationStore, Role};
use jota_domain::stream::BoxStream;
use jota_inference::{
    InferenceClient, InferenceClientBuilder, InferenceError, ReconnectBackoff,
};
use jota_protocol::EngineFrame;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

const DEFAULT_SESSION: &str = "mock_session_123";
const DEFAULT_TOKENS: [&str; 6] = ["This", " is", " a", " mock", " response", "."];

// ── Mock engine ─────────────────────────────────────────────────────────

#[derive(Clone)]
enum SessionScript {
    /// Stream these tokens, then `end`.
    Complete(Vec<&'static str>),
    /// Stream these tokens, then an `error` frame with the given message.
    ErrorAfter(Vec<&'static str>, &'static str),
    /// Stream these tokens, then drop the connection.
    CloseAfter(Vec<&'static str>),
    /// Stream these tokens, then go silent.
    Stall(Vec<&'static str>),
}

#[derive(Default)]
struct EngineScript {
    /// Session ids handed out per `create_session`, in order. Empty list
    /// falls back to `DEFAULT_SESSION`.
    session_ids: Mutex<Vec<String>>,
    /// Per-session inference behavior. Unscripted sessions complete with
    /// `DEFAULT_TOKENS`.
    responses: Mutex<HashMap<String, SessionScript>>,
    /// Reject this api_key during the handshake.
    reject_key: Mutex<Option<String>>,
    /// Never answer `create_session`.
    ignore_create: Mutex<bool>,
    /// Connections accepted so far.
    connections: AtomicUsize,
    /// `abort` frames observed.
    aborts: Mutex<Vec<String>>,
}

impl EngineScript {
    fn next_session_id(&self) -> String {
        let mut ids = self.session_ids.lock().unwrap();
        if ids.is_empty() {
            DEFAULT_SESSION.to_owned()
        } else {
            ids.remove(0)
        }
    }

    fn script_for(&self, session_id: &str) -> SessionScript {
        self.responses
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .unwrap_or_else(|| SessionScript::Complete(DEFAULT_TOKENS.to_vec()))
    }
}

async fn send_frame(ws: &mut WebSocketStream<TcpStream>, frame: &EngineFrame) -> bool {
    let json = serde_json::to_string(frame).unwrap();
    ws.send(Message::Text(json)).await.is_ok()
}

/// Boot the mock engine on an ephemeral port.
async fn start_mock_engine(script: Arc<EngineScript>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _peer)) = listener.accept().await {
            script.connections.fetch_add(1, Ordering::SeqCst);
            let script = script.clone();
            tokio::spawn(async move {
                let mut ws = match tokio_tungstenite::accept_async(stream).await {
                    Ok(ws) => ws,
                    Err(_) => return,
                };

                if !send_frame(
                    &mut ws,
                    &EngineFrame::Hello {
                        message: Some("mock engine ready".into()),
                    },
                )
                .await
                {
                    return;
                }

                while let Some(Ok(msg)) = ws.next().await {
                    let text = match msg {
                        Message::Text(text) => text,
                        Message::Close(_) => break,
                        _ => continue,
                    };
                    let frame = match serde_json::from_str::<EngineFrame>(&text) {
                        Ok(frame) => frame,
                        Err(_) => continue,
                    };

                    match frame {
                        EngineFrame::Auth { api_key, .. } => {
                            let rejected = script
                                .reject_key
                                .lock()
                                .unwrap()
                                .as_deref()
                                .is_some_and(|k| k == api_key);
                            let reply = if rejected {
                                EngineFrame::Error {
                                    session_id: None,
                                    message: Some("Authentication failed".into()),
                                }
                            } else {
                                EngineFrame::AuthSuccess { message: None }
                            };
                            if !send_frame(&mut ws, &reply).await {
                                break;
                            }
                        }
                        EngineFrame::CreateSession => {
                            if *script.ignore_create.lock().unwrap() {
                                continue;
                            }
                            let session_id = script.next_session_id();
                            if !send_frame(
                                &mut ws,
                                &EngineFrame::SessionCreated { session_id },
                            )
                            .await
                            {
                                break;
                            }
                        }
                        EngineFrame::Infer { session_id, .. } => {
                            let (tokens, outcome) = match script.script_for(&session_id) {
                                SessionScript::Complete(toks) => (toks, Outcome::End),
                                SessionScript::ErrorAfter(toks, msg) => {
                                    (toks, Outcome::Error(msg))
                                }
                                SessionScript::CloseAfter(toks) => (toks, Outcome::Close),
                                SessionScript::Stall(toks) => (toks, Outcome::Stall),
                            };
                            for tok in tokens {
                                tokio::time::sleep(Duration::from_millis(2)).await;
                                let frame = EngineFrame::Token {
                                    session_id: session_id.clone(),
                                    content: tok.into(),
                                };
                                if !send_frame(&mut ws, &frame).await {
                                    return;
                                }
                            }
                            match outcome {
                                Outcome::End => {
                                    let frame = EngineFrame::End {
                                        session_id: session_id.clone(),
                                    };
                                    if !send_frame(&mut ws, &frame).await {
                                        return;
                                    }
                                }
                                Outcome::Error(msg) => {
                                    let frame = EngineFrame::Error {
                                        session_id: Some(session_id.clone()),
                                        message: Some(msg.into()),
                                    };
                                    if !send_frame(&mut ws, &frame).await {
                                        return;
                                    }
                                }
                                Outcome::Close => return,
                                Outcome::Stall => {}
                            }
                        }
                        EngineFrame::Abort { session_id } => {
                            script.aborts.lock().unwrap().push(session_id);
                        }
                        _ => {}
                    }
                }
            });
        }
    });

    addr
}

enum Outcome {
    End,
    Error(&'static str),
    Close,
    Stall,
}

// ── Recording store double ──────────────────────────────────────────────

#[derive(Default)]
struct RecordingStore {
    saved: Mutex<Vec<(String, Role, String)>>,
    errored: Mutex<Vec<String>>,
}

impl RecordingStore {
    fn saved(&self) -> Vec<(String, Role, String)> {
        self.saved.lock().unwrap().clone()
    }

    fn errored(&self) -> Vec<String> {
        self.errored.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConversationStore for RecordingStore {
    async fn validate_client_key(&self, _api_key: &str) -> jota_domain::Result<bool> {
        Ok(true)
    }

    async fn get_or_create_conversation(
        &self,
        client_ref: &str,
    ) -> jota_domain::Result<Conversation> {
        Ok(Conversation {
            id: format!("conv-{client_ref}"),
            inference_session_id: None,
        })
    }

    async fn update_conversation_session(
        &self,
        _conversation_id: &str,
        _session_id: &str,
    ) -> jota_domain::Result<()> {
        Ok(())
    }

    async fn save_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> jota_domain::Result<()> {
        self.saved
            .lock()
            .unwrap()
            .push((conversation_id.into(), role, content.into()));
        Ok(())
    }

    async fn mark_conversation_error(&self, conversation_id: &str) -> jota_domain::Result<()> {
        self.errored.lock().unwrap().push(conversation_id.into());
        Ok(())
    }

    async fn health(&self) -> jota_domain::Result<bool> {
        Ok(true)
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────

fn build_client(addr: SocketAddr, store: Arc<RecordingStore>) -> InferenceClient {
    InferenceClientBuilder::new()
        .url(format!("ws://{addr}"))
        .client_id("test_client")
        .api_key("test_key")
        .store(store as Arc<dyn ConversationStore>)
        .reconnect_backoff(ReconnectBackoff {
            initial_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(200),
        })
        .build()
        .unwrap()
}

async fn ready_client(addr: SocketAddr, store: Arc<RecordingStore>) -> InferenceClient {
    let client = build_client(addr, store);
    client.connect();
    wait_ready(&client).await;
    client
}

async fn wait_ready(client: &InferenceClient) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !client.health() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "engine never became ready"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Drain a token stream: collected tokens plus the terminal error, if any.
async fn drain(
    mut stream: BoxStream<'static, Result<String, InferenceError>>,
) -> (Vec<String>, Option<InferenceError>) {
    let mut tokens = Vec::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(tok) => tokens.push(tok),
            Err(e) => return (tokens, Some(e)),
        }
    }
    (tokens, None)
}

// ── Tests ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn happy_path_streams_and_journals() {
    let script = Arc::new(EngineScript::default());
    let addr = start_mock_engine(script).await;
    let store = Arc::new(RecordingStore::default());
    let client = ready_client(addr, store.clone()).await;

    let session_id = client.create_session().await.unwrap();
    assert_eq!(session_id, DEFAULT_SESSION);

    let stream = client.infer(&session_id, "Hello", "c1", None);
    let (tokens, err) = drain(stream).await;

    assert_eq!(tokens, DEFAULT_TOKENS);
    assert!(err.is_none(), "unexpected error: {err:?}");

    let saved = store.saved();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].0, "c1");
    assert_eq!(saved[0].1, Role::Assistant);
    assert_eq!(saved[0].2, "This is a mock response.");
    assert!(store.errored().is_empty());

    client.shutdown().await;
}

#[tokio::test]
async fn engine_error_mid_stream_saves_partial() {
    let script = Arc::new(EngineScript::default());
    script.responses.lock().unwrap().insert(
        DEFAULT_SESSION.into(),
        SessionScript::ErrorAfter(vec!["This", " is"], "boom"),
    );
    let addr = start_mock_engine(script).await;
    let store = Arc::new(RecordingStore::default());
    let client = ready_client(addr, store.clone()).await;

    let session_id = client.create_session().await.unwrap();
    let (tokens, err) = drain(client.infer(&session_id, "Hello", "c1", None)).await;

    assert_eq!(tokens, vec!["This", " is"]);
    assert_eq!(err, Some(InferenceError::Engine("boom".into())));

    let saved = store.saved();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].2, "This is [INTERRUPTED]");
    assert_eq!(store.errored(), vec!["c1"]);

    client.shutdown().await;
}

#[tokio::test]
async fn disconnect_mid_stream_interrupts_and_reconnects() {
    let script = Arc::new(EngineScript::default());
    script.responses.lock().unwrap().insert(
        DEFAULT_SESSION.into(),
        SessionScript::CloseAfter(vec!["Hi"]),
    );
    let addr = start_mock_engine(script.clone()).await;
    let store = Arc::new(RecordingStore::default());
    let client = ready_client(addr, store.clone()).await;

    let session_id = client.create_session().await.unwrap();
    let (tokens, err) = drain(client.infer(&session_id, "Hello", "c1", None)).await;

    assert_eq!(tokens, vec!["Hi"]);
    assert_eq!(err, Some(InferenceError::StreamInterrupted));

    let saved = store.saved();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].2, "Hi [INTERRUPTED]");
    assert_eq!(store.errored(), vec!["c1"]);

    // The supervisor re-dials on its own.
    wait_ready(&client).await;
    assert!(script.connections.load(Ordering::SeqCst) >= 2);

    client.shutdown().await;
}

#[tokio::test]
async fn concurrent_sessions_stay_isolated() {
    let script = Arc::new(EngineScript::default());
    *script.session_ids.lock().unwrap() =
        vec!["s1".into(), "s2".into(), "s3".into()];
    {
        let mut responses = script.responses.lock().unwrap();
        responses.insert(
            "s1".into(),
            SessionScript::Complete(vec!["a1", " a2", " a3", " a4", " a5", " a6"]),
        );
        responses.insert(
            "s2".into(),
            SessionScript::Complete(vec!["b1", " b2", " b3", " b4", " b5", " b6"]),
        );
        responses.insert(
            "s3".into(),
            SessionScript::Complete(vec!["c1", " c2", " c3", " c4", " c5", " c6"]),
        );
    }
    let addr = start_mock_engine(script).await;
    let store = Arc::new(RecordingStore::default());
    let client = Arc::new(ready_client(addr, store.clone()).await);

    let expected: HashMap<&str, Vec<&str>> = HashMap::from([
        ("s1", vec!["a1", " a2", " a3", " a4", " a5", " a6"]),
        ("s2", vec!["b1", " b2", " b3", " b4", " b5", " b6"]),
        ("s3", vec!["c1", " c2", " c3", " c4", " c5", " c6"]),
    ]);

    let run = |conv: &'static str| {
        let client = client.clone();
        async move {
            let session_id = client.create_session().await.unwrap();
            let (tokens, err) = drain(client.infer(&session_id, "prompt", conv, None)).await;
            assert!(err.is_none(), "unexpected error: {err:?}");
            (session_id, tokens)
        }
    };

    let (r1, r2, r3) = tokio::join!(run("c1"), run("c2"), run("c3"));

    let mut ids = vec![r1.0.clone(), r2.0.clone(), r3.0.clone()];
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3, "session ids must be distinct");

    for (session_id, tokens) in [r1, r2, r3] {
        assert_eq!(tokens, expected[session_id.as_str()]);
    }
    assert_eq!(store.saved().len(), 3);

    client.shutdown().await;
}

#[tokio::test]
async fn create_session_is_serialized() {
    let script = Arc::new(EngineScript::default());
    *script.session_ids.lock().unwrap() = vec!["A".into(), "B".into()];
    let addr = start_mock_engine(script).await;
    let store = Arc::new(RecordingStore::default());
    let client = Arc::new(ready_client(addr, store).await);

    let (a, b) = tokio::join!(client.create_session(), client.create_session());
    let (a, b) = (a.unwrap(), b.unwrap());

    // Each caller gets its own engine-issued id, never the other's.
    assert_ne!(a, b);
    assert!(["A", "B"].contains(&a.as_str()));
    assert!(["A", "B"].contains(&b.as_str()));

    client.shutdown().await;
}

#[tokio::test]
async fn create_session_times_out_when_engine_is_silent() {
    let script = Arc::new(EngineScript::default());
    *script.ignore_create.lock().unwrap() = true;
    let addr = start_mock_engine(script).await;
    let store = Arc::new(RecordingStore::default());

    let client = InferenceClientBuilder::new()
        .url(format!("ws://{addr}"))
        .client_id("test_client")
        .api_key("test_key")
        .store(store as Arc<dyn ConversationStore>)
        .session_create_timeout(Duration::from_millis(100))
        .build()
        .unwrap();
    client.connect();
    wait_ready(&client).await;

    let err = client.create_session().await.unwrap_err();
    assert_eq!(err, InferenceError::SessionCreateTimeout);

    client.shutdown().await;
}

#[tokio::test]
async fn calls_fail_fast_when_never_connected() {
    let store = Arc::new(RecordingStore::default());
    let client = build_client("127.0.0.1:1".parse().unwrap(), store.clone());

    let err = client.create_session().await.unwrap_err();
    assert_eq!(err, InferenceError::EngineUnavailable);

    let (tokens, err) = drain(client.infer("s1", "Hello", "c1", None)).await;
    assert!(tokens.is_empty());
    assert_eq!(err, Some(InferenceError::EngineUnavailable));

    // Nothing to save, but the conversation is still flagged.
    assert!(store.saved().is_empty());
    assert_eq!(store.errored(), vec!["c1"]);
}

#[tokio::test]
async fn auth_rejection_keeps_engine_unavailable() {
    let script = Arc::new(EngineScript::default());
    *script.reject_key.lock().unwrap() = Some("test_key".into());
    let addr = start_mock_engine(script).await;
    let store = Arc::new(RecordingStore::default());

    let client = build_client(addr, store);
    client.connect();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(!client.health());
    let err = client.create_session().await.unwrap_err();
    assert_eq!(err, InferenceError::EngineUnavailable);

    client.shutdown().await;
}

#[tokio::test]
async fn shutdown_interrupts_inflight_stream() {
    let script = Arc::new(EngineScript::default());
    script
        .responses
        .lock()
        .unwrap()
        .insert(DEFAULT_SESSION.into(), SessionScript::Stall(vec!["Hi"]));
    let addr = start_mock_engine(script).await;
    let store = Arc::new(RecordingStore::default());
    let client = ready_client(addr, store.clone()).await;

    let session_id = client.create_session().await.unwrap();
    let mut stream = client.infer(&session_id, "Hello", "c1", None);

    assert_eq!(stream.next().await, Some(Ok("Hi".into())));

    client.shutdown().await;

    assert_eq!(
        stream.next().await,
        Some(Err(InferenceError::StreamInterrupted))
    );
    assert!(stream.next().await.is_none());

    let saved = store.saved();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].2, "Hi [INTERRUPTED]");
    assert_eq!(store.errored(), vec!["c1"]);

    // Draining is terminal.
    assert!(!client.health());
    let err = client.create_session().await.unwrap_err();
    assert_eq!(err, InferenceError::EngineUnavailable);
}

#[tokio::test]
async fn stream_timeout_on_silent_engine() {
    let script = Arc::new(EngineScript::default());
    script
        .responses
        .lock()
        .unwrap()
        .insert(DEFAULT_SESSION.into(), SessionScript::Stall(vec!["Hi"]));
    let addr = start_mock_engine(script).await;
    let store = Arc::new(RecordingStore::default());

    let client = InferenceClientBuilder::new()
        .url(format!("ws://{addr}"))
        .client_id("test_client")
        .api_key("test_key")
        .store(store.clone() as Arc<dyn ConversationStore>)
        .stream_idle_timeout(Duration::from_millis(100))
        .build()
        .unwrap();
    client.connect();
    wait_ready(&client).await;

    let session_id = client.create_session().await.unwrap();
    let (tokens, err) = drain(client.infer(&session_id, "Hello", "c1", None)).await;

    assert_eq!(tokens, vec!["Hi"]);
    assert_eq!(err, Some(InferenceError::StreamTimeout));

    let saved = store.saved();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].2, "Hi [INTERRUPTED]");
    assert_eq!(store.errored(), vec!["c1"]);

    client.shutdown().await;
}

#[tokio::test]
async fn session_for_user_reuses_existing_session() {
    let script = Arc::new(EngineScript::default());
    *script.session_ids.lock().unwrap() = vec!["sess-alice".into()];
    let addr = start_mock_engine(script).await;
    let store = Arc::new(RecordingStore::default());
    let client = ready_client(addr, store).await;

    let first = client.session_for_user("alice").await.unwrap();
    let second = client.session_for_user("alice").await.unwrap();
    assert_eq!(first, "sess-alice");
    assert_eq!(first, second);

    // A different user gets a different session.
    let bob = client.session_for_user("bob").await.unwrap();
    assert_eq!(bob, DEFAULT_SESSION);

    client.shutdown().await;
}

#[tokio::test]
async fn abort_session_is_best_effort() {
    let script = Arc::new(EngineScript::default());
    let addr = start_mock_engine(script.clone()).await;
    let store = Arc::new(RecordingStore::default());

    // Not connected yet: silently a no-op.
    let client = build_client(addr, store);
    client.abort_session("s9");
    assert!(script.aborts.lock().unwrap().is_empty());

    client.connect();
    wait_ready(&client).await;

    client.abort_session("s9");
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if script.aborts.lock().unwrap().contains(&"s9".to_string()) {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "abort frame never reached the engine"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    client.shutdown().await;
}

#[tokio::test]
async fn infer_rejects_empty_identifiers() {
    let store = Arc::new(RecordingStore::default());
    let client = build_client("127.0.0.1:1".parse().unwrap(), store.clone());

    let (tokens, err) = drain(client.infer("", "Hello", "c1", None)).await;
    assert!(tokens.is_empty());
    assert!(matches!(err, Some(InferenceError::InvalidRequest(_))));
    // Precondition failures never touch the store.
    assert!(store.saved().is_empty());
    assert!(store.errored().is_empty());
}
