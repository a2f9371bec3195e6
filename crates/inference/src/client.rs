//! The inference transport surface — request API over one persistent
//! multiplexed engine connection.

use std::sync::Arc;
use std::time::Duration;

use jota_db::{ConversationStore, Role};
use jota_domain::stream::BoxStream;
use jota_protocol::EngineFrame;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::InferenceError;
use crate::registry::SessionRegistry;
use crate::supervisor::{self, ConnectSettings};

/// Connection lifecycle state. Managed exclusively by the supervisor,
/// except for `Draining`, which `shutdown` sets and which is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Dialing,
    Authenticating,
    Ready,
    Draining,
}

/// State shared between the request surface, the supervisor, and the
/// read pump.
pub(crate) struct Shared {
    pub(crate) registry: SessionRegistry,
    pub(crate) state: Mutex<ConnectionState>,
    /// Writer-queue handle for the current connection; absent while down.
    pub(crate) outbound: Mutex<Option<mpsc::Sender<EngineFrame>>>,
    /// Completed by the pump on `auth_success`, failed on an `error` frame.
    pub(crate) auth_waiter: Mutex<Option<oneshot::Sender<Result<(), String>>>>,
    /// Completed by the pump on the next `session_created`. At most one
    /// exists because `session_create_lock` serializes the whole exchange.
    pub(crate) session_waiter: Mutex<Option<oneshot::Sender<String>>>,
    /// Serializes the create_session request/response pair (the wire
    /// protocol carries no correlation id) and guards the user→session map.
    pub(crate) session_create_lock: tokio::sync::Mutex<()>,
}

impl Shared {
    fn new() -> Self {
        Self {
            registry: SessionRegistry::default(),
            state: Mutex::new(ConnectionState::Disconnected),
            outbound: Mutex::new(None),
            auth_waiter: Mutex::new(None),
            session_waiter: Mutex::new(None),
            session_create_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub(crate) fn connection_state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Move to a new state unless draining.
    pub(crate) fn transition(&self, to: ConnectionState) {
        let mut state = self.state.lock();
        if *state != ConnectionState::Draining {
            *state = to;
        }
    }

    /// Queue a frame for the single writer task.
    pub(crate) fn try_send(&self, frame: EngineFrame) -> Result<(), InferenceError> {
        if self.connection_state() != ConnectionState::Ready {
            return Err(InferenceError::EngineUnavailable);
        }
        let outbound = self.outbound.lock();
        match outbound.as_ref() {
            Some(tx) => tx
                .try_send(frame)
                .map_err(|_| InferenceError::EngineUnavailable),
            None => Err(InferenceError::EngineUnavailable),
        }
    }

    /// Tear down everything tied to the current connection: the writer
    /// handle, any parked waiters, and every delivery channel (sentinel).
    pub(crate) fn fail_pending(&self) {
        *self.outbound.lock() = None;
        *self.auth_waiter.lock() = None;
        *self.session_waiter.lock() = None;
        self.registry.close_all();
    }
}

/// Persistent, authenticated, multiplexed client to the Inference Engine.
///
/// Create via [`InferenceClientBuilder`](crate::builder::InferenceClientBuilder),
/// then call [`connect`](Self::connect) once at startup. The supervisor
/// keeps the connection alive in the background; requests made while the
/// engine is unreachable fail fast with
/// [`EngineUnavailable`](InferenceError::EngineUnavailable).
pub struct InferenceClient {
    pub(crate) shared: Arc<Shared>,
    pub(crate) store: Arc<dyn ConversationStore>,
    pub(crate) settings: ConnectSettings,
    pub(crate) session_create_timeout: Duration,
    pub(crate) stream_idle_timeout: Duration,
    pub(crate) shutdown: CancellationToken,
    pub(crate) supervisor_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl InferenceClient {
    pub(crate) fn from_parts(
        store: Arc<dyn ConversationStore>,
        settings: ConnectSettings,
        session_create_timeout: Duration,
        stream_idle_timeout: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared::new()),
            store,
            settings,
            session_create_timeout,
            stream_idle_timeout,
            shutdown: CancellationToken::new(),
            supervisor_task: Mutex::new(None),
        }
    }

    /// Start a new builder.
    pub fn builder() -> crate::builder::InferenceClientBuilder {
        crate::builder::InferenceClientBuilder::new()
    }

    /// Start (or confirm) the background connection supervisor.
    ///
    /// Idempotent; returns without waiting for the connection to become
    /// ready. Unreachability surfaces via [`health`](Self::health) or as
    /// `EngineUnavailable` on individual calls.
    pub fn connect(&self) {
        let mut task = self.supervisor_task.lock();
        if let Some(handle) = task.as_ref() {
            if !handle.is_finished() {
                return;
            }
        }
        if self.shutdown.is_cancelled() {
            return;
        }

        let shared = self.shared.clone();
        let settings = self.settings.clone();
        let shutdown = self.shutdown.clone();
        *task = Some(tokio::spawn(async move {
            supervisor::run(shared, settings, shutdown).await;
        }));
        tracing::info!(url = %self.settings.url, "inference connection loop started");
    }

    /// Drain the transport: stop the supervisor, close the socket, and
    /// fail every outstanding call.
    ///
    /// Streams in flight terminate with
    /// [`StreamInterrupted`](InferenceError::StreamInterrupted) and run
    /// their partial-save path. After this, every call fails with
    /// `EngineUnavailable`.
    pub async fn shutdown(&self) {
        *self.shared.state.lock() = ConnectionState::Draining;
        self.shutdown.cancel();
        self.shared.fail_pending();

        let task = self.supervisor_task.lock().take();
        if let Some(handle) = task {
            let _ = handle.await;
        }
        tracing::info!("inference transport drained");
    }

    /// True iff the connection is authenticated and usable.
    pub fn health(&self) -> bool {
        self.shared.connection_state() == ConnectionState::Ready
    }

    /// Current connection state (diagnostics).
    pub fn connection_state(&self) -> ConnectionState {
        self.shared.connection_state()
    }

    /// Request a fresh engine session id.
    ///
    /// The whole request/response pair runs under the session-creation
    /// mutex: the protocol has no correlation id, so the next
    /// `session_created` frame answers the most recent request.
    pub async fn create_session(&self) -> Result<String, InferenceError> {
        let guard = self.shared.session_create_lock.lock().await;
        self.create_session_locked(&guard).await
    }

    async fn create_session_locked(
        &self,
        _guard: &tokio::sync::MutexGuard<'_, ()>,
    ) -> Result<String, InferenceError> {
        if self.shared.connection_state() != ConnectionState::Ready {
            return Err(InferenceError::EngineUnavailable);
        }

        let (tx, rx) = oneshot::channel();
        *self.shared.session_waiter.lock() = Some(tx);

        if let Err(e) = self.shared.try_send(EngineFrame::CreateSession) {
            *self.shared.session_waiter.lock() = None;
            return Err(e);
        }

        match tokio::time::timeout(self.session_create_timeout, rx).await {
            Ok(Ok(session_id)) => {
                tracing::info!(session_id = %session_id, "engine session created");
                Ok(session_id)
            }
            // Waiter dropped: the connection went down before the reply.
            Ok(Err(_)) => Err(InferenceError::EngineUnavailable),
            Err(_) => {
                *self.shared.session_waiter.lock() = None;
                Err(InferenceError::SessionCreateTimeout)
            }
        }
    }

    /// Engine session for an end user, creating and remembering one if
    /// absent.
    ///
    /// The mapping survives reconnects; the engine may have discarded the
    /// session in the meantime, in which case the first reuse surfaces an
    /// engine error to the caller, who re-issues the request.
    pub async fn session_for_user(&self, user_id: &str) -> Result<String, InferenceError> {
        let guard = self.shared.session_create_lock.lock().await;
        if let Some(existing) = self.shared.registry.lookup_user(user_id) {
            return Ok(existing);
        }
        let session_id = self.create_session_locked(&guard).await?;
        self.shared.registry.remember_user(user_id, &session_id);
        Ok(session_id)
    }

    /// Best-effort session cancellation. A no-op when the engine is down.
    pub fn abort_session(&self, session_id: &str) {
        match self.shared.try_send(EngineFrame::Abort {
            session_id: session_id.to_owned(),
        }) {
            Ok(()) => tracing::info!(session_id = %session_id, "abort sent"),
            Err(_) => {
                tracing::debug!(session_id = %session_id, "abort skipped, engine not ready")
            }
        }
    }

    /// Run one inference, returning a lazy stream of generated tokens.
    ///
    /// The stream is single-shot and ordered. On `end` the full response is
    /// journaled as the assistant message. On any failure a non-empty
    /// partial response is journaled with an `" [INTERRUPTED]"` suffix, the
    /// conversation is marked errored, and the failure is yielded as the
    /// final item. Store failures are logged, never propagated. Dropping
    /// the stream detaches the session's delivery channel.
    pub fn infer(
        &self,
        session_id: &str,
        prompt: &str,
        conversation_id: &str,
        params: Option<serde_json::Value>,
    ) -> BoxStream<'static, Result<String, InferenceError>> {
        let shared = self.shared.clone();
        let store = self.store.clone();
        let idle_timeout = self.stream_idle_timeout;
        let session_id = session_id.to_owned();
        let prompt = prompt.to_owned();
        let conversation_id = conversation_id.to_owned();

        Box::pin(async_stream::stream! {
            if session_id.is_empty() || conversation_id.is_empty() {
                yield Err(InferenceError::InvalidRequest(
                    "session_id and conversation_id must be non-empty".into(),
                ));
                return;
            }
            let params = params.unwrap_or_else(default_params);

            tracing::info!(
                conversation_id = %conversation_id,
                session_id = %session_id,
                "starting inference"
            );

            let mut rx = shared.registry.attach(&session_id);
            let _detach = DetachGuard {
                shared: shared.clone(),
                session_id: session_id.clone(),
            };

            let mut accumulator = String::new();

            let failure: Option<InferenceError> = 'run: {
                if let Err(e) = shared.try_send(EngineFrame::Infer {
                    session_id: session_id.clone(),
                    prompt,
                    params,
                }) {
                    break 'run Some(e);
                }

                loop {
                    let frame = match tokio::time::timeout(idle_timeout, rx.recv()).await {
                        Err(_) => break 'run Some(InferenceError::StreamTimeout),
                        Ok(None) | Ok(Some(None)) => {
                            break 'run Some(InferenceError::StreamInterrupted)
                        }
                        Ok(Some(Some(frame))) => frame,
                    };

                    match frame {
                        EngineFrame::Token { content, .. } => {
                            accumulator.push_str(&content);
                            yield Ok(content);
                        }
                        EngineFrame::End { .. } => break 'run None,
                        EngineFrame::Error { message, .. } => {
                            break 'run Some(InferenceError::Engine(
                                message.unwrap_or_else(|| "unknown engine error".into()),
                            ));
                        }
                        other => {
                            tracing::warn!(
                                session_id = %session_id,
                                frame = ?other,
                                "dropping unexpected frame for session"
                            );
                        }
                    }
                }
            };

            match failure {
                None => {
                    tracing::info!(conversation_id = %conversation_id, "inference complete");
                    if let Err(e) = store
                        .save_message(&conversation_id, Role::Assistant, &accumulator)
                        .await
                    {
                        tracing::error!(
                            conversation_id = %conversation_id,
                            error = %e,
                            "failed to journal assistant message"
                        );
                    }
                }
                Some(err) => {
                    tracing::error!(
                        conversation_id = %conversation_id,
                        session_id = %session_id,
                        error = %err,
                        "inference failed"
                    );
                    if !accumulator.is_empty() {
                        let partial = format!("{accumulator} [INTERRUPTED]");
                        if let Err(e) = store
                            .save_message(&conversation_id, Role::Assistant, &partial)
                            .await
                        {
                            tracing::error!(
                                conversation_id = %conversation_id,
                                error = %e,
                                "failed to journal partial assistant message"
                            );
                        }
                    }
                    if let Err(e) = store.mark_conversation_error(&conversation_id).await {
                        tracing::error!(
                            conversation_id = %conversation_id,
                            error = %e,
                            "failed to mark conversation errored"
                        );
                    }
                    yield Err(err);
                }
            }
        })
    }
}

fn default_params() -> serde_json::Value {
    serde_json::json!({ "temp": 0.7 })
}

/// Detaches the session's delivery channel when the `infer` stream
/// terminates or is dropped mid-flight.
struct DetachGuard {
    shared: Arc<Shared>,
    session_id: String,
}

impl Drop for DetachGuard {
    fn drop(&mut self) {
        self.shared.registry.detach(&self.session_id);
    }
}
