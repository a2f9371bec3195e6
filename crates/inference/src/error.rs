//! Error kinds surfaced by the inference transport.

/// Errors a transport call can return.
///
/// Connection-layer failures never appear here directly: the supervisor
/// absorbs them and callers observe `EngineUnavailable` on their next call
/// (or a `StreamInterrupted` if a stream was already in flight).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum InferenceError {
    #[error("inference engine unavailable")]
    EngineUnavailable,

    #[error("session creation timed out")]
    SessionCreateTimeout,

    #[error("engine error: {0}")]
    Engine(String),

    #[error("inference timed out waiting for a frame")]
    StreamTimeout,

    #[error("stream interrupted")]
    StreamInterrupted,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("config: {0}")]
    Config(String),
}
