//! `jota-inference` — persistent, authenticated, multiplexed client to the
//! Inference Engine.
//!
//! The orchestrator keeps a single long-lived WebSocket to the engine and
//! multiplexes every concurrent streaming inference over it. This crate
//! owns that connection end to end: supervision with back-off, the auth
//! handshake, frame correlation, and the journaling discipline for
//! assistant responses (including partial output on failure).
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  Ingress (axum handlers)                                   │
//! │                                                            │
//! │   let client = InferenceClientBuilder::new()               │
//! │       .config(&config.inference)                           │
//! │       .store(store.clone())                                │
//! │       .build()?;                                           │
//! │   client.connect();                                        │
//! │                                                            │
//! │   let session = client.session_for_user("alice").await?;   │
//! │   let mut tokens = client.infer(&session, prompt, conv, None);
//! │   while let Some(tok) = tokens.next().await { ... }        │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Connection flow (hard-coded by the supervisor)
//!
//! 1. Dial the engine URL (`wss://` builds a TLS connector)
//! 2. Send `auth { client_id, api_key, jota_db_url }` as the first frame
//! 3. Wait up to 10 s for `auth_success` (an `error` frame rejects the
//!    attempt)
//! 4. Ready: the read pump routes `token`/`end`/`error` frames to the
//!    per-session delivery channels
//! 5. On disconnect: every waiting stream receives the loss sentinel, and
//!    the supervisor re-dials with exponential back-off (1 s → ×2 → 60 s,
//!    reset after a successful handshake)
//!
//! # Invariants
//!
//! - One read pump per live socket; nothing else reads it.
//! - Socket writes funnel through one writer task (frames never interleave).
//! - At most one `create_session` is outstanding at a time — the protocol
//!   has no correlation id, so the exchange runs under a mutex.
//! - A delivery channel exists exactly while an `infer` awaits frames for
//!   that session.

mod pump;
mod registry;
mod supervisor;
mod tls;

pub mod backoff;
pub mod builder;
pub mod client;
pub mod error;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use backoff::ReconnectBackoff;
pub use builder::InferenceClientBuilder;
pub use client::{ConnectionState, InferenceClient};
pub use error::InferenceError;
