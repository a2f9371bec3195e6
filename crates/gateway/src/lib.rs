//! `jota-gateway` — HTTP/WebSocket ingress for the Jota orchestrator.
//!
//! Accepts user prompts over REST (`POST /chat`) or a bidirectional
//! WebSocket (`GET /ws/chat/{user_id}`), associates them with a persistent
//! conversation in JotaDB, and streams the engine's token sequence back to
//! the client in real time.

pub mod api;
pub mod cli;
pub mod state;
