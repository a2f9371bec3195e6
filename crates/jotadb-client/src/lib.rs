//! `jota-db` — client for JotaDB, the conversation store.
//!
//! Exposes the [`ConversationStore`] contract (validate client keys,
//! fetch-or-create conversations, append messages, flag errored
//! conversations, health) and its REST implementation. The inference
//! transport and the ingress both consume the trait, never the concrete
//! client, so tests substitute recording doubles.

pub mod provider;
pub mod rest;
pub mod types;

pub use provider::ConversationStore;
pub use rest::RestJotaDbClient;
pub use types::{Conversation, Role};

use std::sync::Arc;

use jota_domain::config::JotaDbConfig;
use jota_domain::error::Result;

/// Build the store client from config.
pub fn create_store(cfg: &JotaDbConfig) -> Result<Arc<dyn ConversationStore>> {
    Ok(Arc::new(RestJotaDbClient::new(cfg)?))
}
