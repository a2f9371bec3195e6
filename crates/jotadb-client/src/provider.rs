//! The [`ConversationStore`] contract consumed by the inference transport
//! and the ingress.
//!
//! All operations are idempotent except [`save_message`], which is
//! append-only. Implementations report failures through the shared error
//! type; callers decide whether a failure is fatal (the transport never
//! lets a store failure cancel an ongoing stream).
//!
//! [`save_message`]: ConversationStore::save_message

use async_trait::async_trait;
use jota_domain::error::Result;

use crate::types::{Conversation, Role};

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Check a client-supplied API key against the store.
    async fn validate_client_key(&self, api_key: &str) -> Result<bool>;

    /// Fetch the active conversation for a client identifier, creating one
    /// if none exists.
    async fn get_or_create_conversation(&self, client_ref: &str) -> Result<Conversation>;

    /// Bind an engine session to a conversation.
    async fn update_conversation_session(
        &self,
        conversation_id: &str,
        session_id: &str,
    ) -> Result<()>;

    /// Append one message under a conversation.
    async fn save_message(&self, conversation_id: &str, role: Role, content: &str) -> Result<()>;

    /// Flag a conversation whose assistant response is incomplete.
    async fn mark_conversation_error(&self, conversation_id: &str) -> Result<()>;

    /// Store reachability probe.
    async fn health(&self) -> Result<bool>;
}
