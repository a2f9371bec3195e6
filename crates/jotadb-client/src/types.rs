//! Request/response DTOs for the JotaDB API.

use serde::{Deserialize, Serialize};

/// A durable conversation aggregate, as returned by JotaDB.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    /// Engine session currently bound to this conversation, if any.
    #[serde(default)]
    pub inference_session_id: Option<String>,
}

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidateKeyRequest {
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidateKeyResponse {
    pub valid: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationRequest {
    /// Client-supplied end-user identifier the conversation is grouped under.
    pub client_ref: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inference_session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageRequest {
    pub role: Role,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        assert_eq!(Role::User.to_string(), "user");
    }

    #[test]
    fn conversation_session_id_optional() {
        let conv: Conversation = serde_json::from_str(r#"{"id":"c1"}"#).unwrap();
        assert!(conv.inference_session_id.is_none());

        let conv: Conversation =
            serde_json::from_str(r#"{"id":"c1","inference_session_id":"s1"}"#).unwrap();
        assert_eq!(conv.inference_session_id.as_deref(), Some("s1"));
    }

    #[test]
    fn patch_skips_absent_fields() {
        let patch = ConversationPatch {
            inference_session_id: None,
            status: Some("error".into()),
        };
        assert_eq!(serde_json::to_string(&patch).unwrap(), r#"{"status":"error"}"#);
    }
}
