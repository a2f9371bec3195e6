//! Engine protocol: the `op`-tagged JSON frames exchanged with the
//! Inference Engine over a WebSocket text stream.
//!
//! One enum covers both directions. `auth`, `create_session`, `infer`, and
//! `abort` go client → engine; `hello`, `auth_success`, `session_created`,
//! `token`, `end`, and `error` come back. A frame that fails to decode never
//! tears down the connection — the read pump logs it and moves on.

use serde::{Deserialize, Serialize};

/// Wire frame envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum EngineFrame {
    /// Client → Engine: first frame after connect.
    #[serde(rename = "auth")]
    Auth {
        client_id: String,
        api_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        jota_db_url: Option<String>,
    },

    /// Client → Engine: request a fresh engine-side session.
    ///
    /// The protocol carries no correlation id, so at most one of these may
    /// be outstanding at a time; the next `session_created` answers it.
    #[serde(rename = "create_session")]
    CreateSession,

    /// Client → Engine: run one inference on an existing session.
    #[serde(rename = "infer")]
    Infer {
        session_id: String,
        prompt: String,
        params: serde_json::Value,
    },

    /// Client → Engine: best-effort cancellation of a session.
    #[serde(rename = "abort")]
    Abort { session_id: String },

    /// Engine → Client: informational greeting.
    #[serde(rename = "hello")]
    Hello {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Engine → Client: the auth handshake succeeded.
    #[serde(rename = "auth_success")]
    AuthSuccess {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Engine → Client: answers the most recent `create_session`.
    #[serde(rename = "session_created")]
    SessionCreated { session_id: String },

    /// Engine → Client: one generated fragment.
    #[serde(rename = "token")]
    Token { session_id: String, content: String },

    /// Engine → Client: terminates a token stream.
    #[serde(rename = "end")]
    End { session_id: String },

    /// Engine → Client: terminates auth, session creation, or an in-flight
    /// inference. The payload key is `message` on some engine builds and
    /// `content` on others; both are accepted.
    #[serde(rename = "error")]
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        #[serde(default, alias = "content")]
        message: Option<String>,
    },
}

impl EngineFrame {
    /// The session this frame belongs to, if any.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            EngineFrame::Infer { session_id, .. }
            | EngineFrame::Abort { session_id }
            | EngineFrame::SessionCreated { session_id }
            | EngineFrame::Token { session_id, .. }
            | EngineFrame::End { session_id } => Some(session_id),
            EngineFrame::Error { session_id, .. } => session_id.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_serializes_with_op_tag() {
        let frame = EngineFrame::Auth {
            client_id: "jota".into(),
            api_key: "secret".into(),
            jota_db_url: Some("http://db:9003".into()),
        };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&frame).unwrap()).unwrap();
        assert_eq!(json["op"], "auth");
        assert_eq!(json["client_id"], "jota");
        assert_eq!(json["jota_db_url"], "http://db:9003");
    }

    #[test]
    fn auth_omits_absent_db_url() {
        let frame = EngineFrame::Auth {
            client_id: "jota".into(),
            api_key: "secret".into(),
            jota_db_url: None,
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(!json.contains("jota_db_url"));
    }

    #[test]
    fn create_session_is_bare() {
        let json = serde_json::to_string(&EngineFrame::CreateSession).unwrap();
        assert_eq!(json, r#"{"op":"create_session"}"#);
    }

    #[test]
    fn token_roundtrip() {
        let parsed: EngineFrame =
            serde_json::from_str(r#"{"op":"token","session_id":"s1","content":"Hi"}"#).unwrap();
        match parsed {
            EngineFrame::Token {
                session_id,
                content,
            } => {
                assert_eq!(session_id, "s1");
                assert_eq!(content, "Hi");
            }
            other => panic!("expected Token, got {other:?}"),
        }
    }

    #[test]
    fn error_accepts_message_key() {
        let parsed: EngineFrame =
            serde_json::from_str(r#"{"op":"error","message":"boom"}"#).unwrap();
        match parsed {
            EngineFrame::Error {
                session_id,
                message,
            } => {
                assert!(session_id.is_none());
                assert_eq!(message.as_deref(), Some("boom"));
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn error_accepts_content_key() {
        let parsed: EngineFrame =
            serde_json::from_str(r#"{"op":"error","session_id":"s1","content":"boom"}"#).unwrap();
        match parsed {
            EngineFrame::Error {
                session_id,
                message,
            } => {
                assert_eq!(session_id.as_deref(), Some("s1"));
                assert_eq!(message.as_deref(), Some("boom"));
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn auth_success_tolerates_extra_fields() {
        let parsed: EngineFrame = serde_json::from_str(
            r#"{"op":"auth_success","client_id":"jota","quota":{"daily":1000}}"#,
        )
        .unwrap();
        assert!(matches!(parsed, EngineFrame::AuthSuccess { .. }));
    }

    #[test]
    fn unknown_op_fails_to_decode() {
        let parsed = serde_json::from_str::<EngineFrame>(r#"{"op":"telemetry","cpu":0.5}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn session_id_accessor() {
        let end: EngineFrame = serde_json::from_str(r#"{"op":"end","session_id":"s9"}"#).unwrap();
        assert_eq!(end.session_id(), Some("s9"));
        let hello: EngineFrame = serde_json::from_str(r#"{"op":"hello"}"#).unwrap();
        assert_eq!(hello.session_id(), None);
    }
}
