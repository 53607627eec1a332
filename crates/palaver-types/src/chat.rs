//! Chat message, identity, session, and transcript record types for Palaver.
//!
//! A conversation is identified by a `chat_id` and stored as one
//! [`ChatRecord`] holding the full ordered list of [`ChatMessage`]s.
//! Records are scoped to a bot and to exactly one identity axis
//! (an authenticated user or an anonymous client).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

use crate::error::ChatError;

/// Author of a chat message.
///
/// Maps to the CHECK constraint on stored transcripts:
/// only `user` and `assistant` turns are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatRole::User => write!(f, "user"),
            ChatRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for ChatRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(ChatRole::User),
            "assistant" => Ok(ChatRole::Assistant),
            other => Err(format!("invalid chat role: '{other}'")),
        }
    }
}

/// A single message within a conversation.
///
/// Messages keep insertion order inside a [`ChatRecord`]; that order is the
/// conversation order and survives persistence round trips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Avatar shown next to assistant messages (bot avatar URL or emoji).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Set when the content was cut short (cancelled or failed stream).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub partial: bool,
}

impl ChatMessage {
    /// Create a user message stamped with the current time.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            role: ChatRole::User,
            content: content.into(),
            timestamp: Utc::now(),
            avatar: None,
            partial: false,
        }
    }

    /// Create a finished assistant message stamped with the current time.
    pub fn assistant(content: impl Into<String>, avatar: Option<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            role: ChatRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            avatar,
            partial: false,
        }
    }
}

/// The primary identity axis of a participant.
///
/// Exactly one axis identifies a conversation's owner: an authenticated
/// user id, or an anonymous client id (the resolved session token).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum ChatIdentity {
    User(String),
    Client(String),
}

impl ChatIdentity {
    /// Build an identity from optional ids. The user id wins when both are present.
    pub fn from_parts(
        user_id: Option<String>,
        client_id: Option<String>,
    ) -> Result<Self, ChatError> {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        match (non_empty(user_id), non_empty(client_id)) {
            (Some(user), _) => Ok(ChatIdentity::User(user)),
            (None, Some(client)) => Ok(ChatIdentity::Client(client)),
            (None, None) => Err(ChatError::InvalidSession(
                "either a user id or a client id is required".to_string(),
            )),
        }
    }

    /// The raw id string regardless of axis.
    pub fn key(&self) -> &str {
        match self {
            ChatIdentity::User(id) | ChatIdentity::Client(id) => id,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            ChatIdentity::User(id) => Some(id),
            ChatIdentity::Client(_) => None,
        }
    }

    pub fn client_id(&self) -> Option<&str> {
        match self {
            ChatIdentity::Client(id) => Some(id),
            ChatIdentity::User(_) => None,
        }
    }
}

impl fmt::Display for ChatIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatIdentity::User(id) => write!(f, "user:{id}"),
            ChatIdentity::Client(id) => write!(f, "client:{id}"),
        }
    }
}

/// A participant's session with one bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub session_token: String,
    pub identity: ChatIdentity,
    pub bot_id: String,
}

impl ChatSession {
    /// Create a session, validating that at least one identity axis is present.
    pub fn new(
        session_token: impl Into<String>,
        user_id: Option<String>,
        client_id: Option<String>,
        bot_id: impl Into<String>,
    ) -> Result<Self, ChatError> {
        Ok(Self {
            session_token: session_token.into(),
            identity: ChatIdentity::from_parts(user_id, client_id)?,
            bot_id: bot_id.into(),
        })
    }
}

/// A persisted conversation transcript.
///
/// Stored by full replacement on every save. `sequence_number` is strictly
/// increasing within one bot's scope across all chat ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub chat_id: String,
    pub bot_id: String,
    pub messages: Vec<ChatMessage>,
    pub sequence_number: i64,
    pub client_id: Option<String>,
    pub session_token: Option<String>,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatRecord {
    /// The identity axis this record belongs to, if any.
    pub fn identity(&self) -> Option<ChatIdentity> {
        ChatIdentity::from_parts(self.user_id.clone(), self.client_id.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_role_roundtrip() {
        for role in [ChatRole::User, ChatRole::Assistant] {
            let parsed: ChatRole = role.to_string().parse().unwrap();
            assert_eq!(role, parsed);
        }
        assert!("system".parse::<ChatRole>().is_err());
    }

    #[test]
    fn test_identity_user_wins() {
        let identity =
            ChatIdentity::from_parts(Some("u1".to_string()), Some("c1".to_string())).unwrap();
        assert_eq!(identity, ChatIdentity::User("u1".to_string()));
    }

    #[test]
    fn test_identity_requires_an_axis() {
        let err = ChatIdentity::from_parts(None, Some("  ".to_string())).unwrap_err();
        assert!(matches!(err, ChatError::InvalidSession(_)));
    }

    #[test]
    fn test_session_new() {
        let session = ChatSession::new("tok", None, Some("c1".to_string()), "b1").unwrap();
        assert_eq!(session.identity.client_id(), Some("c1"));
        assert_eq!(session.identity.user_id(), None);
        assert_eq!(session.bot_id, "b1");
    }

    #[test]
    fn test_partial_flag_omitted_when_false() {
        let msg = ChatMessage::user("hello");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("partial"));
        assert!(!json.contains("avatar"));

        let parsed: ChatMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_identity_serde_shape() {
        let identity = ChatIdentity::Client("abc".to_string());
        let json = serde_json::to_string(&identity).unwrap();
        assert_eq!(json, r#"{"kind":"client","id":"abc"}"#);
    }
}
