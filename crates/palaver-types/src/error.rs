use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::llm::LlmError;
use crate::usage::LimitType;

/// Errors surfaced by the chat engine.
#[derive(Debug, Error)]
pub enum ChatError {
    /// No session token could be persisted; callers continue in ephemeral mode.
    #[error("session identity unavailable: {0}")]
    IdentityUnavailable(String),

    #[error("provider stream failed: {0}")]
    ProviderStream(#[from] LlmError),

    #[error("{limit_type} limit of {max_usage} reached")]
    LimitExceeded {
        limit_type: LimitType,
        max_usage: u64,
        current_usage: u64,
        reset_date: Option<DateTime<Utc>>,
    },

    /// Saving the transcript failed; the in-memory conversation is intact.
    #[error("failed to persist chat: {0}")]
    Persistence(String),

    /// Only ever logged.
    #[error("failed to update context: {0}")]
    ContextUpdate(String),

    #[error("conversation '{0}' is already streaming")]
    Busy(String),

    #[error("invalid session: {0}")]
    InvalidSession(String),

    #[error("unknown bot '{0}'")]
    UnknownBot(String),
}

/// Errors from repository operations (used by trait definitions in palaver-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<RepositoryError> for ChatError {
    fn from(e: RepositoryError) -> Self {
        ChatError::Persistence(e.to_string())
    }
}
