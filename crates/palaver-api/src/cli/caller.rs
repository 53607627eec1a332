//! Who the CLI acts as.
//!
//! Without `--user` the CLI is an anonymous client whose session token is
//! kept in the local SQLite key-value store, so history and quotas follow
//! the machine across runs.

use clap::Args;

use palaver_types::chat::ChatSession;
use palaver_types::error::ChatError;
use palaver_types::identity::{Principal, ResolvedIdentity, SessionContext};
use palaver_types::usage::UserRole;

use crate::state::AppState;

#[derive(Debug, Clone, Default, Args)]
pub struct CallerArgs {
    /// Act as an authenticated user id.
    #[arg(long)]
    pub user: Option<String>,

    /// Role used for quota lookup (requires --user).
    #[arg(long, requires = "user")]
    pub role: Option<UserRole>,
}

impl CallerArgs {
    /// Role used for quota lookup.
    pub fn role(&self) -> UserRole {
        match (&self.user, self.role) {
            (Some(_), Some(role)) => role,
            (Some(_), None) => UserRole::User,
            (None, _) => UserRole::Anonymous,
        }
    }

    pub fn session_context(&self, persist_session: bool) -> SessionContext {
        match &self.user {
            Some(id) => SessionContext::authenticated(
                Principal {
                    id: id.clone(),
                    role: self.role(),
                },
                persist_session.into(),
            ),
            None => SessionContext::anonymous(persist_session.into()),
        }
    }

    /// Resolve the session token for this caller.
    pub async fn resolve(&self, state: &AppState) -> ResolvedIdentity {
        let ctx = self.session_context(state.config.chat.persist_session);
        state.identity.resolve(&ctx).await
    }
}

/// Chat session for `bot_id` from a resolved identity.
pub fn chat_session(resolved: &ResolvedIdentity, bot_id: &str) -> Result<ChatSession, ChatError> {
    ChatSession::new(
        resolved.token.clone(),
        resolved.user_id.clone(),
        Some(resolved.token.clone()),
        bot_id,
    )
}
