//! ContextRepository trait definition.

use palaver_types::context::UserContext;
use palaver_types::error::RepositoryError;

/// Persistence for per-(bot, client) context documents.
///
/// Implementations live in palaver-infra (e.g., `SqliteContextRepository`).
pub trait ContextRepository: Send + Sync {
    /// Get the stored context, if any.
    fn get_context(
        &self,
        bot_id: &str,
        client_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<UserContext>, RepositoryError>> + Send;

    /// Insert or replace the context document.
    fn upsert_context(
        &self,
        bot_id: &str,
        client_id: &str,
        context: &UserContext,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
