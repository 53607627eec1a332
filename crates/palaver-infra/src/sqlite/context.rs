//! SQLite user context repository implementation.
//!
//! One JSON document per `(bot_id, client_id)`, upserted on the composite key.

use chrono::Utc;
use palaver_core::context::repository::ContextRepository;
use palaver_types::context::UserContext;
use palaver_types::error::RepositoryError;
use sqlx::Row;

use super::format_datetime;
use super::pool::DatabasePool;

/// SQLite-backed implementation of `ContextRepository`.
pub struct SqliteContextRepository {
    pool: DatabasePool,
}

impl SqliteContextRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

impl ContextRepository for SqliteContextRepository {
    async fn get_context(
        &self,
        bot_id: &str,
        client_id: &str,
    ) -> Result<Option<UserContext>, RepositoryError> {
        let row = sqlx::query("SELECT context FROM user_contexts WHERE bot_id = ? AND client_id = ?")
            .bind(bot_id)
            .bind(client_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let json: String = row
                    .try_get("context")
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                let context = serde_json::from_str(&json)
                    .map_err(|e| RepositoryError::Query(format!("invalid context JSON: {e}")))?;
                Ok(Some(context))
            }
            None => Ok(None),
        }
    }

    async fn upsert_context(
        &self,
        bot_id: &str,
        client_id: &str,
        context: &UserContext,
    ) -> Result<(), RepositoryError> {
        let now = format_datetime(&Utc::now());
        let json = serde_json::to_string(context)
            .map_err(|e| RepositoryError::Query(format!("failed to serialize context: {e}")))?;

        sqlx::query(
            r#"INSERT INTO user_contexts (bot_id, client_id, context, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT (bot_id, client_id) DO UPDATE SET context = excluded.context, updated_at = excluded.updated_at"#,
        )
        .bind(bot_id)
        .bind(client_id)
        .bind(&json)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }
}
