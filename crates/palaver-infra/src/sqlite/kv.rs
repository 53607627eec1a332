//! SQLite key-value store implementation.
//!
//! Implements `KeyValueStore` from `palaver-core`. Expiry is stored as an
//! absolute timestamp; expired rows read as missing and are purged on write.

use std::time::Duration;

use chrono::Utc;
use palaver_core::storage::kv_store::{KeyValueStore, expiry_from_now};
use palaver_types::error::RepositoryError;
use sqlx::Row;

use super::format_datetime;
use super::pool::DatabasePool;

/// SQLite-backed implementation of `KeyValueStore`.
#[derive(Clone)]
pub struct SqliteKeyValueStore {
    pool: DatabasePool,
}

impl SqliteKeyValueStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Delete expired entries. Returns the number removed.
    pub async fn purge_expired(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM kv_store WHERE expires_at IS NOT NULL AND expires_at <= ?")
            .bind(format_datetime(&Utc::now()))
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(result.rows_affected())
    }
}

impl KeyValueStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        let row = sqlx::query(
            "SELECT value FROM kv_store WHERE key = ? AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(key)
        .bind(format_datetime(&Utc::now()))
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.map(|row| row.try_get("value"))
            .transpose()
            .map_err(|e| RepositoryError::Query(e.to_string()))
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), RepositoryError> {
        self.purge_expired().await?;

        let now = format_datetime(&Utc::now());
        let expires_at = expiry_from_now(ttl).map(|at| format_datetime(&at));

        sqlx::query(
            r#"INSERT INTO kv_store (key, value, expires_at, updated_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT (key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at, updated_at = excluded.updated_at"#,
        )
        .bind(key)
        .bind(value)
        .bind(&expires_at)
        .bind(&now)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM kv_store")
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::database_url;

    async fn store() -> (SqliteKeyValueStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = DatabasePool::new(&database_url(dir.path())).await.unwrap();
        (SqliteKeyValueStore::new(pool), dir)
    }

    #[tokio::test]
    async fn test_set_get_overwrite_remove() {
        let (kv, _dir) = store().await;
        assert!(kv.get("token").await.unwrap().is_none());

        kv.set("token", "abc", None).await.unwrap();
        assert_eq!(kv.get("token").await.unwrap().as_deref(), Some("abc"));

        kv.set("token", "def", Some(Duration::from_secs(3600))).await.unwrap();
        assert_eq!(kv.get("token").await.unwrap().as_deref(), Some("def"));

        kv.remove("token").await.unwrap();
        assert!(kv.get("token").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_value_reads_as_missing() {
        let (kv, _dir) = store().await;
        kv.set("short", "x", Some(Duration::ZERO)).await.unwrap();
        assert!(kv.get("short").await.unwrap().is_none());
        assert_eq!(kv.purge_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let (kv, _dir) = store().await;
        kv.set("a", "1", None).await.unwrap();
        kv.set("b", "2", None).await.unwrap();
        kv.clear().await.unwrap();
        assert!(kv.get("a").await.unwrap().is_none());
        assert!(kv.get("b").await.unwrap().is_none());
    }
}
