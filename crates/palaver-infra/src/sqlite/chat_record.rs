//! SQLite chat record repository implementation.
//!
//! Implements `ChatRecordRepository` from `palaver-core` using sqlx with split
//! read/write pools. Messages are stored as one JSON array per record.

use palaver_core::chat::repository::{ChatRecordRepository, RecordFilter};
use palaver_types::chat::{ChatIdentity, ChatMessage, ChatRecord};
use palaver_types::error::RepositoryError;
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime};

const RECORD_COLUMNS: &str = "chat_id, bot_id, messages, sequence_number, client_id, session_token, user_id, created_at, updated_at";

/// SQLite-backed implementation of `ChatRecordRepository`.
pub struct SqliteChatRecordRepository {
    pool: DatabasePool,
}

impl SqliteChatRecordRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct ChatRecordRow {
    chat_id: String,
    bot_id: String,
    messages: String,
    sequence_number: i64,
    client_id: Option<String>,
    session_token: Option<String>,
    user_id: Option<String>,
    created_at: String,
    updated_at: String,
}

impl ChatRecordRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            chat_id: row.try_get("chat_id")?,
            bot_id: row.try_get("bot_id")?,
            messages: row.try_get("messages")?,
            sequence_number: row.try_get("sequence_number")?,
            client_id: row.try_get("client_id")?,
            session_token: row.try_get("session_token")?,
            user_id: row.try_get("user_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_record(self) -> Result<ChatRecord, RepositoryError> {
        let messages: Vec<ChatMessage> = serde_json::from_str(&self.messages)
            .map_err(|e| RepositoryError::Query(format!("invalid messages JSON: {e}")))?;

        Ok(ChatRecord {
            chat_id: self.chat_id,
            bot_id: self.bot_id,
            messages,
            sequence_number: self.sequence_number,
            client_id: self.client_id,
            session_token: self.session_token,
            user_id: self.user_id,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

fn map_row(row: &sqlx::sqlite::SqliteRow) -> Result<ChatRecord, RepositoryError> {
    ChatRecordRow::from_row(row)
        .map_err(|e| RepositoryError::Query(e.to_string()))?
        .into_record()
}

// ---------------------------------------------------------------------------
// ChatRecordRepository implementation
// ---------------------------------------------------------------------------

impl ChatRecordRepository for SqliteChatRecordRepository {
    async fn max_sequence_number(&self, bot_id: &str) -> Result<i64, RepositoryError> {
        let row = sqlx::query(
            "SELECT COALESCE(MAX(sequence_number), 0) AS max_seq FROM chat_records WHERE bot_id = ?",
        )
        .bind(bot_id)
        .fetch_one(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.try_get("max_seq")
            .map_err(|e| RepositoryError::Query(e.to_string()))
    }

    async fn upsert_record(&self, record: &ChatRecord) -> Result<ChatRecord, RepositoryError> {
        let messages = serde_json::to_string(&record.messages)
            .map_err(|e| RepositoryError::Query(format!("failed to serialize messages: {e}")))?;

        let sql = format!(
            r#"INSERT INTO chat_records ({RECORD_COLUMNS})
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT (chat_id) DO UPDATE SET
                   bot_id = excluded.bot_id,
                   messages = excluded.messages,
                   sequence_number = MAX(chat_records.sequence_number, excluded.sequence_number),
                   client_id = excluded.client_id,
                   session_token = excluded.session_token,
                   user_id = excluded.user_id,
                   updated_at = excluded.updated_at
               RETURNING {RECORD_COLUMNS}"#
        );

        let row = sqlx::query(&sql)
            .bind(&record.chat_id)
            .bind(&record.bot_id)
            .bind(&messages)
            .bind(record.sequence_number)
            .bind(&record.client_id)
            .bind(&record.session_token)
            .bind(&record.user_id)
            .bind(format_datetime(&record.created_at))
            .bind(format_datetime(&record.updated_at))
            .fetch_one(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        map_row(&row)
    }

    async fn get_record(&self, chat_id: &str) -> Result<Option<ChatRecord>, RepositoryError> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM chat_records WHERE chat_id = ?");
        let row = sqlx::query(&sql)
            .bind(chat_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.as_ref().map(map_row).transpose()
    }

    async fn list_records(&self, filter: &RecordFilter) -> Result<Vec<ChatRecord>, RepositoryError> {
        let (kind, id) = match &filter.identity {
            ChatIdentity::User(id) => ("user", id.as_str()),
            ChatIdentity::Client(id) => ("client", id.as_str()),
        };
        let sql = format!(
            r#"SELECT {RECORD_COLUMNS} FROM chat_records
               WHERE ((?1 = 'user' AND user_id = ?2)
                   OR (?1 = 'client' AND user_id IS NULL AND client_id = ?2))
                 AND (?3 IS NULL OR bot_id = ?3)
                 AND (?4 IS NULL OR updated_at >= ?4)
               ORDER BY updated_at DESC, chat_id ASC"#
        );

        let rows = sqlx::query(&sql)
            .bind(kind)
            .bind(id)
            .bind(filter.bot_id.as_deref())
            .bind(filter.updated_since.as_ref().map(format_datetime))
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows.iter().map(map_row).collect()
    }

    async fn delete_record(&self, chat_id: &str) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM chat_records WHERE chat_id = ?")
            .bind(chat_id)
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }
}
