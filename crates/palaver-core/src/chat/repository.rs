//! ChatRecordRepository trait definition.
//!
//! A conversation is stored as one record replaced wholesale on every save.

use chrono::{DateTime, Utc};

use palaver_types::chat::{ChatIdentity, ChatRecord};
use palaver_types::error::RepositoryError;

/// Filter for listing transcripts.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFilter {
    pub identity: ChatIdentity,
    /// Restrict to one bot; `None` lists across bots.
    pub bot_id: Option<String>,
    /// Only records updated at or after this instant.
    pub updated_since: Option<DateTime<Utc>>,
}

impl RecordFilter {
    pub fn for_identity(identity: ChatIdentity) -> Self {
        Self {
            identity,
            bot_id: None,
            updated_since: None,
        }
    }

    pub fn bot(mut self, bot_id: impl Into<String>) -> Self {
        self.bot_id = Some(bot_id.into());
        self
    }

    pub fn updated_since(mut self, since: DateTime<Utc>) -> Self {
        self.updated_since = Some(since);
        self
    }

    /// Whether `record` passes this filter.
    pub fn matches(&self, record: &ChatRecord) -> bool {
        let identity_matches = match &self.identity {
            ChatIdentity::User(id) => record.user_id.as_deref() == Some(id.as_str()),
            ChatIdentity::Client(id) => {
                record.user_id.is_none() && record.client_id.as_deref() == Some(id.as_str())
            }
        };
        identity_matches
            && self
                .bot_id
                .as_deref()
                .is_none_or(|bot| record.bot_id == bot)
            && self
                .updated_since
                .is_none_or(|since| record.updated_at >= since)
    }
}

/// Repository trait for transcript persistence.
///
/// Implementations live in palaver-infra (e.g., `SqliteChatRecordRepository`).
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait ChatRecordRepository: Send + Sync {
    /// Highest sequence number stored for a bot, or 0 when it has none.
    fn max_sequence_number(
        &self,
        bot_id: &str,
    ) -> impl std::future::Future<Output = Result<i64, RepositoryError>> + Send;

    /// Insert or fully replace the record for `record.chat_id`.
    ///
    /// The stored `created_at` survives replacement and the stored sequence
    /// number never decreases. Returns the record as stored.
    fn upsert_record(
        &self,
        record: &ChatRecord,
    ) -> impl std::future::Future<Output = Result<ChatRecord, RepositoryError>> + Send;

    /// Get a record by chat id.
    fn get_record(
        &self,
        chat_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<ChatRecord>, RepositoryError>> + Send;

    /// List records matching `filter`, ordered by `updated_at` DESC.
    fn list_records(
        &self,
        filter: &RecordFilter,
    ) -> impl std::future::Future<Output = Result<Vec<ChatRecord>, RepositoryError>> + Send;

    /// Delete a record. No-op if it does not exist.
    fn delete_record(
        &self,
        chat_id: &str,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
