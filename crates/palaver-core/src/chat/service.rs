//! History persistence service.
//!
//! HistoryService stores each conversation as one record, replaced wholesale
//! on every save, and allocates per-bot sequence numbers. Allocation is
//! read-then-write; the number is advisory and only used for ordering.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use palaver_types::chat::{ChatIdentity, ChatMessage, ChatRecord, ChatSession};
use palaver_types::error::ChatError;

use super::repository::{ChatRecordRepository, RecordFilter};

pub struct HistoryService<R: ChatRecordRepository> {
    repo: Arc<R>,
}

impl<R: ChatRecordRepository> Clone for HistoryService<R> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
        }
    }
}

impl<R: ChatRecordRepository> HistoryService<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// Access the record repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    /// Save the full transcript for `chat_id`.
    ///
    /// Failures come back as [`ChatError::Persistence`]; the caller's
    /// in-memory transcript is untouched either way.
    pub async fn save(
        &self,
        chat_id: &str,
        bot_id: &str,
        messages: &[ChatMessage],
        session: &ChatSession,
    ) -> Result<ChatRecord, ChatError> {
        let result = self.try_save(chat_id, bot_id, messages, session).await;
        match &result {
            Ok(record) => info!(
                chat_id,
                bot_id,
                sequence_number = record.sequence_number,
                messages = record.messages.len(),
                "transcript saved"
            ),
            Err(e) => warn!(chat_id, bot_id, error = %e, "transcript save failed"),
        }
        result
    }

    async fn try_save(
        &self,
        chat_id: &str,
        bot_id: &str,
        messages: &[ChatMessage],
        session: &ChatSession,
    ) -> Result<ChatRecord, ChatError> {
        let sequence_number = self.repo.max_sequence_number(bot_id).await? + 1;
        let now = Utc::now();
        let record = ChatRecord {
            chat_id: chat_id.to_string(),
            bot_id: bot_id.to_string(),
            messages: messages.to_vec(),
            sequence_number,
            client_id: session.identity.client_id().map(str::to_string),
            session_token: Some(session.session_token.clone()),
            user_id: session.identity.user_id().map(str::to_string),
            created_at: now,
            updated_at: now,
        };
        Ok(self.repo.upsert_record(&record).await?)
    }

    /// Load one transcript, e.g. to continue a conversation.
    pub async fn get(&self, chat_id: &str) -> Result<Option<ChatRecord>, ChatError> {
        Ok(self.repo.get_record(chat_id).await?)
    }

    /// All transcripts for an identity, newest first by creation time.
    pub async fn list_for(
        &self,
        identity: &ChatIdentity,
        bot_id: Option<&str>,
    ) -> Result<Vec<ChatRecord>, ChatError> {
        let mut filter = RecordFilter::for_identity(identity.clone());
        if let Some(bot_id) = bot_id {
            filter = filter.bot(bot_id);
        }
        let mut records = self.repo.list_records(&filter).await?;
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.chat_id.cmp(&b.chat_id))
        });
        Ok(records)
    }

    /// Delete a transcript at the user's explicit request.
    ///
    /// The exchange flow never deletes records; only the history and chat
    /// surfaces call this.
    pub async fn delete(&self, chat_id: &str) -> Result<(), ChatError> {
        self.repo.delete_record(chat_id).await?;
        info!(chat_id, "transcript deleted");
        Ok(())
    }
}
