//! In-memory storage backends.
//!
//! Non-durable implementations of [`KeyValueStore`], [`ChatRecordRepository`]
//! and [`ContextRepository`]. Each can be switched into a failing mode to
//! exercise error paths.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};

use palaver_types::chat::ChatRecord;
use palaver_types::context::UserContext;
use palaver_types::error::RepositoryError;

use crate::chat::repository::{ChatRecordRepository, RecordFilter};
use crate::context::repository::ContextRepository;

use super::kv_store::{KeyValueStore, expiry_from_now};

fn poisoned<T>(_: T) -> RepositoryError {
    RepositoryError::Query("lock poisoned".to_string())
}

fn check(failing: &AtomicBool) -> Result<(), RepositoryError> {
    if failing.load(Ordering::SeqCst) {
        Err(RepositoryError::Connection)
    } else {
        Ok(())
    }
}

/// In-memory [`KeyValueStore`] with expiry.
#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    entries: RwLock<HashMap<String, (String, Option<DateTime<Utc>>)>>,
    failing: AtomicBool,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`RepositoryError::Connection`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        check(&self.failing)?;
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.get(key).and_then(|(value, expires_at)| match expires_at {
            Some(at) if *at <= Utc::now() => None,
            _ => Some(value.clone()),
        }))
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), RepositoryError> {
        check(&self.failing)?;
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries.insert(key.to_string(), (value.to_string(), expiry_from_now(ttl)));
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), RepositoryError> {
        check(&self.failing)?;
        self.entries.write().map_err(poisoned)?.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), RepositoryError> {
        check(&self.failing)?;
        self.entries.write().map_err(poisoned)?.clear();
        Ok(())
    }
}

/// In-memory [`ChatRecordRepository`].
#[derive(Debug, Default)]
pub struct InMemoryChatRecordRepository {
    records: RwLock<HashMap<String, ChatRecord>>,
    failing: AtomicBool,
}

impl InMemoryChatRecordRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl ChatRecordRepository for InMemoryChatRecordRepository {
    async fn max_sequence_number(&self, bot_id: &str) -> Result<i64, RepositoryError> {
        check(&self.failing)?;
        let records = self.records.read().map_err(poisoned)?;
        Ok(records
            .values()
            .filter(|r| r.bot_id == bot_id)
            .map(|r| r.sequence_number)
            .max()
            .unwrap_or(0))
    }

    async fn upsert_record(&self, record: &ChatRecord) -> Result<ChatRecord, RepositoryError> {
        check(&self.failing)?;
        let mut records = self.records.write().map_err(poisoned)?;
        let mut stored = record.clone();
        if let Some(existing) = records.get(&record.chat_id) {
            stored.created_at = existing.created_at;
            stored.sequence_number = stored.sequence_number.max(existing.sequence_number);
        }
        records.insert(stored.chat_id.clone(), stored.clone());
        Ok(stored)
    }

    async fn get_record(&self, chat_id: &str) -> Result<Option<ChatRecord>, RepositoryError> {
        check(&self.failing)?;
        Ok(self.records.read().map_err(poisoned)?.get(chat_id).cloned())
    }

    async fn list_records(&self, filter: &RecordFilter) -> Result<Vec<ChatRecord>, RepositoryError> {
        check(&self.failing)?;
        let records = self.records.read().map_err(poisoned)?;
        let mut matching: Vec<ChatRecord> = records
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.chat_id.cmp(&b.chat_id))
        });
        Ok(matching)
    }

    async fn delete_record(&self, chat_id: &str) -> Result<(), RepositoryError> {
        check(&self.failing)?;
        self.records.write().map_err(poisoned)?.remove(chat_id);
        Ok(())
    }
}

/// In-memory [`ContextRepository`].
#[derive(Debug, Default)]
pub struct InMemoryContextRepository {
    contexts: RwLock<HashMap<(String, String), UserContext>>,
    failing: AtomicBool,
}

impl InMemoryContextRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl ContextRepository for InMemoryContextRepository {
    async fn get_context(
        &self,
        bot_id: &str,
        client_id: &str,
    ) -> Result<Option<UserContext>, RepositoryError> {
        check(&self.failing)?;
        let contexts = self.contexts.read().map_err(poisoned)?;
        Ok(contexts
            .get(&(bot_id.to_string(), client_id.to_string()))
            .cloned())
    }

    async fn upsert_context(
        &self,
        bot_id: &str,
        client_id: &str,
        context: &UserContext,
    ) -> Result<(), RepositoryError> {
        check(&self.failing)?;
        self.contexts
            .write()
            .map_err(poisoned)?
            .insert((bot_id.to_string(), client_id.to_string()), context.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_types::chat::{ChatIdentity, ChatMessage};

    fn record(chat_id: &str, bot_id: &str, seq: i64) -> ChatRecord {
        let now = Utc::now();
        ChatRecord {
            chat_id: chat_id.to_string(),
            bot_id: bot_id.to_string(),
            messages: vec![ChatMessage::user("hi")],
            sequence_number: seq,
            client_id: Some("c1".to_string()),
            session_token: Some("c1".to_string()),
            user_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_kv_expired_entry_is_absent() {
        let store = InMemoryKeyValueStore::new();
        store.set("a", "1", None).await.unwrap();
        store.set("b", "2", Some(Duration::ZERO)).await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));
        assert!(store.get("b").await.unwrap().is_none());

        store.clear().await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_kv_failing_mode() {
        let store = InMemoryKeyValueStore::new();
        store.set_failing(true);
        assert!(store.set("a", "1", None).await.is_err());
    }

    #[tokio::test]
    async fn test_upsert_preserves_created_at_and_max_sequence() {
        let repo = InMemoryChatRecordRepository::new();
        let first = record("chat-1", "b1", 5);
        repo.upsert_record(&first).await.unwrap();

        let mut second = record("chat-1", "b1", 3);
        second.created_at = first.created_at + chrono::Duration::hours(1);
        let stored = repo.upsert_record(&second).await.unwrap();

        assert_eq!(stored.created_at, first.created_at);
        assert_eq!(stored.sequence_number, 5);
        assert_eq!(repo.max_sequence_number("b1").await.unwrap(), 5);
        assert_eq!(repo.max_sequence_number("b2").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_filters_by_identity_and_bot() {
        let repo = InMemoryChatRecordRepository::new();
        repo.upsert_record(&record("chat-1", "b1", 1)).await.unwrap();
        repo.upsert_record(&record("chat-2", "b2", 1)).await.unwrap();

        let all = repo
            .list_records(&RecordFilter::for_identity(ChatIdentity::Client(
                "c1".to_string(),
            )))
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let b1 = repo
            .list_records(
                &RecordFilter::for_identity(ChatIdentity::Client("c1".to_string())).bot("b1"),
            )
            .await
            .unwrap();
        assert_eq!(b1.len(), 1);
        assert_eq!(b1[0].chat_id, "chat-1");

        let other = repo
            .list_records(&RecordFilter::for_identity(ChatIdentity::User(
                "c1".to_string(),
            )))
            .await
            .unwrap();
        assert!(other.is_empty());
    }
}
