//! UsageGate -- computes usage from stored transcripts and checks quotas.
//!
//! There is no running counter: usage is aggregated on demand from the
//! transcripts in the current reset window. Checks are best effort; two
//! concurrent sends may both pass a nearly exhausted quota.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use palaver_types::chat::{ChatIdentity, ChatMessage, ChatRecord, ChatRole};
use palaver_types::error::ChatError;
use palaver_types::usage::{LimitCheck, LimitType, UsageLimit, UsageQuota, UserRole};

use super::window::{UsageWindow, current_window};
use crate::chat::repository::{ChatRecordRepository, RecordFilter};

/// Limit types in reporting priority order.
const LIMIT_TYPES: [LimitType; 2] = [LimitType::Messages, LimitType::Tokens];

/// Rough token estimate: one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

/// Usage of `limit_type` across `records` within `window`.
pub fn measure(records: &[ChatRecord], limit_type: LimitType, window: &UsageWindow) -> u64 {
    let in_window = |m: &&ChatMessage| window.contains(m.timestamp);
    let messages = records.iter().flat_map(|r| r.messages.iter()).filter(in_window);
    match limit_type {
        LimitType::Messages => messages.filter(|m| m.role == ChatRole::User).count() as u64,
        LimitType::Tokens => messages.map(|m| estimate_tokens(&m.content)).sum(),
    }
}

/// Reduce per-quota usage into a single check result.
///
/// The first exceeded limit wins; otherwise the limit closest to its maximum.
pub fn summarize(limits: &[UsageLimit]) -> LimitCheck {
    if let Some(exceeded) = limits.iter().find(|l| l.is_exceeded()) {
        return LimitCheck::from(exceeded);
    }
    limits
        .iter()
        .reduce(|best, candidate| {
            // Compare current/max ratios without floating point.
            let best_ratio = u128::from(best.current_usage) * u128::from(candidate.max_usage);
            let candidate_ratio =
                u128::from(candidate.current_usage) * u128::from(best.max_usage);
            if candidate_ratio > best_ratio {
                candidate
            } else {
                best
            }
        })
        .map(LimitCheck::from)
        .unwrap_or_else(LimitCheck::unlimited)
}

pub struct UsageGate<R: ChatRecordRepository> {
    repo: Arc<R>,
    quotas: Vec<UsageQuota>,
    anchor: DateTime<Utc>,
}

impl<R: ChatRecordRepository> Clone for UsageGate<R> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
            quotas: self.quotas.clone(),
            anchor: self.anchor,
        }
    }
}

impl<R: ChatRecordRepository> UsageGate<R> {
    pub fn new(repo: Arc<R>, quotas: Vec<UsageQuota>, anchor: DateTime<Utc>) -> Self {
        Self {
            repo,
            quotas,
            anchor,
        }
    }

    /// Quotas that apply to `(bot_id, role)`, at most one per limit type.
    ///
    /// A bot-specific quota replaces the global default for the same type.
    pub fn applicable_quotas(&self, bot_id: &str, role: UserRole) -> Vec<&UsageQuota> {
        LIMIT_TYPES
            .iter()
            .filter_map(|&limit_type| {
                let matching = |q: &&UsageQuota| q.role == role && q.limit_type == limit_type;
                self.quotas
                    .iter()
                    .filter(matching)
                    .find(|q| q.bot_id.as_deref() == Some(bot_id))
                    .or_else(|| {
                        self.quotas
                            .iter()
                            .filter(matching)
                            .find(|q| q.bot_id.is_none())
                    })
            })
            .collect()
    }

    /// Usage against every applicable quota at `now`.
    pub async fn limits_at(
        &self,
        identity: &ChatIdentity,
        bot_id: &str,
        role: UserRole,
        now: DateTime<Utc>,
    ) -> Result<Vec<UsageLimit>, ChatError> {
        let mut limits = Vec::new();
        for quota in self.applicable_quotas(bot_id, role) {
            let window = current_window(quota.reset_period, self.anchor, now);

            let mut filter = RecordFilter::for_identity(identity.clone());
            if quota.bot_id.is_some() {
                filter = filter.bot(bot_id);
            }
            if let Some(start) = window.start {
                filter = filter.updated_since(start);
            }
            let records = self.repo.list_records(&filter).await?;

            limits.push(UsageLimit {
                limit_type: quota.limit_type,
                max_usage: quota.max_usage,
                reset_period: quota.reset_period,
                reset_date: window.reset_date,
                current_usage: measure(&records, quota.limit_type, &window),
            });
        }
        Ok(limits)
    }

    pub async fn limits(
        &self,
        identity: &ChatIdentity,
        bot_id: &str,
        role: UserRole,
    ) -> Result<Vec<UsageLimit>, ChatError> {
        self.limits_at(identity, bot_id, role, Utc::now()).await
    }

    /// Check whether `identity` may send another message to `bot_id`.
    pub async fn check_limit(
        &self,
        identity: &ChatIdentity,
        bot_id: &str,
        role: UserRole,
    ) -> Result<LimitCheck, ChatError> {
        self.check_limit_at(identity, bot_id, role, Utc::now()).await
    }

    pub async fn check_limit_at(
        &self,
        identity: &ChatIdentity,
        bot_id: &str,
        role: UserRole,
        now: DateTime<Utc>,
    ) -> Result<LimitCheck, ChatError> {
        let limits = self.limits_at(identity, bot_id, role, now).await?;
        let check = summarize(&limits);
        debug!(
            identity = %identity,
            bot_id,
            limit_type = %check.limit_type,
            current_usage = check.current_usage,
            max_usage = check.max_usage,
            exceeded = check.exceeded,
            "usage checked"
        );
        Ok(check)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryChatRecordRepository;
    use chrono::{TimeDelta, TimeZone};
    use palaver_types::usage::ResetPeriod;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn anchor() -> DateTime<Utc> {
        at(2024, 1, 1, 0)
    }

    fn quota(bot_id: Option<&str>, limit_type: LimitType, max: u64) -> UsageQuota {
        UsageQuota {
            bot_id: bot_id.map(str::to_string),
            role: UserRole::Anonymous,
            limit_type,
            max_usage: max,
            reset_period: ResetPeriod::Daily,
        }
    }

    fn message(role: ChatRole, content: &str, timestamp: DateTime<Utc>) -> ChatMessage {
        ChatMessage {
            role,
            timestamp,
            ..ChatMessage::user(content)
        }
    }

    async fn store(
        repo: &InMemoryChatRecordRepository,
        chat_id: &str,
        bot_id: &str,
        messages: Vec<ChatMessage>,
    ) {
        let updated_at = messages.iter().map(|m| m.timestamp).max().unwrap();
        repo.upsert_record(&ChatRecord {
            chat_id: chat_id.to_string(),
            bot_id: bot_id.to_string(),
            messages,
            sequence_number: 1,
            client_id: Some("c1".to_string()),
            session_token: Some("c1".to_string()),
            user_id: None,
            created_at: updated_at,
            updated_at,
        })
        .await
        .unwrap();
    }

    fn client() -> ChatIdentity {
        ChatIdentity::Client("c1".to_string())
    }

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[tokio::test]
    async fn test_no_quota_is_unlimited() {
        let gate = UsageGate::new(Arc::new(InMemoryChatRecordRepository::new()), vec![], anchor());
        let check = gate
            .check_limit_at(&client(), "b1", UserRole::Anonymous, at(2024, 3, 10, 12))
            .await
            .unwrap();
        assert!(!check.exceeded);
        assert_eq!(check, LimitCheck::unlimited());
    }

    #[tokio::test]
    async fn test_exceeded_at_max_with_reset_date() {
        let repo = Arc::new(InMemoryChatRecordRepository::new());
        let now = at(2024, 3, 10, 12);
        store(
            &repo,
            "chat-1",
            "b1",
            vec![
                message(ChatRole::User, "one", now - TimeDelta::hours(3)),
                message(ChatRole::Assistant, "reply", now - TimeDelta::hours(3)),
                message(ChatRole::User, "two", now - TimeDelta::hours(1)),
            ],
        )
        .await;

        let gate = UsageGate::new(
            Arc::clone(&repo),
            vec![quota(None, LimitType::Messages, 2)],
            anchor(),
        );
        let check = gate
            .check_limit_at(&client(), "b1", UserRole::Anonymous, now)
            .await
            .unwrap();
        assert!(check.exceeded);
        assert_eq!(check.current_usage, 2);
        assert_eq!(check.max_usage, 2);
        assert_eq!(check.reset_date, Some(at(2024, 3, 11, 0)));

        let gate = UsageGate::new(repo, vec![quota(None, LimitType::Messages, 3)], anchor());
        let check = gate
            .check_limit_at(&client(), "b1", UserRole::Anonymous, now)
            .await
            .unwrap();
        assert!(!check.exceeded);
    }

    #[tokio::test]
    async fn test_messages_outside_window_not_counted() {
        let repo = Arc::new(InMemoryChatRecordRepository::new());
        let now = at(2024, 3, 10, 12);
        store(
            &repo,
            "chat-1",
            "b1",
            vec![
                message(ChatRole::User, "yesterday", at(2024, 3, 9, 22)),
                message(ChatRole::User, "today", at(2024, 3, 10, 1)),
            ],
        )
        .await;

        let gate = UsageGate::new(repo, vec![quota(None, LimitType::Messages, 5)], anchor());
        let check = gate
            .check_limit_at(&client(), "b1", UserRole::Anonymous, now)
            .await
            .unwrap();
        assert_eq!(check.current_usage, 1);
    }

    #[tokio::test]
    async fn test_bot_quota_overrides_global_and_scopes_records() {
        let repo = Arc::new(InMemoryChatRecordRepository::new());
        let now = at(2024, 3, 10, 12);
        store(&repo, "chat-1", "b1", vec![message(ChatRole::User, "x", now)]).await;
        store(&repo, "chat-2", "b2", vec![message(ChatRole::User, "y", now)]).await;

        let gate = UsageGate::new(
            repo,
            vec![
                quota(None, LimitType::Messages, 2),
                quota(Some("b1"), LimitType::Messages, 10),
            ],
            anchor(),
        );

        let b1 = gate
            .check_limit_at(&client(), "b1", UserRole::Anonymous, now)
            .await
            .unwrap();
        assert_eq!(b1.max_usage, 10);
        assert_eq!(b1.current_usage, 1);

        let b2 = gate
            .check_limit_at(&client(), "b2", UserRole::Anonymous, now)
            .await
            .unwrap();
        assert_eq!(b2.max_usage, 2);
        assert_eq!(b2.current_usage, 2);
        assert!(b2.exceeded);
    }

    #[tokio::test]
    async fn test_role_mismatch_is_unlimited() {
        let gate = UsageGate::new(
            Arc::new(InMemoryChatRecordRepository::new()),
            vec![quota(None, LimitType::Messages, 0)],
            anchor(),
        );
        let check = gate
            .check_limit_at(&client(), "b1", UserRole::Admin, at(2024, 3, 10, 12))
            .await
            .unwrap();
        assert!(!check.exceeded);
    }

    #[tokio::test]
    async fn test_tokens_count_all_roles() {
        let repo = Arc::new(InMemoryChatRecordRepository::new());
        let now = at(2024, 3, 10, 12);
        store(
            &repo,
            "chat-1",
            "b1",
            vec![
                message(ChatRole::User, "12345678", now),
                message(ChatRole::Assistant, "123456789", now),
            ],
        )
        .await;

        let gate = UsageGate::new(
            repo,
            vec![
                quota(None, LimitType::Messages, 100),
                quota(None, LimitType::Tokens, 6),
            ],
            anchor(),
        );
        let limits = gate
            .limits_at(&client(), "b1", UserRole::Anonymous, now)
            .await
            .unwrap();
        assert_eq!(limits.len(), 2);
        assert_eq!(limits[1].current_usage, 5);

        let check = summarize(&limits);
        assert_eq!(check.limit_type, LimitType::Tokens);
        assert!(!check.exceeded);
    }

    #[test]
    fn test_summarize_prefers_first_exceeded() {
        let limit = |limit_type, current, max| UsageLimit {
            limit_type,
            max_usage: max,
            reset_period: ResetPeriod::Daily,
            reset_date: None,
            current_usage: current,
        };
        let check = summarize(&[
            limit(LimitType::Messages, 5, 5),
            limit(LimitType::Tokens, 900, 100),
        ]);
        assert_eq!(check.limit_type, LimitType::Messages);
        assert!(check.exceeded);
    }
}
