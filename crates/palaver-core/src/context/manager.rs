//! ContextManager -- read-modify-write merging of lightweight user context.
//!
//! Context is strictly best-effort: storage errors are logged and swallowed,
//! never propagated into the message flow.

use std::sync::Arc;

use tracing::{debug, warn};

use palaver_types::context::{ContextUpdate, MAX_KEY_INSIGHTS, MAX_RECENT_TOPICS, UserContext};
use palaver_types::error::ChatError;

use super::repository::ContextRepository;

/// Number of leading words used as a topic.
const TOPIC_WORDS: usize = 3;

/// Candidate topic for a message: its first three whitespace-delimited words.
///
/// Returns `None` for blank text. Pure; safe to call speculatively.
pub fn derive_topic(text: &str) -> Option<String> {
    let words: Vec<&str> = text.split_whitespace().take(TOPIC_WORDS).collect();
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

/// Merge `update` into `context` in place.
///
/// Topics from the update are prepended in the order given, then the list is
/// deduplicated (first occurrence wins) and truncated to [`MAX_RECENT_TOPICS`].
/// Preferences merge key by key. Insights are appended, deduplicated, and only
/// the newest [`MAX_KEY_INSIGHTS`] are kept.
pub fn merge_context(context: &mut UserContext, update: ContextUpdate) {
    if let Some(topics) = update.recent_topics {
        let mut merged: Vec<String> = Vec::with_capacity(MAX_RECENT_TOPICS);
        for topic in topics
            .into_iter()
            .filter(|t| !t.trim().is_empty())
            .chain(context.recent_topics.drain(..))
        {
            if !merged.contains(&topic) {
                merged.push(topic);
            }
        }
        merged.truncate(MAX_RECENT_TOPICS);
        context.recent_topics = merged;
    }

    if let Some(preferences) = update.user_preferences {
        for (key, value) in preferences {
            context.user_preferences.insert(key, value);
        }
    }

    if let Some(insights) = update.key_insights {
        for insight in insights {
            if !context.key_insights.contains(&insight) {
                context.key_insights.push(insight);
            }
        }
        let excess = context.key_insights.len().saturating_sub(MAX_KEY_INSIGHTS);
        context.key_insights.drain(..excess);
    }
}

pub struct ContextManager<C: ContextRepository> {
    repo: Arc<C>,
}

impl<C: ContextRepository> Clone for ContextManager<C> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
        }
    }
}

impl<C: ContextRepository> ContextManager<C> {
    pub fn new(repo: Arc<C>) -> Self {
        Self { repo }
    }

    /// Current context, or an empty default when none exists or it cannot be read.
    pub async fn get_context(&self, bot_id: &str, client_id: &str) -> UserContext {
        match self.repo.get_context(bot_id, client_id).await {
            Ok(ctx) => ctx.unwrap_or_default(),
            Err(e) => {
                let err = ChatError::ContextUpdate(e.to_string());
                warn!(bot_id, client_id, error = %err, "context read failed, using empty context");
                UserContext::default()
            }
        }
    }

    /// Merge `update` into the stored context. Failures are logged only.
    pub async fn update_context(&self, bot_id: &str, client_id: &str, update: ContextUpdate) {
        if let Err(err) = self.try_update(bot_id, client_id, update).await {
            warn!(bot_id, client_id, error = %err, "context update dropped");
        }
    }

    /// Derive a topic from the user's message and record it.
    pub async fn fold_exchange(&self, bot_id: &str, client_id: &str, user_text: &str) {
        match derive_topic(user_text) {
            Some(topic) => {
                debug!(bot_id, client_id, topic = %topic, "recording topic");
                self.update_context(bot_id, client_id, ContextUpdate::topic(topic))
                    .await;
            }
            None => debug!(bot_id, client_id, "no topic in message"),
        }
    }

    async fn try_update(
        &self,
        bot_id: &str,
        client_id: &str,
        update: ContextUpdate,
    ) -> Result<(), ChatError> {
        let mut context = self
            .repo
            .get_context(bot_id, client_id)
            .await
            .map_err(|e| ChatError::ContextUpdate(e.to_string()))?
            .unwrap_or_default();
        merge_context(&mut context, update);
        self.repo
            .upsert_context(bot_id, client_id, &context)
            .await
            .map_err(|e| ChatError::ContextUpdate(e.to_string()))
    }
}
