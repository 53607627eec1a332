//! Lightweight per-(bot, client) conversational context.

use serde::{Deserialize, Serialize};

/// Maximum number of recent topics retained, newest first.
pub const MAX_RECENT_TOPICS: usize = 5;

/// Maximum number of key insights retained.
pub const MAX_KEY_INSIGHTS: usize = 20;

/// Context remembered about one client of one bot.
///
/// Unique per `(bot_id, client_id)` and created lazily on first update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    /// Bounded, newest-first, deduplicated.
    #[serde(default)]
    pub recent_topics: Vec<String>,
    #[serde(default)]
    pub user_preferences: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub key_insights: Vec<String>,
}

impl UserContext {
    pub fn is_empty(&self) -> bool {
        self.recent_topics.is_empty()
            && self.user_preferences.is_empty()
            && self.key_insights.is_empty()
    }
}

/// A partial context to merge into the stored one. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recent_topics: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_preferences: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_insights: Option<Vec<String>>,
}

impl ContextUpdate {
    /// An update that records a single topic.
    pub fn topic(topic: impl Into<String>) -> Self {
        Self {
            recent_topics: Some(vec![topic.into()]),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_context_camel_case() {
        let mut ctx = UserContext::default();
        ctx.recent_topics.push("rust async".to_string());
        let json = serde_json::to_value(&ctx).unwrap();
        assert!(json.get("recentTopics").is_some());
        assert!(json.get("userPreferences").is_some());
        assert!(json.get("keyInsights").is_some());
    }

    #[test]
    fn test_update_parses_partial_json() {
        let update: ContextUpdate =
            serde_json::from_str(r#"{"userPreferences":{"name":"x"}}"#).unwrap();
        assert!(update.recent_topics.is_none());
        assert_eq!(
            update.user_preferences.unwrap().get("name"),
            Some(&serde_json::json!("x"))
        );
    }

    #[test]
    fn test_empty_context() {
        assert!(UserContext::default().is_empty());
    }
}
