//! Global configuration types for Palaver.
//!
//! `GlobalConfig` represents the top-level `config.toml` that declares bots,
//! the model provider, chat behaviour, and the usage quota table.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::bot::{BotConfig, RawBotConfig};
use crate::usage::UsageQuota;

/// Top-level configuration for the Palaver engine.
///
/// Loaded from `~/.palaver/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub provider: ProviderSettings,

    #[serde(default)]
    pub chat: ChatSettings,

    #[serde(default)]
    pub usage: UsageSettings,

    /// Bot entries as written; see [`GlobalConfig::bots`] for the parsed form.
    #[serde(default, rename = "bots")]
    pub raw_bots: Vec<RawBotConfig>,
}

impl GlobalConfig {
    /// Parsed bot configurations.
    pub fn bots(&self) -> Vec<BotConfig> {
        self.raw_bots.iter().cloned().map(BotConfig::from).collect()
    }

    /// Look up a bot by id.
    pub fn bot(&self, bot_id: &str) -> Option<BotConfig> {
        self.raw_bots
            .iter()
            .find(|b| b.id == bot_id)
            .cloned()
            .map(BotConfig::from)
    }
}

/// Which OpenAI-compatible endpoint to stream from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Human-readable provider name (e.g., "openai", "mistral").
    #[serde(default = "default_provider_name")]
    pub name: String,
    /// Override the provider's default base URL.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_provider_name() -> String {
    "openai".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            base_url: None,
            api_key_env: default_api_key_env(),
        }
    }
}

/// Chat behaviour toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSettings {
    /// Store cancelled/failed replies with the partial marker.
    #[serde(default)]
    pub persist_partial: bool,
    /// Lifetime of a persisted anonymous session token.
    #[serde(default = "default_session_token_ttl_days")]
    pub session_token_ttl_days: u32,
    /// Default persistence consent for local (CLI) sessions.
    #[serde(default = "default_persist_session")]
    pub persist_session: bool,
}

fn default_session_token_ttl_days() -> u32 {
    365
}

fn default_persist_session() -> bool {
    true
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            persist_partial: false,
            session_token_ttl_days: default_session_token_ttl_days(),
            persist_session: default_persist_session(),
        }
    }
}

/// Usage quota table and the reference point reset windows are anchored to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageSettings {
    #[serde(default = "default_reset_anchor")]
    pub reset_anchor: DateTime<Utc>,
    #[serde(default)]
    pub quotas: Vec<UsageQuota>,
}

/// 2024-01-01T00:00:00Z, a Monday, so weekly windows start on Mondays.
pub fn default_reset_anchor() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

impl Default for UsageSettings {
    fn default() -> Self {
        Self {
            reset_anchor: default_reset_anchor(),
            quotas: Vec::new(),
        }
    }
}
