//! Bot configuration as consumed by the chat engine.
//!
//! Bot entries arrive from `config.toml` where the `model` field may be
//! either a bare model name or a table with overrides. The raw shape is
//! parsed once at the boundary into [`ModelSettings`] so the rest of the
//! engine only sees explicit, typed fields.

use serde::{Deserialize, Serialize};

/// Default model when a bot does not specify one.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
/// Default max tokens per response.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// `model` as written in configuration: `"gpt-4o"` or `{ name = "gpt-4o", temperature = 0.2 }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawModelSpec {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        temperature: Option<f64>,
        #[serde(default)]
        max_tokens: Option<u32>,
    },
}

/// Resolved model settings for a bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    pub name: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            name: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl From<RawModelSpec> for ModelSettings {
    fn from(raw: RawModelSpec) -> Self {
        match raw {
            RawModelSpec::Name(name) => Self {
                name,
                ..Self::default()
            },
            RawModelSpec::Detailed {
                name,
                temperature,
                max_tokens,
            } => Self {
                name,
                temperature: temperature.unwrap_or(DEFAULT_TEMPERATURE),
                max_tokens: max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            },
        }
    }
}

/// A bot entry exactly as it appears in `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBotConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub model: Option<RawModelSpec>,
}

/// A bot the engine can chat as.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    pub id: String,
    pub name: String,
    /// Avatar attached to every finalized assistant message.
    pub avatar: Option<String>,
    pub system_prompt: Option<String>,
    pub model: ModelSettings,
}

impl From<RawBotConfig> for BotConfig {
    fn from(raw: RawBotConfig) -> Self {
        Self {
            id: raw.id,
            name: raw.name,
            avatar: raw.avatar,
            system_prompt: raw.system_prompt,
            model: raw.model.map(ModelSettings::from).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_as_plain_string() {
        let raw: RawBotConfig = toml::from_str(
            r#"
id = "b1"
name = "Helper"
model = "gpt-4o"
"#,
        )
        .unwrap();
        let bot = BotConfig::from(raw);
        assert_eq!(bot.model.name, "gpt-4o");
        assert!((bot.model.temperature - DEFAULT_TEMPERATURE).abs() < f64::EPSILON);
        assert_eq!(bot.model.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn test_model_as_table() {
        let raw: RawBotConfig = toml::from_str(
            r#"
id = "b1"
name = "Helper"
avatar = "🦉"

[model]
name = "gpt-4o"
temperature = 0.2
"#,
        )
        .unwrap();
        let bot = BotConfig::from(raw);
        assert_eq!(bot.avatar.as_deref(), Some("🦉"));
        assert_eq!(bot.model.name, "gpt-4o");
        assert!((bot.model.temperature - 0.2).abs() < f64::EPSILON);
        assert_eq!(bot.model.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn test_model_missing_uses_defaults() {
        let raw: RawBotConfig = toml::from_str("id = \"b1\"\nname = \"Helper\"\n").unwrap();
        let bot = BotConfig::from(raw);
        assert_eq!(bot.model, ModelSettings::default());
    }
}
