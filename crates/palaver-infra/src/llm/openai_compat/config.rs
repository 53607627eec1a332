//! Configuration types and per-provider defaults for OpenAI-compatible providers.
//!
//! Each provider that speaks the OpenAI chat completions protocol gets a factory
//! function returning an [`OpenAiCompatConfig`] with the correct base URL and
//! capabilities. The model is chosen per request from the bot configuration.

use secrecy::SecretString;

use palaver_types::llm::ProviderCapabilities;

/// Configuration for an OpenAI-compatible LLM provider.
///
/// Used to construct an [`super::OpenAiCompatibleProvider`].
pub struct OpenAiCompatConfig {
    /// Human-readable provider name (e.g., "openai", "gemini").
    pub provider_name: String,
    /// Base URL for the API (e.g., "https://api.openai.com/v1").
    pub base_url: String,
    pub api_key: SecretString,
    pub capabilities: ProviderCapabilities,
}

/// OpenAI default configuration.
///
/// Base URL: `https://api.openai.com/v1`; 128K context, 16K output.
pub fn openai_defaults(api_key: SecretString) -> OpenAiCompatConfig {
    OpenAiCompatConfig {
        provider_name: "openai".into(),
        base_url: "https://api.openai.com/v1".into(),
        api_key,
        capabilities: ProviderCapabilities {
            streaming: true,
            max_context_tokens: 128_000,
            max_output_tokens: 16_384,
        },
    }
}

/// Google Gemini default configuration (OpenAI-compatible beta endpoint).
///
/// Base URL: `https://generativelanguage.googleapis.com/v1beta/openai`; 1M context, 64K output.
pub fn gemini_defaults(api_key: SecretString) -> OpenAiCompatConfig {
    OpenAiCompatConfig {
        provider_name: "gemini".into(),
        base_url: "https://generativelanguage.googleapis.com/v1beta/openai".into(),
        api_key,
        capabilities: ProviderCapabilities {
            streaming: true,
            max_context_tokens: 1_000_000,
            max_output_tokens: 65_536,
        },
    }
}

/// Mistral AI default configuration.
///
/// Base URL: `https://api.mistral.ai/v1`; 128K context, 32K output.
pub fn mistral_defaults(api_key: SecretString) -> OpenAiCompatConfig {
    OpenAiCompatConfig {
        provider_name: "mistral".into(),
        base_url: "https://api.mistral.ai/v1".into(),
        api_key,
        capabilities: ProviderCapabilities {
            streaming: true,
            max_context_tokens: 128_000,
            max_output_tokens: 32_768,
        },
    }
}

/// GLM (z.ai) default configuration.
///
/// Base URL: `https://api.z.ai/api/paas/v4`; 200K context, 128K output.
pub fn glm_defaults(api_key: SecretString) -> OpenAiCompatConfig {
    OpenAiCompatConfig {
        provider_name: "glm".into(),
        base_url: "https://api.z.ai/api/paas/v4".into(),
        api_key,
        capabilities: ProviderCapabilities {
            streaming: true,
            max_context_tokens: 200_000,
            max_output_tokens: 128_000,
        },
    }
}

/// Defaults for a well-known provider name, or `None` if the name is unknown.
pub fn defaults_for(name: &str, api_key: SecretString) -> Option<OpenAiCompatConfig> {
    match name {
        "openai" => Some(openai_defaults(api_key)),
        "gemini" => Some(gemini_defaults(api_key)),
        "mistral" => Some(mistral_defaults(api_key)),
        "glm" => Some(glm_defaults(api_key)),
        _ => None,
    }
}
