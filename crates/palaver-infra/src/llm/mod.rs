//! LLM provider implementations.
//!
//! Every supported endpoint speaks the OpenAI chat completions protocol, so
//! [`create_provider`] builds an [`OpenAiCompatibleProvider`] from the
//! [`ProviderSettings`] in `config.toml`.

pub mod openai_compat;

use secrecy::SecretString;

use palaver_core::llm::box_provider::BoxLlmProvider;
use palaver_core::llm::provider::{EventStream, LlmProvider};
use palaver_types::config::ProviderSettings;
use palaver_types::llm::{CompletionRequest, LlmError, ProviderCapabilities};

use self::openai_compat::OpenAiCompatibleProvider;
use self::openai_compat::config::{OpenAiCompatConfig, defaults_for, openai_defaults};

/// Read the API key named by `settings.api_key_env` from the environment.
pub fn resolve_api_key(settings: &ProviderSettings) -> Option<String> {
    std::env::var(&settings.api_key_env)
        .ok()
        .filter(|key| !key.trim().is_empty())
}

/// Create a [`BoxLlmProvider`] from [`ProviderSettings`].
///
/// An explicit `base_url` wins; otherwise well-known provider names map to
/// their defaults and unknown names fall back to the OpenAI endpoint.
///
/// # Errors
///
/// Returns [`LlmError::AuthenticationFailed`] when no API key is provided.
pub fn create_provider(
    settings: &ProviderSettings,
    api_key: Option<&str>,
) -> Result<BoxLlmProvider, LlmError> {
    let key = api_key.ok_or(LlmError::AuthenticationFailed)?;
    let secret = || SecretString::from(key.to_string());

    let config = match settings.base_url.as_deref() {
        Some(base_url) => {
            let capabilities = defaults_for(&settings.name, secret())
                .map(|d| d.capabilities)
                .unwrap_or_default();
            OpenAiCompatConfig {
                provider_name: settings.name.clone(),
                base_url: base_url.to_string(),
                api_key: secret(),
                capabilities,
            }
        }
        None => match defaults_for(&settings.name, secret()) {
            Some(config) => config,
            None => {
                tracing::warn!(
                    provider = %settings.name,
                    "unknown provider name without base_url, using the OpenAI endpoint"
                );
                OpenAiCompatConfig {
                    provider_name: settings.name.clone(),
                    ..openai_defaults(secret())
                }
            }
        },
    };

    tracing::debug!(provider = %config.provider_name, base_url = %config.base_url, "creating provider");
    Ok(BoxLlmProvider::new(OpenAiCompatibleProvider::new(config)))
}

/// Build the provider from settings and the environment.
///
/// Without an API key the returned provider fails every stream, so commands
/// that never talk to the model (history, limits, whoami) still work.
pub fn provider_from_env(settings: &ProviderSettings) -> BoxLlmProvider {
    match create_provider(settings, resolve_api_key(settings).as_deref()) {
        Ok(provider) => provider,
        Err(e) => {
            tracing::warn!(
                provider = %settings.name,
                env = %settings.api_key_env,
                error = %e,
                "provider unavailable, chats will fail until the API key is set"
            );
            BoxLlmProvider::new(UnconfiguredProvider::new(settings))
        }
    }
}

/// Stand-in for a provider whose API key is missing.
pub struct UnconfiguredProvider {
    name: String,
    api_key_env: String,
    capabilities: ProviderCapabilities,
}

impl UnconfiguredProvider {
    pub fn new(settings: &ProviderSettings) -> Self {
        Self {
            name: settings.name.clone(),
            api_key_env: settings.api_key_env.clone(),
            capabilities: ProviderCapabilities::default(),
        }
    }
}

impl LlmProvider for UnconfiguredProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    fn stream(&self, _request: CompletionRequest) -> EventStream {
        let message = format!("no API key found in ${}", self.api_key_env);
        Box::pin(futures_util::stream::once(async move {
            Err(LlmError::Provider { message })
        }))
    }
}
