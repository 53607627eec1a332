//! LlmProvider trait definition.
//!
//! This is the core abstraction that all streaming model backends implement.
//! The `stream` method returns a boxed stream so the trait stays usable
//! behind the object-safe [`BoxLlmProvider`](super::box_provider::BoxLlmProvider).

use std::pin::Pin;

use futures_util::Stream;

use palaver_types::llm::{CompletionRequest, LlmError, ProviderCapabilities, StreamEvent};

/// A boxed stream of provider events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send + 'static>>;

/// Trait for LLM provider backends.
///
/// Providers must deliver [`StreamEvent::TextDelta`] events in order and
/// terminate with [`StreamEvent::Done`] or an error. Nothing else is assumed.
///
/// Implementations live in palaver-infra (e.g., `OpenAiCompatibleProvider`).
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g., "openai", "mistral").
    fn name(&self) -> &str;

    /// What this provider supports.
    fn capabilities(&self) -> &ProviderCapabilities;

    /// Send a streaming completion request. Returns a stream of events.
    fn stream(&self, request: CompletionRequest) -> EventStream;
}
