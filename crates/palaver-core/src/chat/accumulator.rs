//! StreamingAccumulator -- assembles an assistant reply from provider deltas.
//!
//! Each conversation has at most one active [`Accumulation`]. Deltas are
//! applied strictly in arrival order and published through a `watch`
//! channel so renderers see every application without slowing the stream.
//!
//! State machine: `Idle -> Sending -> Streaming -> Done | Failed | Cancelled`.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::{FutureExt, Stream, StreamExt};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn};

use palaver_types::bot::BotConfig;
use palaver_types::chat::{ChatIdentity, ChatMessage};
use palaver_types::error::ChatError;
use palaver_types::llm::{CompletionRequest, LlmError, Message, StreamEvent, Usage};

use crate::llm::box_provider::BoxLlmProvider;
use crate::llm::provider::EventStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccumulatorState {
    Idle,
    Sending,
    Streaming,
    Done,
    Failed,
    Cancelled,
}

impl AccumulatorState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AccumulatorState::Done | AccumulatorState::Failed | AccumulatorState::Cancelled
        )
    }
}

/// What a live renderer sees: the state plus everything received so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssemblySnapshot {
    pub state: AccumulatorState,
    pub content: String,
}

impl Default for AssemblySnapshot {
    fn default() -> Self {
        Self {
            state: AccumulatorState::Idle,
            content: String::new(),
        }
    }
}

/// How an accumulation ended.
///
/// `partial` messages always have [`ChatMessage::partial`] set and are never
/// a completed reply.
#[derive(Debug, Clone)]
pub enum ExchangeOutcome {
    Completed {
        message: ChatMessage,
        usage: Option<Usage>,
    },
    Failed {
        error: LlmError,
        partial: Option<ChatMessage>,
    },
    Cancelled {
        partial: Option<ChatMessage>,
    },
}

impl ExchangeOutcome {
    pub fn state(&self) -> AccumulatorState {
        match self {
            ExchangeOutcome::Completed { .. } => AccumulatorState::Done,
            ExchangeOutcome::Failed { .. } => AccumulatorState::Failed,
            ExchangeOutcome::Cancelled { .. } => AccumulatorState::Cancelled,
        }
    }

    /// The finished reply, or the partial one if any text arrived.
    pub fn message(&self) -> Option<&ChatMessage> {
        match self {
            ExchangeOutcome::Completed { message, .. } => Some(message),
            ExchangeOutcome::Failed { partial, .. } | ExchangeOutcome::Cancelled { partial } => {
                partial.as_ref()
            }
        }
    }
}

/// What a cancellation request found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelResult {
    Cancelled,
    /// Nothing is streaming for the conversation.
    Idle,
    /// The conversation is streaming for another identity; left untouched.
    NotOwner,
}

#[derive(Debug, Clone)]
struct ActiveStream {
    owner: ChatIdentity,
    token: CancellationToken,
}

/// Conversations with an accumulation in flight, and who started each.
///
/// Cheap to clone; clones share the same registry.
#[derive(Debug, Clone, Default)]
pub struct StreamRegistry {
    active: Arc<DashMap<String, ActiveStream>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_streaming(&self, chat_id: &str) -> bool {
        self.active.contains_key(chat_id)
    }

    /// Cancel `chat_id` on behalf of `requester`.
    ///
    /// Only the identity that started the accumulation may cancel it.
    pub fn cancel(&self, chat_id: &str, requester: &ChatIdentity) -> CancelResult {
        match self.active.get(chat_id) {
            Some(stream) if &stream.owner != requester => CancelResult::NotOwner,
            Some(stream) => {
                stream.token.cancel();
                CancelResult::Cancelled
            }
            None => CancelResult::Idle,
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    fn claim(&self, chat_id: &str, owner: &ChatIdentity) -> Result<Slot, ChatError> {
        match self.active.entry(chat_id.to_string()) {
            Entry::Occupied(_) => Err(ChatError::Busy(chat_id.to_string())),
            Entry::Vacant(entry) => {
                let token = CancellationToken::new();
                entry.insert(ActiveStream {
                    owner: owner.clone(),
                    token: token.clone(),
                });
                Ok(Slot {
                    registry: self.clone(),
                    chat_id: chat_id.to_string(),
                    token,
                })
            }
        }
    }
}

/// Registry entry released on drop.
struct Slot {
    registry: StreamRegistry,
    chat_id: String,
    token: CancellationToken,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.registry.active.remove(&self.chat_id);
    }
}

/// Opens provider streams and hands out one [`Accumulation`] per conversation.
#[derive(Clone)]
pub struct StreamingAccumulator {
    provider: Arc<BoxLlmProvider>,
    registry: StreamRegistry,
}

impl StreamingAccumulator {
    pub fn new(provider: Arc<BoxLlmProvider>) -> Self {
        Self {
            provider,
            registry: StreamRegistry::new(),
        }
    }

    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    pub fn provider(&self) -> &BoxLlmProvider {
        &self.provider
    }

    /// Build the provider request for a transcript ending in the user's turn.
    pub fn build_request(history: &[ChatMessage], bot: &BotConfig) -> CompletionRequest {
        CompletionRequest {
            model: bot.model.name.clone(),
            messages: history.iter().map(Message::from).collect(),
            system: bot.system_prompt.clone(),
            max_tokens: bot.model.max_tokens,
            temperature: Some(bot.model.temperature),
            stream: true,
        }
    }

    /// Open a stream for `chat_id` on behalf of `owner`.
    ///
    /// Fails with [`ChatError::Busy`] while another accumulation for the same
    /// conversation is alive.
    pub fn start(
        &self,
        chat_id: &str,
        owner: &ChatIdentity,
        history: &[ChatMessage],
        bot: &BotConfig,
    ) -> Result<Accumulation, ChatError> {
        let slot = self.registry.claim(chat_id, owner)?;
        let request = Self::build_request(history, bot);

        let span = info_span!(
            "gen_ai.chat",
            chat_id,
            bot_id = %bot.id,
            gen_ai.system = self.provider.name(),
            gen_ai.request.model = %request.model,
            gen_ai.request.max_tokens = request.max_tokens,
            gen_ai.request.temperature = ?request.temperature,
            gen_ai.usage.input_tokens = tracing::field::Empty,
            gen_ai.usage.output_tokens = tracing::field::Empty,
        );
        span.in_scope(|| debug!(messages = request.messages.len(), "opening provider stream"));

        let stream = StreamInSpan {
            inner: self.provider.stream(request),
            span: span.clone(),
        };
        let (updates, _) = watch::channel(AssemblySnapshot {
            state: AccumulatorState::Sending,
            content: String::new(),
        });

        Ok(Accumulation {
            avatar: bot.avatar.clone(),
            usage: None,
            stream: Some(Box::pin(stream)),
            updates,
            span,
            slot,
        })
    }
}

/// One in-flight assistant reply.
///
/// Dropping it releases the conversation's slot and the provider stream.
pub struct Accumulation {
    avatar: Option<String>,
    usage: Option<Usage>,
    stream: Option<EventStream>,
    updates: watch::Sender<AssemblySnapshot>,
    span: tracing::Span,
    slot: Slot,
}

enum Step {
    Cancelled,
    Event(Option<Result<StreamEvent, LlmError>>),
}

impl Accumulation {
    pub fn chat_id(&self) -> &str {
        &self.slot.chat_id
    }

    pub fn state(&self) -> AccumulatorState {
        self.updates.borrow().state
    }

    pub fn content(&self) -> String {
        self.updates.borrow().content.clone()
    }

    /// Live view of the reply being assembled.
    pub fn subscribe(&self) -> watch::Receiver<AssemblySnapshot> {
        self.updates.subscribe()
    }

    /// Token that cancels this accumulation when triggered.
    pub fn cancellation(&self) -> CancellationToken {
        self.slot.token.clone()
    }

    /// Append a chunk. Returns false (and changes nothing) once terminal.
    pub fn on_delta(&mut self, chunk: &str) -> bool {
        let mut applied = false;
        self.updates.send_if_modified(|snapshot| {
            if snapshot.state.is_terminal() {
                return false;
            }
            snapshot.state = AccumulatorState::Streaming;
            snapshot.content.push_str(chunk);
            applied = true;
            true
        });
        applied
    }

    /// Finalize the reply. `None` if the accumulation already ended.
    pub fn on_complete(&mut self) -> Option<ChatMessage> {
        let content = self.settle(AccumulatorState::Done)?;
        Some(ChatMessage::assistant(content, self.avatar.clone()))
    }

    /// Mark the accumulation failed and return whatever arrived as a partial
    /// message. `None` if nothing arrived or it already ended.
    pub fn on_error(&mut self, error: &LlmError) -> Option<ChatMessage> {
        let content = self.settle(AccumulatorState::Failed)?;
        self.span
            .in_scope(|| warn!(error = %error, received = content.len(), "provider stream failed"));
        self.partial(content)
    }

    /// Stop applying deltas. Same return contract as [`Self::on_error`].
    pub fn on_cancel(&mut self) -> Option<ChatMessage> {
        let content = self.settle(AccumulatorState::Cancelled)?;
        self.span
            .in_scope(|| info!(received = content.len(), "stream cancelled"));
        self.partial(content)
    }

    /// Consume the provider stream until it finishes, fails, or is cancelled.
    pub async fn drive(mut self) -> ExchangeOutcome {
        let already_finished = || ExchangeOutcome::Failed {
            error: LlmError::Stream("accumulation already finished".to_string()),
            partial: None,
        };
        if self.state().is_terminal() {
            return already_finished();
        }
        let Some(mut stream) = self.stream.take() else {
            return already_finished();
        };
        let cancel = self.slot.token.clone();

        loop {
            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => Step::Cancelled,
                event = stream.next() => Step::Event(event),
            };

            match step {
                Step::Cancelled => {
                    drop(stream);
                    return ExchangeOutcome::Cancelled {
                        partial: self.on_cancel(),
                    };
                }
                Step::Event(Some(Ok(StreamEvent::Done))) => {
                    self.flush_ready(&mut stream);
                    drop(stream);
                    let Some(message) = self.on_complete() else {
                        return already_finished();
                    };
                    self.span.in_scope(|| {
                        info!(chars = message.content.len(), "reply assembled");
                    });
                    return ExchangeOutcome::Completed {
                        message,
                        usage: self.usage.take(),
                    };
                }
                Step::Event(Some(Ok(event))) => self.apply(event),
                Step::Event(Some(Err(error))) => {
                    drop(stream);
                    let partial = self.on_error(&error);
                    return ExchangeOutcome::Failed { error, partial };
                }
                Step::Event(None) => {
                    let error = LlmError::Stream("stream ended before completion".to_string());
                    let partial = self.on_error(&error);
                    return ExchangeOutcome::Failed { error, partial };
                }
            }
        }
    }

    fn apply(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::TextDelta { text } => {
                self.on_delta(&text);
            }
            StreamEvent::Usage(usage) => {
                self.span
                    .record("gen_ai.usage.input_tokens", usage.input_tokens);
                self.span
                    .record("gen_ai.usage.output_tokens", usage.output_tokens);
                self.usage = Some(usage);
            }
            StreamEvent::Connected => {
                self.span.in_scope(|| debug!("provider connected"));
            }
            StreamEvent::Done => {}
        }
    }

    /// Apply events that were already buffered behind `Done`.
    fn flush_ready(&mut self, stream: &mut EventStream) {
        while let Some(Some(Ok(event))) = stream.next().now_or_never() {
            self.apply(event);
        }
    }

    fn settle(&mut self, terminal: AccumulatorState) -> Option<String> {
        let mut content = None;
        self.updates.send_if_modified(|snapshot| {
            if snapshot.state.is_terminal() {
                return false;
            }
            snapshot.state = terminal;
            content = Some(snapshot.content.clone());
            true
        });
        content
    }

    fn partial(&self, content: String) -> Option<ChatMessage> {
        if content.is_empty() {
            return None;
        }
        Some(ChatMessage {
            partial: true,
            ..ChatMessage::assistant(content, self.avatar.clone())
        })
    }
}

/// A stream wrapper that keeps the provider span entered while polling.
struct StreamInSpan {
    inner: EventStream,
    span: tracing::Span,
}

impl Stream for StreamInSpan {
    type Item = Result<StreamEvent, LlmError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let _enter = this.span.enter();
        this.inner.as_mut().poll_next(cx)
    }
}
