//! ChatEngine -- wires the components into one exchange.
//!
//! An exchange runs: usage gate, then accumulator start, then stream
//! assembly, then context fold-in, then transcript save. Only a hit limit
//! or a busy conversation stops it before the provider is called; every
//! later failure is reported on the [`ExchangeReport`].

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use palaver_types::bot::BotConfig;
use palaver_types::chat::{ChatIdentity, ChatMessage, ChatRecord, ChatSession};
use palaver_types::error::ChatError;
use palaver_types::usage::{LimitCheck, UserRole};

use super::accumulator::{
    Accumulation, AssemblySnapshot, CancelResult, ExchangeOutcome, StreamingAccumulator,
};
use super::repository::ChatRecordRepository;
use super::service::HistoryService;
use crate::context::manager::ContextManager;
use crate::context::repository::ContextRepository;
use crate::usage::gate::UsageGate;

/// Engine behaviour switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineSettings {
    /// Save cancelled or failed replies (marked partial) along with the transcript.
    pub persist_partial: bool,
}

/// What happened to the transcript after the stream ended.
#[derive(Debug)]
pub enum PersistenceStatus {
    Saved(ChatRecord),
    /// Nothing worth saving (no completed or kept partial reply).
    Skipped,
    Failed(ChatError),
}

/// Result of one exchange.
#[derive(Debug)]
pub struct ExchangeReport {
    pub chat_id: String,
    pub outcome: ExchangeOutcome,
    /// The conversation including the user turn and, when kept, the reply.
    pub transcript: Vec<ChatMessage>,
    pub persistence: PersistenceStatus,
}

/// An exchange whose provider stream is open but not yet consumed.
pub struct PendingExchange {
    session: ChatSession,
    chat_id: String,
    bot: BotConfig,
    transcript: Vec<ChatMessage>,
    accumulation: Accumulation,
}

impl PendingExchange {
    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn subscribe(&self) -> watch::Receiver<AssemblySnapshot> {
        self.accumulation.subscribe()
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.accumulation.cancellation()
    }

    /// Transcript sent to the provider, ending with the user's turn.
    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }
}

pub struct ChatEngine<R: ChatRecordRepository, C: ContextRepository> {
    accumulator: StreamingAccumulator,
    gate: UsageGate<R>,
    history: HistoryService<R>,
    context: ContextManager<C>,
    settings: EngineSettings,
}

impl<R: ChatRecordRepository, C: ContextRepository> ChatEngine<R, C> {
    pub fn new(
        accumulator: StreamingAccumulator,
        gate: UsageGate<R>,
        history: HistoryService<R>,
        context: ContextManager<C>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            accumulator,
            gate,
            history,
            context,
            settings,
        }
    }

    pub fn accumulator(&self) -> &StreamingAccumulator {
        &self.accumulator
    }

    pub fn gate(&self) -> &UsageGate<R> {
        &self.gate
    }

    pub fn history(&self) -> &HistoryService<R> {
        &self.history
    }

    pub fn context(&self) -> &ContextManager<C> {
        &self.context
    }

    /// Stored transcript for `chat_id`, or an empty one for a new conversation.
    pub async fn load_transcript(&self, chat_id: &str) -> Result<Vec<ChatMessage>, ChatError> {
        Ok(self
            .history
            .get(chat_id)
            .await?
            .map(|record| record.messages)
            .unwrap_or_default())
    }

    /// Check the usage gate for this session.
    ///
    /// A failed usage read lets the message through.
    pub async fn check_limit(&self, session: &ChatSession, role: UserRole) -> LimitCheck {
        match self
            .gate
            .check_limit(&session.identity, &session.bot_id, role)
            .await
        {
            Ok(check) => check,
            Err(e) => {
                warn!(bot_id = %session.bot_id, error = %e, "usage check failed, allowing message");
                LimitCheck::unlimited()
            }
        }
    }

    /// Gate and open the provider stream for one user message.
    pub async fn begin(
        &self,
        session: &ChatSession,
        role: UserRole,
        chat_id: &str,
        bot: &BotConfig,
        history: Vec<ChatMessage>,
        text: &str,
    ) -> Result<PendingExchange, ChatError> {
        let check = self.check_limit(session, role).await;
        if check.exceeded {
            info!(
                chat_id,
                bot_id = %bot.id,
                limit_type = %check.limit_type,
                max_usage = check.max_usage,
                "usage limit reached"
            );
            return Err(ChatError::LimitExceeded {
                limit_type: check.limit_type,
                max_usage: check.max_usage,
                current_usage: check.current_usage,
                reset_date: check.reset_date,
            });
        }

        let mut transcript = history;
        transcript.push(ChatMessage::user(text));
        let accumulation = self
            .accumulator
            .start(chat_id, &session.identity, &transcript, bot)?;
        debug!(chat_id, bot_id = %bot.id, turns = transcript.len(), "exchange started");

        Ok(PendingExchange {
            session: session.clone(),
            chat_id: chat_id.to_string(),
            bot: bot.clone(),
            transcript,
            accumulation,
        })
    }

    /// Drive the stream to its end, then fold context and save.
    pub async fn finish(&self, pending: PendingExchange) -> ExchangeReport {
        let PendingExchange {
            session,
            chat_id,
            bot,
            mut transcript,
            accumulation,
        } = pending;

        let outcome = accumulation.drive().await;

        let reply = match &outcome {
            ExchangeOutcome::Completed { message, .. } => {
                if let Some(user_text) = transcript.last().map(|m| m.content.clone()) {
                    self.context
                        .fold_exchange(&bot.id, session.identity.key(), &user_text)
                        .await;
                }
                Some(message.clone())
            }
            ExchangeOutcome::Failed { partial, .. } | ExchangeOutcome::Cancelled { partial } => {
                partial.clone().filter(|_| self.settings.persist_partial)
            }
        };

        let persistence = match reply {
            Some(message) => {
                transcript.push(message);
                match self
                    .history
                    .save(&chat_id, &bot.id, &transcript, &session)
                    .await
                {
                    Ok(record) => PersistenceStatus::Saved(record),
                    Err(e) => PersistenceStatus::Failed(e),
                }
            }
            None => {
                debug!(chat_id = %chat_id, state = ?outcome.state(), "reply not kept, transcript not saved");
                PersistenceStatus::Skipped
            }
        };

        ExchangeReport {
            chat_id,
            outcome,
            transcript,
            persistence,
        }
    }

    /// [`Self::begin`] followed by [`Self::finish`].
    pub async fn send(
        &self,
        session: &ChatSession,
        role: UserRole,
        chat_id: &str,
        bot: &BotConfig,
        history: Vec<ChatMessage>,
        text: &str,
    ) -> Result<ExchangeReport, ChatError> {
        let pending = self
            .begin(session, role, chat_id, bot, history, text)
            .await?;
        Ok(self.finish(pending).await)
    }

    /// Cancel the in-flight exchange for `chat_id` if `requester` started it.
    pub fn cancel(&self, chat_id: &str, requester: &ChatIdentity) -> CancelResult {
        let result = self.accumulator.registry().cancel(chat_id, requester);
        match result {
            CancelResult::Cancelled => info!(chat_id, "cancellation requested"),
            CancelResult::NotOwner => {
                warn!(chat_id, requester = %requester, "cancellation refused, not the owner")
            }
            CancelResult::Idle => {}
        }
        result
    }
}

/// Convenience constructor sharing one record repository between the gate
/// and history.
pub fn build_engine<R: ChatRecordRepository, C: ContextRepository>(
    accumulator: StreamingAccumulator,
    records: Arc<R>,
    contexts: Arc<C>,
    quotas: Vec<palaver_types::usage::UsageQuota>,
    anchor: chrono::DateTime<chrono::Utc>,
    settings: EngineSettings,
) -> ChatEngine<R, C> {
    ChatEngine::new(
        accumulator,
        UsageGate::new(Arc::clone(&records), quotas, anchor),
        HistoryService::new(records),
        ContextManager::new(contexts),
        settings,
    )
}
