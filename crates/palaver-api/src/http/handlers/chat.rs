//! Chat exchange endpoints.
//!
//! - POST   /api/v1/bots/{bot}/chats/{chat}/stream   - Send a message, reply as SSE
//! - POST   /api/v1/bots/{bot}/chats/{chat}/messages - Send a message, reply as JSON
//! - POST   /api/v1/chats/{chat}/cancel              - Cancel an in-flight reply
//! - GET    /api/v1/chats/{chat}                     - Fetch a stored transcript
//! - DELETE /api/v1/chats/{chat}                     - Delete a stored transcript
//!
//! SSE event types:
//! - `session` - first event: `{ "session_token", "chat_id", "ephemeral" }`
//! - `delta`   - reply text appended: `{ "text": "..." }`
//! - `limit`   - usage limit reached, nothing was sent: limit details
//! - `done`    - reply finished or cancelled: `{ "state", "content", "persisted" }`
//! - `error`   - provider stream failed: `{ "message", "partial" }`

use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Json;
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;

use palaver_core::chat::accumulator::{AccumulatorState, CancelResult, ExchangeOutcome};
use palaver_core::chat::engine::{ExchangeReport, PendingExchange, PersistenceStatus};
use palaver_core::chat::feed::{ExchangeEvent, exchange_feed};
use palaver_types::chat::{ChatIdentity, ChatMessage, ChatRecord};
use palaver_types::error::ChatError;
use palaver_types::usage::LimitType;

use crate::http::error::AppError;
use crate::http::extractors::session::RequestSession;
use crate::http::response::ApiResponse;
use crate::state::{AppState, ConcreteEngine};

/// Request body for both send endpoints.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
}

/// One server-sent event of a streamed exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    Session {
        session_token: String,
        chat_id: String,
        ephemeral: bool,
    },
    Delta(String),
    Limit {
        limit_type: LimitType,
        max_usage: u64,
        current_usage: u64,
        reset_date: Option<DateTime<Utc>>,
    },
    Done {
        state: AccumulatorState,
        content: String,
        persisted: bool,
    },
    Error {
        message: String,
        partial: Option<String>,
    },
}

impl ChatEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ChatEvent::Session { .. } => "session",
            ChatEvent::Delta(_) => "delta",
            ChatEvent::Limit { .. } => "limit",
            ChatEvent::Done { .. } => "done",
            ChatEvent::Error { .. } => "error",
        }
    }

    pub fn payload(&self) -> serde_json::Value {
        match self {
            ChatEvent::Session {
                session_token,
                chat_id,
                ephemeral,
            } => json!({
                "session_token": session_token,
                "chat_id": chat_id,
                "ephemeral": ephemeral,
            }),
            ChatEvent::Delta(text) => json!({ "text": text }),
            ChatEvent::Limit {
                limit_type,
                max_usage,
                current_usage,
                reset_date,
            } => json!({
                "limit_type": limit_type,
                "max_usage": max_usage,
                "current_usage": current_usage,
                "reset_date": reset_date,
            }),
            ChatEvent::Done {
                state,
                content,
                persisted,
            } => json!({
                "state": state,
                "content": content,
                "persisted": persisted,
            }),
            ChatEvent::Error { message, partial } => json!({
                "message": message,
                "partial": partial,
            }),
        }
    }

    pub fn to_sse(&self) -> Event {
        Event::default()
            .event(self.name())
            .data(self.payload().to_string())
    }

    /// Terminal event for a finished exchange.
    fn from_report(report: &ExchangeReport) -> Self {
        let persisted = matches!(report.persistence, PersistenceStatus::Saved(_));
        match &report.outcome {
            ExchangeOutcome::Completed { message, .. } => ChatEvent::Done {
                state: AccumulatorState::Done,
                content: message.content.clone(),
                persisted,
            },
            ExchangeOutcome::Cancelled { partial } => ChatEvent::Done {
                state: AccumulatorState::Cancelled,
                content: partial.as_ref().map(|m| m.content.clone()).unwrap_or_default(),
                persisted,
            },
            ExchangeOutcome::Failed { error, partial } => ChatEvent::Error {
                message: error.to_string(),
                partial: partial.as_ref().map(|m| m.content.clone()),
            },
        }
    }
}

/// Everything a streamed exchange emits, in order.
fn chat_events(
    engine: Arc<ConcreteEngine>,
    opening: ChatEvent,
    started: Result<PendingExchange, ChatEvent>,
) -> impl Stream<Item = ChatEvent> + Send + 'static {
    async_stream::stream! {
        yield opening;
        match started {
            Ok(pending) => {
                let feed = exchange_feed(engine, pending);
                tokio::pin!(feed);
                while let Some(event) = feed.next().await {
                    match event {
                        ExchangeEvent::Delta(text) => yield ChatEvent::Delta(text),
                        ExchangeEvent::Finished(report) => yield ChatEvent::from_report(&report),
                    }
                }
            }
            Err(refused) => yield refused,
        }
    }
}

fn require_message(body: &SendMessageRequest) -> Result<&str, AppError> {
    let text = body.message.trim();
    if text.is_empty() {
        return Err(AppError::Validation("message must not be empty".to_string()));
    }
    Ok(text)
}

/// Stored record for `chat_id` if the caller owns it.
///
/// Records owned by someone else are reported as missing.
async fn owned_record(
    state: &AppState,
    chat_id: &str,
    identity: &ChatIdentity,
) -> Result<Option<ChatRecord>, AppError> {
    let record = state.engine.history().get(chat_id).await?;
    match record {
        Some(record) if record.identity().as_ref() != Some(identity) => {
            Err(AppError::NotFound(format!("chat '{chat_id}' not found")))
        }
        other => Ok(other),
    }
}

/// Transcript to continue for `chat_id` under `bot_id`.
///
/// A conversation belongs to the bot it was started with; sending to it
/// through another bot is reported as missing.
async fn bot_history(
    state: &AppState,
    chat_id: &str,
    bot_id: &str,
    identity: &ChatIdentity,
) -> Result<Vec<ChatMessage>, AppError> {
    match owned_record(state, chat_id, identity).await? {
        Some(record) if record.bot_id != bot_id => Err(AppError::NotFound(format!(
            "chat '{chat_id}' not found for bot '{bot_id}'"
        ))),
        Some(record) => Ok(record.messages),
        None => Ok(Vec::new()),
    }
}

/// POST /api/v1/bots/{bot}/chats/{chat}/stream - Stream a reply as SSE.
///
/// A reached usage limit is reported in-band as a `limit` event so clients
/// get the session token either way.
pub async fn stream_chat(
    State(state): State<AppState>,
    session: RequestSession,
    Path((bot_id, chat_id)): Path<(String, String)>,
    Json(body): Json<SendMessageRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let text = require_message(&body)?;
    let bot = state.bot(&bot_id)?;
    let chat_session = session.chat_session(&bot_id)?;
    let history = bot_history(&state, &chat_id, &bot_id, &chat_session.identity).await?;

    let started = match state
        .engine
        .begin(&chat_session, session.role, &chat_id, &bot, history, text)
        .await
    {
        Ok(pending) => Ok(pending),
        Err(ChatError::LimitExceeded {
            limit_type,
            max_usage,
            current_usage,
            reset_date,
        }) => Err(ChatEvent::Limit {
            limit_type,
            max_usage,
            current_usage,
            reset_date,
        }),
        Err(e) => return Err(e.into()),
    };

    let opening = ChatEvent::Session {
        session_token: session.client_token.clone(),
        chat_id,
        ephemeral: session.ephemeral,
    };
    let events = chat_events(Arc::clone(&state.engine), opening, started)
        .map(|event| Ok::<_, Infallible>(event.to_sse()));

    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

/// Response body of the non-streaming send endpoint.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub chat_id: String,
    pub state: AccumulatorState,
    pub reply: Option<ChatMessage>,
    pub persisted: bool,
    pub session_token: String,
}

/// POST /api/v1/bots/{bot}/chats/{chat}/messages - Send and wait for the full reply.
pub async fn send_message(
    State(state): State<AppState>,
    session: RequestSession,
    Path((bot_id, chat_id)): Path<(String, String)>,
    Json(body): Json<SendMessageRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, AppError> {
    let start = Instant::now();
    let text = require_message(&body)?;
    let bot = state.bot(&bot_id)?;
    let chat_session = session.chat_session(&bot_id)?;
    let history = bot_history(&state, &chat_id, &bot_id, &chat_session.identity).await?;

    let report = state
        .engine
        .send(&chat_session, session.role, &chat_id, &bot, history, text)
        .await?;

    if let ExchangeOutcome::Failed { error, .. } = report.outcome {
        return Err(ChatError::ProviderStream(error).into());
    }

    Ok(Json(ApiResponse::success(
        MessageResponse {
            state: report.outcome.state(),
            reply: report.outcome.message().cloned(),
            persisted: matches!(report.persistence, PersistenceStatus::Saved(_)),
            chat_id: report.chat_id,
            session_token: session.client_token,
        },
        start,
    )))
}

/// POST /api/v1/chats/{chat}/cancel - Cancel the caller's reply being streamed.
pub async fn cancel_chat(
    State(state): State<AppState>,
    session: RequestSession,
    Path(chat_id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    let identity = session.identity();
    owned_record(&state, &chat_id, &identity).await?;

    let cancelled = match state.engine.cancel(&chat_id, &identity) {
        CancelResult::Cancelled => true,
        CancelResult::Idle => false,
        CancelResult::NotOwner => {
            return Err(AppError::NotFound(format!("chat '{chat_id}' not found")));
        }
    };
    Ok(Json(ApiResponse::success(
        json!({ "chat_id": chat_id, "cancelled": cancelled }),
        start,
    )))
}

/// GET /api/v1/chats/{chat} - Fetch one of the caller's transcripts.
pub async fn get_chat(
    State(state): State<AppState>,
    session: RequestSession,
    Path(chat_id): Path<String>,
) -> Result<Json<ApiResponse<ChatRecord>>, AppError> {
    let start = Instant::now();
    let record = owned_record(&state, &chat_id, &session.identity())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("chat '{chat_id}' not found")))?;
    Ok(Json(ApiResponse::success(record, start)))
}

/// DELETE /api/v1/chats/{chat} - Delete one of the caller's transcripts.
pub async fn delete_chat(
    State(state): State<AppState>,
    session: RequestSession,
    Path(chat_id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    if owned_record(&state, &chat_id, &session.identity())
        .await?
        .is_none()
    {
        return Err(AppError::NotFound(format!("chat '{chat_id}' not found")));
    }
    state.engine.history().delete(&chat_id).await?;
    Ok(Json(ApiResponse::success(
        json!({ "chat_id": chat_id, "deleted": true }),
        start,
    )))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    use palaver_core::llm::scripted::{ScriptStep, ScriptedProvider};
    use palaver_types::config::GlobalConfig;
    use palaver_types::llm::{LlmError, StreamEvent};
    use palaver_types::usage::{ResetPeriod, UsageQuota, UserRole};

    use super::*;
    use crate::state::test_config;

    fn caller(token: &str) -> RequestSession {
        RequestSession {
            user_id: None,
            client_token: token.to_string(),
            role: UserRole::Anonymous,
            ephemeral: false,
        }
    }

    fn body(text: &str) -> Json<SendMessageRequest> {
        Json(SendMessageRequest {
            message: text.to_string(),
        })
    }

    fn path(chat_id: &str) -> Path<(String, String)> {
        Path(("helper".to_string(), chat_id.to_string()))
    }

    fn limited_config() -> GlobalConfig {
        let mut config = test_config();
        config.usage.quotas.push(UsageQuota {
            bot_id: None,
            role: UserRole::Anonymous,
            limit_type: LimitType::Messages,
            max_usage: 1,
            reset_period: ResetPeriod::Daily,
        });
        config
    }

    async fn sse_body(
        sse: Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static>,
    ) -> String {
        let bytes = axum::body::to_bytes(sse.into_response().into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_send_message_saves_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::for_tests(
            dir.path(),
            ScriptedProvider::replying(&["Hel", "lo"]),
            test_config(),
        )
        .await;

        let Json(response) = send_message(State(state.clone()), caller("tok-1"), path("c1"), body("hi there"))
            .await
            .unwrap();
        assert_eq!(response.data.state, AccumulatorState::Done);
        assert!(response.data.persisted);
        let reply = response.data.reply.unwrap();
        assert_eq!(reply.content, "Hello");
        assert_eq!(reply.avatar.as_deref(), Some("🦉"));

        let Json(fetched) = get_chat(State(state), caller("tok-1"), Path("c1".to_string()))
            .await
            .unwrap();
        assert_eq!(fetched.data.messages.len(), 2);
        assert_eq!(fetched.data.client_id.as_deref(), Some("tok-1"));
    }

    #[tokio::test]
    async fn test_send_message_continues_existing_chat() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::replying(&["ok"]);
        let state = AppState::for_tests(dir.path(), provider.clone(), test_config()).await;

        for text in ["first", "second"] {
            send_message(State(state.clone()), caller("tok-1"), path("c1"), body(text))
                .await
                .unwrap();
        }

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].messages.len(), 3);

        let record = state.engine.history().get("c1").await.unwrap().unwrap();
        assert_eq!(record.messages.len(), 4);
    }

    #[tokio::test]
    async fn test_empty_message_and_unknown_bot_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state =
            AppState::for_tests(dir.path(), ScriptedProvider::replying(&["x"]), test_config()).await;

        let err = send_message(State(state.clone()), caller("tok-1"), path("c1"), body("   "))
            .await
            .err()
            .unwrap();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        let err = send_message(
            State(state),
            caller("tok-1"),
            Path(("nobody".to_string(), "c1".to_string())),
            body("hi"),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_provider_failure_maps_to_bad_gateway() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new(vec![
            ScriptStep::Event(StreamEvent::Connected),
            ScriptStep::Error(LlmError::Stream("reset".to_string())),
        ]);
        let state = AppState::for_tests(dir.path(), provider, test_config()).await;

        let err = send_message(State(state.clone()), caller("tok-1"), path("c1"), body("hi"))
            .await
            .err()
            .unwrap();
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
        assert!(state.engine.history().get("c1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_limit_reached_returns_too_many_requests() {
        let dir = tempfile::tempdir().unwrap();
        let state =
            AppState::for_tests(dir.path(), ScriptedProvider::replying(&["ok"]), limited_config())
                .await;

        send_message(State(state.clone()), caller("tok-1"), path("c1"), body("one"))
            .await
            .unwrap();
        let err = send_message(State(state.clone()), caller("tok-1"), path("c2"), body("two"))
            .await
            .err()
            .unwrap();
        assert_eq!(err.into_response().status(), StatusCode::TOO_MANY_REQUESTS);

        // Another client has its own allowance.
        send_message(State(state), caller("tok-2"), path("c3"), body("one"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_foreign_chat_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state =
            AppState::for_tests(dir.path(), ScriptedProvider::replying(&["ok"]), test_config()).await;

        send_message(State(state.clone()), caller("tok-1"), path("c1"), body("mine"))
            .await
            .unwrap();

        let err = get_chat(State(state.clone()), caller("tok-2"), Path("c1".to_string()))
            .await
            .err()
            .unwrap();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);

        let err = send_message(State(state.clone()), caller("tok-2"), path("c1"), body("hijack"))
            .await
            .err()
            .unwrap();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);

        let err = delete_chat(State(state.clone()), caller("tok-2"), Path("c1".to_string()))
            .await
            .err()
            .unwrap();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);

        delete_chat(State(state.clone()), caller("tok-1"), Path("c1".to_string()))
            .await
            .unwrap();
        assert!(state.engine.history().get("c1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_chat_cannot_move_to_another_bot() {
        use palaver_types::bot::{RawBotConfig, RawModelSpec};

        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config();
        config.raw_bots.push(RawBotConfig {
            id: "other".to_string(),
            name: "Other".to_string(),
            avatar: None,
            system_prompt: None,
            model: Some(RawModelSpec::Name("gpt-4o-mini".to_string())),
        });
        let provider = ScriptedProvider::replying(&["ok"]);
        let state = AppState::for_tests(dir.path(), provider.clone(), config).await;

        for text in ["one", "two"] {
            send_message(State(state.clone()), caller("tok-1"), path("c1"), body(text))
                .await
                .unwrap();
        }
        let before = state.engine.history().get("c1").await.unwrap().unwrap();

        let other = || Path(("other".to_string(), "c1".to_string()));
        let err = send_message(State(state.clone()), caller("tok-1"), other(), body("three"))
            .await
            .err()
            .unwrap();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
        let err = stream_chat(State(state.clone()), caller("tok-1"), other(), body("three"))
            .await
            .err()
            .unwrap();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);

        assert_eq!(provider.requests().len(), 2);
        let after = state.engine.history().get("c1").await.unwrap().unwrap();
        assert_eq!(after.bot_id, "helper");
        assert_eq!(after.sequence_number, before.sequence_number);
        assert_eq!(after.messages.len(), 4);
    }

    #[tokio::test]
    async fn test_only_the_owner_can_cancel_a_reply() {
        let dir = tempfile::tempdir().unwrap();
        let state =
            AppState::for_tests(dir.path(), ScriptedProvider::new(vec![ScriptStep::Hang]), test_config())
                .await;

        let owner = caller("owner");
        let bot = state.bot("helper").unwrap();
        let pending = state
            .engine
            .begin(&owner.chat_session("helper").unwrap(), owner.role, "c1", &bot, vec![], "hi")
            .await
            .unwrap();
        let token = pending.cancellation();

        let err = cancel_chat(State(state.clone()), caller("intruder"), Path("c1".to_string()))
            .await
            .err()
            .unwrap();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
        assert!(!token.is_cancelled());

        let Json(response) = cancel_chat(State(state), owner, Path("c1".to_string()))
            .await
            .unwrap();
        assert_eq!(response.data["cancelled"], true);
        assert!(token.is_cancelled());
        drop(pending);
    }

    #[tokio::test]
    async fn test_stream_chat_emits_session_deltas_and_done() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::for_tests(
            dir.path(),
            ScriptedProvider::replying(&["Hel", "lo"]),
            test_config(),
        )
        .await;

        let sse = stream_chat(State(state.clone()), caller("tok-1"), path("c1"), body("hi"))
            .await
            .unwrap();
        let text = sse_body(sse).await;

        let session_at = text.find("event: session").unwrap();
        let delta_at = text.find("event: delta").unwrap();
        let done_at = text.find("event: done").unwrap();
        assert!(session_at < delta_at && delta_at < done_at);
        assert!(text.contains(r#""session_token":"tok-1""#));
        assert!(text.contains(r#""content":"Hello""#));
        assert!(text.contains(r#""persisted":true"#));
        assert!(state.engine.history().get("c1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_stream_chat_reports_limit_in_band() {
        let dir = tempfile::tempdir().unwrap();
        let state =
            AppState::for_tests(dir.path(), ScriptedProvider::replying(&["ok"]), limited_config())
                .await;

        send_message(State(state.clone()), caller("tok-1"), path("c1"), body("one"))
            .await
            .unwrap();
        let sse = stream_chat(State(state), caller("tok-1"), path("c2"), body("two"))
            .await
            .unwrap();
        let text = sse_body(sse).await;

        assert!(text.contains("event: session"));
        assert!(text.contains("event: limit"));
        assert!(text.contains(r#""limit_type":"messages""#));
        assert!(!text.contains("event: delta"));
    }

    #[tokio::test]
    async fn test_failed_stream_emits_error_with_partial() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new(vec![
            ScriptStep::Event(StreamEvent::Connected),
            ScriptStep::Event(StreamEvent::TextDelta {
                text: "Hal".to_string(),
            }),
            ScriptStep::Error(LlmError::Stream("reset".to_string())),
        ]);
        let state = AppState::for_tests(dir.path(), provider, test_config()).await;

        let sse = stream_chat(State(state), caller("tok-1"), path("c1"), body("hi"))
            .await
            .unwrap();
        let text = sse_body(sse).await;
        assert!(text.contains("event: error"));
        assert!(text.contains(r#""partial":"Hal""#));
        assert!(!text.contains("event: done"));
    }

    #[tokio::test]
    async fn test_cancel_without_stream_reports_false() {
        let dir = tempfile::tempdir().unwrap();
        let state =
            AppState::for_tests(dir.path(), ScriptedProvider::replying(&["ok"]), test_config()).await;

        let Json(response) = cancel_chat(State(state), caller("tok-1"), Path("c1".to_string()))
            .await
            .unwrap();
        assert_eq!(response.data["cancelled"], false);
    }
}
