//! Live view of one exchange as a stream of text deltas and a final report.
//!
//! The exchange runs in its own task, so provider deltas are applied and
//! the transcript is saved at the provider's pace, however slowly the feed
//! is read. Dropping the feed before its report cancels the reply.

use std::sync::Arc;

use futures_util::Stream;
use tokio::sync::watch;
use tracing::warn;

use super::accumulator::AssemblySnapshot;
use super::engine::{ChatEngine, ExchangeReport, PendingExchange};
use super::repository::ChatRecordRepository;
use crate::context::repository::ContextRepository;

/// One item of an exchange feed.
#[derive(Debug)]
pub enum ExchangeEvent {
    /// Text appended to the assistant reply since the previous delta.
    Delta(String),
    /// The last item. Missing only if the exchange task panicked.
    Finished(ExchangeReport),
}

enum Step {
    Finished(Option<ExchangeReport>),
    Changed { open: bool },
}

/// Drive `pending` to completion, yielding reply text as it grows.
///
/// The concatenation of all deltas equals the content of the last
/// published snapshot, so partial replies are fully rendered too.
pub fn exchange_feed<R, C>(
    engine: Arc<ChatEngine<R, C>>,
    pending: PendingExchange,
) -> impl Stream<Item = ExchangeEvent> + Send + 'static
where
    R: ChatRecordRepository + 'static,
    C: ContextRepository + 'static,
{
    async_stream::stream! {
        let mut rx = pending.subscribe();
        let mut sent = 0usize;
        let guard = pending.cancellation().drop_guard();
        let chat_id = pending.chat_id().to_string();

        let mut task = tokio::spawn(async move { engine.finish(pending).await });

        let report = loop {
            let step = tokio::select! {
                biased;
                changed = rx.changed() => Step::Changed { open: changed.is_ok() },
                joined = &mut task => Step::Finished(joined.ok()),
            };
            match step {
                Step::Finished(report) => break report,
                Step::Changed { open } => {
                    if let Some(text) = take_fresh(&rx, &mut sent) {
                        yield ExchangeEvent::Delta(text);
                    }
                    if !open {
                        break (&mut task).await.ok();
                    }
                }
            }
        };
        guard.disarm();

        if let Some(text) = take_fresh(&rx, &mut sent) {
            yield ExchangeEvent::Delta(text);
        }
        match report {
            Some(report) => yield ExchangeEvent::Finished(report),
            None => warn!(chat_id = %chat_id, "exchange task ended without a report"),
        }
    }
}

/// Content appended since `sent` bytes were emitted.
fn take_fresh(rx: &watch::Receiver<AssemblySnapshot>, sent: &mut usize) -> Option<String> {
    let snapshot = rx.borrow();
    let fresh = snapshot
        .content
        .get(*sent..)
        .filter(|s| !s.is_empty())?
        .to_string();
    *sent = snapshot.content.len();
    Some(fresh)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::StreamExt;

    use super::*;
    use crate::chat::accumulator::{ExchangeOutcome, StreamingAccumulator};
    use crate::chat::engine::{EngineSettings, PersistenceStatus, build_engine};
    use crate::llm::box_provider::BoxLlmProvider;
    use crate::llm::scripted::{ScriptStep, ScriptedProvider};
    use crate::storage::memory::{InMemoryChatRecordRepository, InMemoryContextRepository};
    use palaver_types::bot::{BotConfig, ModelSettings};
    use palaver_types::chat::ChatSession;
    use palaver_types::config::default_reset_anchor;
    use palaver_types::llm::StreamEvent;
    use palaver_types::usage::UserRole;

    type Engine = ChatEngine<InMemoryChatRecordRepository, InMemoryContextRepository>;

    fn engine(script: Vec<ScriptStep>) -> Arc<Engine> {
        let provider = BoxLlmProvider::new(ScriptedProvider::new(script));
        Arc::new(build_engine(
            StreamingAccumulator::new(Arc::new(provider)),
            Arc::new(InMemoryChatRecordRepository::new()),
            Arc::new(InMemoryContextRepository::new()),
            vec![],
            default_reset_anchor(),
            EngineSettings::default(),
        ))
    }

    fn bot() -> BotConfig {
        BotConfig {
            id: "b1".to_string(),
            name: "Helper".to_string(),
            avatar: None,
            system_prompt: None,
            model: ModelSettings::default(),
        }
    }

    fn delta(text: &str) -> ScriptStep {
        ScriptStep::Event(StreamEvent::TextDelta {
            text: text.to_string(),
        })
    }

    async fn begin(engine: &Engine) -> PendingExchange {
        let session = ChatSession::new("tok", None, Some("client-1".to_string()), "b1").unwrap();
        engine
            .begin(&session, UserRole::Anonymous, "c1", &bot(), vec![], "hi")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_deltas_concatenate_to_reply() {
        let engine = engine(vec![
            ScriptStep::Event(StreamEvent::Connected),
            delta("Hel"),
            ScriptStep::Pause(Duration::from_millis(5)),
            delta("lo"),
            ScriptStep::Pause(Duration::from_millis(5)),
            delta(" world"),
            ScriptStep::Event(StreamEvent::Done),
        ]);
        let pending = begin(&engine).await;

        let events: Vec<ExchangeEvent> = exchange_feed(Arc::clone(&engine), pending).collect().await;
        let (last, deltas) = events.split_last().unwrap();

        let text: String = deltas
            .iter()
            .map(|e| match e {
                ExchangeEvent::Delta(t) => t.as_str(),
                ExchangeEvent::Finished(_) => panic!("finished before the end"),
            })
            .collect();
        assert_eq!(text, "Hello world");

        let ExchangeEvent::Finished(report) = last else {
            panic!("last event must be Finished");
        };
        assert!(matches!(report.outcome, ExchangeOutcome::Completed { .. }));
        assert!(matches!(report.persistence, PersistenceStatus::Saved(_)));
        assert!(!engine.accumulator().registry().is_streaming("c1"));
    }

    #[tokio::test]
    async fn test_cancel_mid_stream_reports_partial() {
        let engine = engine(vec![
            ScriptStep::Event(StreamEvent::Connected),
            delta("Hel"),
            ScriptStep::Hang,
        ]);
        let pending = begin(&engine).await;
        let token = pending.cancellation();

        let mut feed = Box::pin(exchange_feed(Arc::clone(&engine), pending));
        let mut text = String::new();
        let report = loop {
            match feed.next().await {
                Some(ExchangeEvent::Delta(t)) => {
                    text.push_str(&t);
                    token.cancel();
                }
                Some(ExchangeEvent::Finished(report)) => break report,
                None => panic!("feed ended without a report"),
            }
        };

        assert_eq!(text, "Hel");
        let ExchangeOutcome::Cancelled { partial } = report.outcome else {
            panic!("expected cancellation, got {:?}", report.outcome);
        };
        assert_eq!(partial.unwrap().content, "Hel");
        assert!(matches!(report.persistence, PersistenceStatus::Skipped));
        assert!(feed.next().await.is_none());
    }

    #[tokio::test]
    async fn test_save_does_not_wait_for_the_reader() {
        let engine = engine(vec![
            ScriptStep::Event(StreamEvent::Connected),
            delta("Hel"),
            ScriptStep::Pause(Duration::from_millis(5)),
            delta("lo"),
            ScriptStep::Event(StreamEvent::Done),
        ]);
        let pending = begin(&engine).await;

        let mut feed = Box::pin(exchange_feed(Arc::clone(&engine), pending));
        assert!(feed.next().await.is_some());

        // Stop reading; the reply still completes and is saved.
        tokio::time::timeout(Duration::from_secs(1), async {
            while engine.history().get("c1").await.unwrap().is_none() {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();
        let record = engine.history().get("c1").await.unwrap().unwrap();
        assert_eq!(record.messages.last().unwrap().content, "Hello");
        drop(feed);
    }

    #[tokio::test]
    async fn test_dropping_feed_cancels_reply() {
        let engine = engine(vec![
            ScriptStep::Event(StreamEvent::Connected),
            delta("Hel"),
            ScriptStep::Hang,
        ]);
        let pending = begin(&engine).await;
        let token = pending.cancellation();

        let mut feed = Box::pin(exchange_feed(Arc::clone(&engine), pending));
        assert!(matches!(feed.next().await, Some(ExchangeEvent::Delta(_))));
        drop(feed);
        assert!(token.is_cancelled());

        tokio::time::timeout(Duration::from_secs(1), async {
            while engine.accumulator().registry().is_streaming("c1") {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();
        assert!(engine.history().get("c1").await.unwrap().is_none());
    }
}
