//! A provider that replays a fixed script of events.
//!
//! Used as a test double across the workspace, and handy for exercising
//! front-ends without network access.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use palaver_types::llm::{CompletionRequest, LlmError, ProviderCapabilities, StreamEvent};

use super::provider::{EventStream, LlmProvider};

/// One step of a scripted reply.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Event(StreamEvent),
    Error(LlmError),
    /// Sleep before the next step.
    Pause(Duration),
    /// Never yield again; the stream stays open until dropped.
    Hang,
}

/// Replays the same script for every request and records what it was asked.
#[derive(Debug, Clone)]
pub struct ScriptedProvider {
    script: Vec<ScriptStep>,
    capabilities: ProviderCapabilities,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<ScriptStep>) -> Self {
        Self {
            script,
            capabilities: ProviderCapabilities::default(),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A well-formed reply: one delta per chunk, then `Done`.
    pub fn replying(chunks: &[&str]) -> Self {
        let mut script = vec![ScriptStep::Event(StreamEvent::Connected)];
        script.extend(chunks.iter().map(|c| {
            ScriptStep::Event(StreamEvent::TextDelta {
                text: (*c).to_string(),
            })
        }));
        script.push(ScriptStep::Event(StreamEvent::Done));
        Self::new(script)
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    fn stream(&self, request: CompletionRequest) -> EventStream {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        let script = self.script.clone();

        Box::pin(async_stream::stream! {
            for step in script {
                match step {
                    ScriptStep::Event(event) => yield Ok(event),
                    ScriptStep::Error(err) => {
                        yield Err(err);
                        return;
                    }
                    ScriptStep::Pause(duration) => tokio::time::sleep(duration).await,
                    ScriptStep::Hang => std::future::pending::<()>().await,
                }
            }
        })
    }
}
