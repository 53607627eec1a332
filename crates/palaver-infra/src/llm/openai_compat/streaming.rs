//! OpenAI SSE stream to [`StreamEvent`] adapter.
//!
//! Maps `async-openai`'s [`ChatCompletionResponseStream`] chunks to the
//! provider-agnostic [`StreamEvent`] enum defined in `palaver-types`.

use futures_util::StreamExt;

use async_openai::types::chat::{ChatCompletionResponseStream, CreateChatCompletionStreamResponse};

use palaver_core::llm::provider::EventStream;
use palaver_types::llm::{LlmError, StreamEvent, Usage};

/// Map an async-openai [`ChatCompletionResponseStream`] to a stream of [`StreamEvent`]s.
///
/// The returned stream emits events in this order:
/// 1. `Connected` -- immediately on entry
/// 2. `TextDelta` -- for each non-empty content chunk, in arrival order
/// 3. `Usage` -- token usage (requires `stream_options.include_usage = true` on request)
/// 4. `Done` -- at the end of the stream
pub fn map_openai_stream(stream: ChatCompletionResponseStream) -> EventStream {
    Box::pin(async_stream::try_stream! {
        yield StreamEvent::Connected;

        let mut stream = stream;
        while let Some(result) = stream.next().await {
            let chunk = result.map_err(|e| LlmError::Stream(e.to_string()))?;
            for event in chunk_events(chunk) {
                yield event;
            }
        }

        yield StreamEvent::Done;
    })
}

/// Events carried by one streamed chunk.
///
/// The final chunk carries usage data with an empty choices array.
fn chunk_events(chunk: CreateChatCompletionStreamResponse) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    for choice in chunk.choices {
        if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
            events.push(StreamEvent::TextDelta { text });
        }
    }

    if let Some(usage) = chunk.usage {
        events.push(StreamEvent::Usage(Usage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        }));
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(json: serde_json::Value) -> CreateChatCompletionStreamResponse {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_content_chunk_yields_delta() {
        let events = chunk_events(chunk(serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "created": 1,
            "model": "gpt-4o",
            "choices": [{ "index": 0, "delta": { "content": "Hel" }, "finish_reason": null }]
        })));
        assert_eq!(
            events,
            vec![StreamEvent::TextDelta {
                text: "Hel".to_string()
            }]
        );
    }

    #[test]
    fn test_empty_content_is_skipped() {
        let events = chunk_events(chunk(serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "created": 1,
            "model": "gpt-4o",
            "choices": [{ "index": 0, "delta": { "role": "assistant", "content": "" }, "finish_reason": null }]
        })));
        assert!(events.is_empty());
    }

    #[test]
    fn test_usage_chunk_yields_usage() {
        let events = chunk_events(chunk(serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "created": 1,
            "model": "gpt-4o",
            "choices": [],
            "usage": { "prompt_tokens": 12, "completion_tokens": 5, "total_tokens": 17 }
        })));
        assert_eq!(
            events,
            vec![StreamEvent::Usage(Usage {
                input_tokens: 12,
                output_tokens: 5
            })]
        );
    }
}
