//! Streamed chat-completion bodies as reply fragments.
//!
//! Event framing (line reassembly, multi-line `data:` fields, comments) is
//! done by `eventsource-stream`. This module maps each event's payload onto a
//! fragment: `choices[0].delta.content` is text, `[DONE]` ends the reply and an
//! `error` object (or an `error` event) fails it.

use eventsource_stream::{Event, Eventsource};
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use std::fmt::Display;

use crate::contract::FragmentStream;
use crate::error::ChatError;

/// Payload that marks the end of an OpenAI-style stream.
pub const DONE_MARKER: &str = "[DONE]";

/// What one event payload carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta {
    Content(String),
    /// Role-only, usage-only or empty deltas.
    Empty,
    /// The server reported a failure inside the stream.
    Failed(String),
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

fn error_message(error: &serde_json::Value) -> String {
    match error {
        serde_json::Value::String(message) => message.clone(),
        other => other
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| other.to_string()),
    }
}

/// Decode one completion chunk.
pub fn decode_payload(payload: &str) -> Result<Delta, serde_json::Error> {
    let chunk: ChatCompletionChunk = serde_json::from_str(payload)?;
    if let Some(error) = chunk.error.as_ref().filter(|e| !e.is_null()) {
        return Ok(Delta::Failed(error_message(error)));
    }
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty())
        .map_or(Delta::Empty, Delta::Content))
}

enum Step {
    Fragment(String),
    Skip,
    Done,
    Failed(String),
}

fn step_for(event: &Event) -> Step {
    if event.event == "error" {
        return Step::Failed(event.data.clone());
    }
    let data = event.data.trim();
    if data.is_empty() {
        return Step::Skip;
    }
    if data == DONE_MARKER {
        return Step::Done;
    }
    match decode_payload(data) {
        Ok(Delta::Content(text)) => Step::Fragment(text),
        Ok(Delta::Empty) => Step::Skip,
        Ok(Delta::Failed(message)) => Step::Failed(message),
        Err(e) => {
            tracing::warn!(error = %e, payload = %data, "Skipping unparseable stream payload");
            Step::Skip
        }
    }
}

struct DecodeState {
    events: BoxStream<'static, Result<Event, String>>,
    done: bool,
}

/// Turn a streamed response body into reply fragments.
///
/// The stream ends at `data: [DONE]` or when the body ends. A transport error
/// or an in-stream error payload is reported once as [`ChatError::Stream`] and
/// ends the stream.
pub fn fragment_stream<S, B, E>(bytes: S) -> FragmentStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = DecodeState {
        events: bytes
            .eventsource()
            .map(|event| event.map_err(|e| e.to_string()))
            .boxed(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.done {
            return None;
        }
        loop {
            let event = match state.events.next().await {
                Some(Ok(event)) => event,
                Some(Err(reason)) => {
                    state.done = true;
                    return Some((Err(ChatError::Stream(reason)), state));
                }
                None => return None,
            };

            match step_for(&event) {
                Step::Fragment(text) => return Some((Ok(text), state)),
                Step::Skip => continue,
                Step::Done => return None,
                Step::Failed(message) => {
                    tracing::warn!(message = %message, "Server reported an error mid-stream");
                    state.done = true;
                    return Some((Err(ChatError::Stream(message)), state));
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"index": 0, "delta": {"content": content}}]})
        )
    }

    async fn fragments_of(chunks: Vec<Result<String, String>>) -> Vec<Result<String, ChatError>> {
        fragment_stream(stream::iter(
            chunks.into_iter().map(|c| c.map(String::into_bytes)),
        ))
        .collect()
        .await
    }

    #[test]
    fn decode_payload_reads_first_choice() {
        let payload = r#"{"id":"x","choices":[{"index":0,"delta":{"role":"assistant","content":"fn"}}]}"#;
        assert_eq!(decode_payload(payload).unwrap(), Delta::Content("fn".to_string()));

        let role_only = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(decode_payload(role_only).unwrap(), Delta::Empty);

        let usage_only = r#"{"choices":[],"usage":{"total_tokens":3}}"#;
        assert_eq!(decode_payload(usage_only).unwrap(), Delta::Empty);
    }

    #[test]
    fn decode_payload_surfaces_error_objects() {
        let object = r#"{"error":{"message":"context length exceeded","type":"invalid_request_error"}}"#;
        assert_eq!(
            decode_payload(object).unwrap(),
            Delta::Failed("context length exceeded".to_string())
        );

        let plain = r#"{"error":"model unloaded"}"#;
        assert_eq!(
            decode_payload(plain).unwrap(),
            Delta::Failed("model unloaded".to_string())
        );

        let null = r#"{"error":null,"choices":[{"delta":{"content":"ok"}}]}"#;
        assert_eq!(decode_payload(null).unwrap(), Delta::Content("ok".to_string()));
    }

    #[tokio::test]
    async fn yields_contents_until_done() {
        let body = format!("{}{}data: [DONE]\n\n{}", chunk("Hello "), chunk("world"), chunk("late"));
        let items = fragments_of(vec![Ok(body)]).await;
        let texts: Vec<String> = items.into_iter().map(|f| f.unwrap()).collect();
        assert_eq!(texts, vec!["Hello ", "world"]);
    }

    #[tokio::test]
    async fn events_split_across_chunks_are_reassembled() {
        let body = chunk("across");
        let (head, tail) = body.split_at(12);
        let items = fragments_of(vec![Ok(head.to_string()), Ok(tail.to_string())]).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap(), "across");
    }

    #[tokio::test]
    async fn multi_line_data_fields_form_one_payload() {
        let body = "data: {\"choices\":[{\"delta\":\ndata: {\"content\":\"joined\"}}]}\n\n".to_string();
        let items = fragments_of(vec![Ok(body)]).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap(), "joined");
    }

    #[tokio::test]
    async fn comments_and_other_fields_are_ignored() {
        let body = format!(": keep-alive\n\nid: 7\nretry: 1000\n{}", chunk("x"));
        let items = fragments_of(vec![Ok(body)]).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap(), "x");
    }

    #[tokio::test]
    async fn error_payload_mid_stream_fails_the_reply() {
        let body = format!(
            "{}data: {{\"error\":{{\"message\":\"context length exceeded\"}}}}\n\n{}",
            chunk("partial "),
            chunk("after")
        );
        let items = fragments_of(vec![Ok(body)]).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "partial ");
        match &items[1] {
            Err(ChatError::Stream(message)) => assert!(message.contains("context length exceeded")),
            other => panic!("expected a stream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_event_fails_the_reply() {
        let body = format!("{}event: error\ndata: upstream closed\n\n", chunk("partial "));
        let items = fragments_of(vec![Ok(body)]).await;
        assert_eq!(items.len(), 2);
        assert!(matches!(&items[1], Err(ChatError::Stream(m)) if m == "upstream closed"));
    }

    #[tokio::test]
    async fn unparseable_payload_is_skipped() {
        let body = format!("data: not json\n\n{}", chunk("kept"));
        let items = fragments_of(vec![Ok(body)]).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap(), "kept");
    }

    #[tokio::test]
    async fn transport_error_ends_the_stream() {
        let items = fragments_of(vec![
            Ok(chunk("before ")),
            Err("connection reset".to_string()),
            Ok(chunk("after")),
        ])
        .await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "before ");
        assert!(matches!(items[1], Err(ChatError::Stream(_))));
    }
}
