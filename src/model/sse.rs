//! Server-sent event decoding for streamed chat completions

use std::collections::VecDeque;

use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tracing::{trace, warn};

use super::traits::{ModelEvent, ModelStream, ToolCallDelta};
use crate::error::{Error, Result};

// ─────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChunkResponse {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ChunkToolCall>,
}

#[derive(Debug, Deserialize)]
struct ChunkToolCall {
    #[serde(default)]
    index: Option<u32>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<ChunkFunction>,
}

#[derive(Debug, Deserialize)]
struct ChunkFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

// ─────────────────────────────────────────────────────────────────
// Line Decoder
// ─────────────────────────────────────────────────────────────────

/// Outcome of decoding one `data:` payload
enum Payload {
    Events(Vec<ModelEvent>),
    Done,
}

/// Pulls the payload out of an SSE `data:` line; other fields are ignored
fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// Pulls a readable message from an `{"error": ...}` body
pub(crate) fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| value.get("error").and_then(|v| v.as_str().map(str::to_owned)))
        .or_else(|| value.get("message").and_then(|v| v.as_str().map(str::to_owned)))
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn decode_payload(payload: &str) -> Result<Payload> {
    if payload == "[DONE]" {
        return Ok(Payload::Done);
    }

    let value: serde_json::Value = serde_json::from_str(payload)
        .map_err(|e| Error::remote_malformed(format!("invalid stream chunk: {}", e)))?;

    if value.get("error").is_some() {
        let summary = extract_error_summary(&value).unwrap_or_else(|| payload.to_string());
        return Err(Error::remote_malformed(format!("stream error: {}", summary)));
    }

    let chunk: ChunkResponse = serde_json::from_value(value)
        .map_err(|e| Error::remote_malformed(format!("unexpected stream chunk: {}", e)))?;

    let mut events = Vec::new();
    // Only the first choice is requested
    if let Some(choice) = chunk.choices.into_iter().next() {
        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
            events.push(ModelEvent::Text(content));
        }
        for call in choice.delta.tool_calls {
            let (name, arguments) = match call.function {
                Some(f) => (f.name, f.arguments),
                None => (None, None),
            };
            events.push(ModelEvent::ToolCall(ToolCallDelta {
                index: call.index,
                id: call.id,
                name,
                arguments,
            }));
        }
        if choice.finish_reason.is_some() {
            events.push(ModelEvent::Finished {
                reason: choice.finish_reason,
            });
        }
    }

    Ok(Payload::Events(events))
}

// ─────────────────────────────────────────────────────────────────
// Stream Adapter
// ─────────────────────────────────────────────────────────────────

struct DecodeState<S> {
    body: S,
    buffer: Vec<u8>,
    pending: VecDeque<Result<ModelEvent>>,
    done: bool,
}

impl<S> DecodeState<S> {
    /// Decode every complete line currently buffered
    fn drain_lines(&mut self) {
        while !self.done {
            let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') else {
                break;
            };
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            self.decode_line(&line);
        }
    }

    /// Body ended: a final unterminated line still counts
    fn flush_tail(&mut self) {
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.decode_line(&line);
        }
        self.done = true;
    }

    fn decode_line(&mut self, raw: &[u8]) {
        let line = match std::str::from_utf8(raw) {
            Ok(line) => line.trim(),
            Err(e) => {
                warn!(error = %e, "Invalid UTF-8 in model stream, skipping line");
                return;
            }
        };

        let Some(payload) = extract_data_payload(line) else {
            return;
        };
        if payload.is_empty() {
            return;
        }
        trace!(payload, "SSE payload");

        match decode_payload(payload) {
            Ok(Payload::Events(events)) => self.pending.extend(events.into_iter().map(Ok)),
            Ok(Payload::Done) => self.done = true,
            Err(e) => {
                self.pending.push_back(Err(e));
                self.done = true;
            }
        }
    }
}

/// Turn a chunked SSE body into a stream of model events.
///
/// The stream ends at `[DONE]`, at the end of the body, or right after the
/// first error it yields.
pub fn decode_sse<S, B>(body: S) -> ModelStream
where
    S: Stream<Item = reqwest::Result<B>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = DecodeState {
        body,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((event, state));
            }
            if state.done {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    state.buffer.extend_from_slice(chunk.as_ref());
                    state.drain_lines();
                }
                Some(Err(e)) => {
                    state.pending.push_back(Err(Error::RemoteTransport(e)));
                    state.done = true;
                }
                None => state.flush_tail(),
            }
        }
    })
    .boxed()
}
