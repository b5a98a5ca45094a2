//! Scripted model for tests

use std::collections::VecDeque;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;

use super::traits::{
    ChatModel, ChatRequest, Completion, ModelEvent, ModelStream, ToolCallBuilder, ToolCallDelta,
};
use crate::error::{Error, Result};

/// One scripted reply
#[derive(Debug, Clone)]
pub enum Reply {
    /// Stream these events, then end
    Events(Vec<ModelEvent>),
    /// Stream these events, then fail with this message
    FailAfter(Vec<ModelEvent>, String),
    /// Reject the request outright with this HTTP status
    Status(u16, String),
}

impl Reply {
    /// Plain text answer streamed as the given fragments
    pub fn text(fragments: &[&str]) -> Self {
        Reply::Events(
            fragments
                .iter()
                .map(|f| ModelEvent::Text(f.to_string()))
                .collect(),
        )
    }

    /// Optional preamble followed by a handoff tool call
    pub fn handoff(preamble: &[&str], tool: &str) -> Self {
        let mut events: Vec<ModelEvent> = preamble
            .iter()
            .map(|f| ModelEvent::Text(f.to_string()))
            .collect();
        events.push(tool_call(0, tool));
        Reply::Events(events)
    }
}

pub fn tool_call(index: u32, name: &str) -> ModelEvent {
    ModelEvent::ToolCall(ToolCallDelta {
        index: Some(index),
        id: Some(format!("call_{}", index)),
        name: Some(name.to_string()),
        arguments: Some("{}".to_string()),
    })
}

/// Model that answers from a queue and records every request
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }

    fn next_reply(&self, request: ChatRequest) -> Reply {
        self.requests.lock().push(request);
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Reply::Status(500, "script exhausted".into()))
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn model_id(&self) -> &str {
        "scripted-model"
    }

    async fn complete(&self, request: ChatRequest) -> Result<Completion> {
        let (events, failure) = match self.next_reply(request) {
            Reply::Events(events) => (events, None),
            Reply::FailAfter(events, message) => (events, Some(message)),
            Reply::Status(status, body) => return Err(Error::RemoteStatus { status, body }),
        };
        if let Some(message) = failure {
            return Err(Error::remote_malformed(message));
        }

        let mut completion = Completion::default();
        let mut calls = ToolCallBuilder::new();
        for event in events {
            match event {
                ModelEvent::Text(text) => completion.text.push_str(&text),
                ModelEvent::ToolCall(delta) => calls.push(delta),
                ModelEvent::Finished { reason } => completion.finish_reason = reason,
            }
        }
        completion.tool_calls = calls.finish();
        Ok(completion)
    }

    async fn stream(&self, request: ChatRequest) -> Result<ModelStream> {
        let (events, failure) = match self.next_reply(request) {
            Reply::Events(events) => (events, None),
            Reply::FailAfter(events, message) => (events, Some(message)),
            Reply::Status(status, body) => return Err(Error::RemoteStatus { status, body }),
        };

        let mut items: Vec<Result<ModelEvent>> = events.into_iter().map(Ok).collect();
        if let Some(message) = failure {
            items.push(Err(Error::remote_malformed(message)));
        }
        Ok(stream::iter(items).boxed())
    }
}
