//! Model trait definitions
//!
//! Every persona talks to the remote model through `ChatModel`. The trait is
//! object-safe so one client can be shared by all personas as `SharedModel`.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::Result;
use crate::session::Turn;

// ─────────────────────────────────────────────────────────────────
// Requests
// ─────────────────────────────────────────────────────────────────

/// A function tool offered to the model. Handoffs are expressed this way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
}

/// One chat completion call: instructions, history and optional tools
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// Sent as the leading system message
    pub system: Option<String>,

    /// Conversation so far, oldest first
    pub history: Vec<Turn>,

    /// Tools the model may call instead of (or after) answering
    pub tools: Vec<ToolSpec>,
}

// ─────────────────────────────────────────────────────────────────
// Responses
// ─────────────────────────────────────────────────────────────────

/// A completed tool call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub id: Option<String>,
    pub name: String,
    pub arguments: String,
}

/// Result of a non-streaming completion
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<String>,
}

/// Fragment of a tool call as it arrives in a stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallDelta {
    pub index: Option<u32>,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

/// Incremental event from a streaming completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEvent {
    /// Text fragment to show to the user
    Text(String),
    /// Tool call fragment
    ToolCall(ToolCallDelta),
    /// The model reported why it stopped
    Finished { reason: Option<String> },
}

/// Streaming completion output
pub type ModelStream = BoxStream<'static, Result<ModelEvent>>;

// ─────────────────────────────────────────────────────────────────
// Tool call assembly
// ─────────────────────────────────────────────────────────────────

/// Folds streamed `ToolCallDelta`s into complete `ToolCall`s.
///
/// Deltas carrying an index are merged by index. Providers that omit the
/// index send each call whole, so a delta with a new id starts a new call.
#[derive(Debug, Default)]
pub struct ToolCallBuilder {
    calls: Vec<(u32, ToolCall)>,
}

impl ToolCallBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, delta: ToolCallDelta) {
        let index = match delta.index {
            Some(index) => index,
            None => match (&delta.id, self.calls.last()) {
                (Some(id), Some((last, call))) if call.id.as_deref() == Some(id.as_str()) => *last,
                (None, Some((last, _))) => *last,
                _ => self.calls.len() as u32,
            },
        };

        let position = match self.calls.iter().position(|(i, _)| *i == index) {
            Some(position) => position,
            None => {
                self.calls.push((
                    index,
                    ToolCall {
                        id: None,
                        name: String::new(),
                        arguments: String::new(),
                    },
                ));
                self.calls.len() - 1
            }
        };
        let call = &mut self.calls[position].1;

        if delta.id.is_some() {
            call.id = delta.id;
        }
        if let Some(name) = delta.name {
            call.name.push_str(&name);
        }
        if let Some(arguments) = delta.arguments {
            call.arguments.push_str(&arguments);
        }
    }

    /// Completed calls ordered by index; calls without a name are dropped
    pub fn finish(mut self) -> Vec<ToolCall> {
        self.calls.sort_by_key(|(index, _)| *index);
        self.calls
            .into_iter()
            .map(|(_, call)| call)
            .filter(|call| !call.name.is_empty())
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────
// ChatModel Trait
// ─────────────────────────────────────────────────────────────────

/// A remote chat-completion model
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Backend name for logs (e.g. "openai-compat")
    fn name(&self) -> &'static str;

    /// Model identifier sent with each request
    fn model_id(&self) -> &str;

    /// Single-payload completion
    async fn complete(&self, request: ChatRequest) -> Result<Completion>;

    /// Incremental completion
    async fn stream(&self, request: ChatRequest) -> Result<ModelStream>;
}

/// Model client shared by every persona
pub type SharedModel = Arc<dyn ChatModel>;
