//! Remote chat model adapters
//!
//! Personas never touch HTTP directly. They hold a `SharedModel` and the
//! agent runtime drives it through the `ChatModel` trait.

pub mod openai;
pub mod sse;
pub mod traits;

#[cfg(test)]
pub mod mock;

pub use openai::{OpenAiCompatModel, OpenAiConfig};
pub use traits::{
    ChatModel, ChatRequest, Completion, ModelEvent, ModelStream, SharedModel, ToolCall,
    ToolCallBuilder, ToolCallDelta, ToolSpec,
};
