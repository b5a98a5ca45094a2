//! Agent runtime
//!
//! Runs a persona against a conversation and streams the outcome as
//! `RunEvent`s over a channel.

pub mod runtime;

pub use runtime::{AgentRuntime, HandoffRuntime, RunEvent, RunStream, RuntimeConfig};
