//! Streaming agent runtime with handoff support
//!
//! A run starts at the dispatcher. Whatever text it produces is streamed,
//! and if it calls one of its handoff tools the run continues with that
//! delegate on the same history. Every text fragment that reaches the
//! caller is part of the final output, in order.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::config::AgentSettings;
use crate::error::{Error, Result};
use crate::model::{ChatRequest, ModelEvent, ToolCall, ToolCallBuilder};
use crate::persona::Persona;
use crate::session::Turn;

// ─────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────

/// Events emitted by a streamed run
#[derive(Debug)]
pub enum RunEvent {
    /// Text fragment for the user
    Delta(String),

    /// Control moved to a delegate
    Handoff { from: String, to: String },

    /// Run finished; `final_output` is every delta concatenated
    Completed { agent: String, final_output: String },

    /// Run aborted; no further events follow
    Failed(Error),
}

/// Receiving end of a streamed run
#[derive(Debug)]
pub struct RunStream {
    rx: mpsc::Receiver<RunEvent>,
}

impl RunStream {
    pub fn new(rx: mpsc::Receiver<RunEvent>) -> Self {
        Self { rx }
    }

    /// Next event, or `None` once the run task has gone away
    pub async fn next(&mut self) -> Option<RunEvent> {
        self.rx.recv().await
    }
}

/// Executes a persona against a history and streams the result
pub trait AgentRuntime: Send + Sync {
    fn run_streamed(&self, agent: Arc<Persona>, history: Vec<Turn>) -> RunStream;
}

// ─────────────────────────────────────────────────────────────────
// Handoff Runtime
// ─────────────────────────────────────────────────────────────────

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Handoffs followed per run
    pub max_handoffs: u32,
    /// Use streaming completions
    pub stream: bool,
    /// Event buffer between the run task and its consumer
    pub channel_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_handoffs: 1,
            stream: true,
            channel_capacity: 64,
        }
    }
}

impl From<&AgentSettings> for RuntimeConfig {
    fn from(settings: &AgentSettings) -> Self {
        Self {
            max_handoffs: settings.max_handoffs,
            stream: settings.stream,
            ..Default::default()
        }
    }
}

/// Runtime that follows handoff tool calls between personas
#[derive(Debug, Clone, Default)]
pub struct HandoffRuntime {
    config: RuntimeConfig,
}

impl HandoffRuntime {
    pub fn new(config: RuntimeConfig) -> Self {
        Self { config }
    }
}

impl AgentRuntime for HandoffRuntime {
    fn run_streamed(&self, agent: Arc<Persona>, history: Vec<Turn>) -> RunStream {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let config = self.config.clone();

        tokio::spawn(async move {
            let mut run = Run {
                config,
                tx,
                output: String::new(),
            };
            let event = match run.execute(agent, &history).await {
                Ok(agent) => RunEvent::Completed {
                    agent,
                    final_output: run.output,
                },
                Err(Error::ConnectionClosed) => {
                    debug!("Run consumer went away");
                    return;
                }
                Err(e) => RunEvent::Failed(e),
            };
            // Consumer may have left; nothing else to do
            let _ = run.tx.send(event).await;
        });

        RunStream::new(rx)
    }
}

/// State of one run inside its task
struct Run {
    config: RuntimeConfig,
    tx: mpsc::Sender<RunEvent>,
    output: String,
}

impl Run {
    /// Drive the handoff chain; returns the name of the persona that answered
    #[instrument(skip_all, fields(agent = %agent.name))]
    async fn execute(&mut self, agent: Arc<Persona>, history: &[Turn]) -> Result<String> {
        let mut current = agent;
        let mut handoffs = 0u32;

        loop {
            let request = ChatRequest {
                system: Some(current.instructions.clone()),
                history: history.to_vec(),
                tools: current.handoff_tools(),
            };

            debug!(agent = %current.name, turns = history.len(), "Calling model");
            let calls = if self.config.stream {
                self.stream_step(&current, request).await?
            } else {
                self.complete_step(&current, request).await?
            };

            let Some(target) = select_handoff(&current, &calls)? else {
                info!(agent = %current.name, chars = self.output.len(), "Run completed");
                return Ok(current.name.clone());
            };

            if handoffs >= self.config.max_handoffs {
                warn!(
                    from = %current.name,
                    to = %target.name,
                    limit = self.config.max_handoffs,
                    "Handoff limit reached, ending run"
                );
                return Ok(current.name.clone());
            }
            handoffs += 1;

            info!(from = %current.name, to = %target.name, "Handoff");
            self.emit(RunEvent::Handoff {
                from: current.name.clone(),
                to: target.name.clone(),
            })
            .await?;
            current = target;
        }
    }

    async fn stream_step(&mut self, agent: &Persona, request: ChatRequest) -> Result<Vec<ToolCall>> {
        let mut stream = agent.model.stream(request).await?;
        let mut calls = ToolCallBuilder::new();

        while let Some(event) = stream.next().await {
            match event? {
                ModelEvent::Text(text) => self.delta(text).await?,
                ModelEvent::ToolCall(delta) => calls.push(delta),
                ModelEvent::Finished { reason } => {
                    debug!(agent = %agent.name, reason = ?reason, "Model finished");
                }
            }
        }

        Ok(calls.finish())
    }

    async fn complete_step(&mut self, agent: &Persona, request: ChatRequest) -> Result<Vec<ToolCall>> {
        let completion = agent.model.complete(request).await?;
        debug!(agent = %agent.name, reason = ?completion.finish_reason, "Model finished");
        if !completion.text.is_empty() {
            self.delta(completion.text).await?;
        }
        Ok(completion.tool_calls)
    }

    async fn delta(&mut self, text: String) -> Result<()> {
        self.output.push_str(&text);
        self.emit(RunEvent::Delta(text)).await
    }

    async fn emit(&self, event: RunEvent) -> Result<()> {
        self.tx.send(event).await.map_err(|_| Error::ConnectionClosed)
    }
}

/// Pick the delegate named by the first tool call.
///
/// Extra calls are ignored. A name that is not one of `agent`'s delegates
/// fails the run.
fn select_handoff(agent: &Persona, calls: &[ToolCall]) -> Result<Option<Arc<Persona>>> {
    let Some(first) = calls.first() else {
        return Ok(None);
    };

    if calls.len() > 1 {
        let ignored: Vec<&str> = calls[1..].iter().map(|c| c.name.as_str()).collect();
        warn!(agent = %agent.name, chosen = %first.name, ignored = ?ignored, "Multiple handoffs requested, following the first");
    }

    agent
        .delegate_for_tool(&first.name)
        .cloned()
        .map(Some)
        .ok_or_else(|| Error::UnknownDelegate {
            tool: first.name.clone(),
        })
}
