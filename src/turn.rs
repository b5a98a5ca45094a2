//! Chat turn handling
//!
//! One call to `TurnHandler::handle` is one user turn: record the message,
//! open a reply in the UI, stream the run into it, then settle the reply and
//! the history. Remote failures end up in the reply as `Error: ...` and never
//! escape the turn.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, instrument, warn};

use crate::agent::{AgentRuntime, RunEvent};
use crate::error::{Error, Result};
use crate::persona::Persona;
use crate::session::{Session, TurnState};

/// A reply message in the UI that can be opened, streamed into and updated
#[async_trait]
pub trait ReplySink: Send {
    /// Show a new reply with placeholder text
    async fn open(&mut self, placeholder: &str) -> Result<()>;

    /// Append a fragment to the open reply
    async fn stream_token(&mut self, delta: &str) -> Result<()>;

    /// Replace the reply's content
    async fn update(&mut self, content: &str) -> Result<()>;
}

/// How a turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The assistant turn was appended to the history
    Answered { persona: String, content: String },
    /// The reply shows `message`; the history only gained the user turn
    Failed { message: String },
}

/// Runs user turns for every session against one dispatcher
#[derive(Clone)]
pub struct TurnHandler {
    dispatcher: Arc<Persona>,
    runtime: Arc<dyn AgentRuntime>,
    placeholder: String,
}

impl TurnHandler {
    pub fn new(
        dispatcher: Arc<Persona>,
        runtime: Arc<dyn AgentRuntime>,
        placeholder: impl Into<String>,
    ) -> Self {
        Self {
            dispatcher,
            runtime,
            placeholder: placeholder.into(),
        }
    }

    /// Name shown as the author of replies
    pub fn author(&self) -> &str {
        &self.dispatcher.name
    }

    /// Handle one user message.
    ///
    /// Errors returned from here come from the UI sink, meaning the session
    /// itself is gone. Model failures are reported through the reply.
    #[instrument(skip_all, fields(session = %session.id()))]
    pub async fn handle(
        &self,
        session: &mut Session,
        input: &str,
        reply: &mut dyn ReplySink,
    ) -> Result<TurnOutcome> {
        reply.open(&self.placeholder).await?;

        session.push_user(input);
        session.set_state(TurnState::AwaitingModelResponse);
        debug!(input = %input, turns = session.len(), "User turn recorded");

        let result = self.stream_run(session, reply).await;
        session.set_state(TurnState::Idle);

        match result {
            Ok(Ok((persona, content))) => {
                session.push_assistant(content.clone());
                reply.update(&content).await?;
                info!(persona = %persona, chars = content.len(), "Turn answered");
                Ok(TurnOutcome::Answered { persona, content })
            }
            Ok(Err(e)) => {
                if e.is_remote() {
                    warn!(error = %e.format_for_log(), "Turn failed");
                } else {
                    error!(error = %e.format_for_log(), "Turn failed");
                }
                let message = format!("Error: {}", e);
                reply.update(&message).await?;
                Ok(TurnOutcome::Failed { message })
            }
            Err(e) => Err(e),
        }
    }

    /// Forward run events to the reply.
    ///
    /// The outer `Result` is the sink; the inner one is the run.
    async fn stream_run(
        &self,
        session: &mut Session,
        reply: &mut dyn ReplySink,
    ) -> Result<Result<(String, String)>> {
        let mut run = self
            .runtime
            .run_streamed(self.dispatcher.clone(), session.turns().to_vec());
        let mut streamed = String::new();

        while let Some(event) = run.next().await {
            match event {
                RunEvent::Delta(delta) => {
                    session.set_state(TurnState::Streaming);
                    streamed.push_str(&delta);
                    reply.stream_token(&delta).await?;
                }
                RunEvent::Handoff { from, to } => {
                    session.set_state(TurnState::Streaming);
                    info!(from = %from, to = %to, "Run handed off");
                }
                RunEvent::Completed {
                    agent,
                    final_output,
                } => {
                    if final_output != streamed {
                        warn!(
                            streamed = streamed.len(),
                            final_output = final_output.len(),
                            "Final output differs from streamed text"
                        );
                    }
                    return Ok(Ok((agent, final_output)));
                }
                RunEvent::Failed(e) => return Ok(Err(e)),
            }
        }

        Ok(Err(Error::Internal(
            "agent run ended without a result".to_string(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{HandoffRuntime, RunStream};
    use crate::model::mock::{Reply, ScriptedModel};
    use crate::model::{ModelEvent, SharedModel};
    use crate::persona::PersonaRegistry;
    use crate::session::{Role, Turn};
    use tokio::sync::mpsc;

    /// Records every sink call
    #[derive(Debug, Default)]
    struct RecordingSink {
        calls: Vec<SinkCall>,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum SinkCall {
        Open(String),
        Token(String),
        Update(String),
    }

    impl RecordingSink {
        fn tokens(&self) -> String {
            self.calls
                .iter()
                .filter_map(|c| match c {
                    SinkCall::Token(t) => Some(t.as_str()),
                    _ => None,
                })
                .collect()
        }

        fn last_update(&self) -> Option<&str> {
            self.calls.iter().rev().find_map(|c| match c {
                SinkCall::Update(u) => Some(u.as_str()),
                _ => None,
            })
        }
    }

    #[async_trait]
    impl ReplySink for RecordingSink {
        async fn open(&mut self, placeholder: &str) -> Result<()> {
            self.calls.push(SinkCall::Open(placeholder.to_string()));
            Ok(())
        }

        async fn stream_token(&mut self, delta: &str) -> Result<()> {
            self.calls.push(SinkCall::Token(delta.to_string()));
            Ok(())
        }

        async fn update(&mut self, content: &str) -> Result<()> {
            self.calls.push(SinkCall::Update(content.to_string()));
            Ok(())
        }
    }

    /// Sink whose UI has disconnected
    struct ClosedSink;

    #[async_trait]
    impl ReplySink for ClosedSink {
        async fn open(&mut self, _placeholder: &str) -> Result<()> {
            Err(Error::ConnectionClosed)
        }

        async fn stream_token(&mut self, _delta: &str) -> Result<()> {
            Err(Error::ConnectionClosed)
        }

        async fn update(&mut self, _content: &str) -> Result<()> {
            Err(Error::ConnectionClosed)
        }
    }

    /// Runtime whose run task dies without a terminal event
    struct VanishingRuntime;

    impl AgentRuntime for VanishingRuntime {
        fn run_streamed(&self, _agent: Arc<Persona>, _history: Vec<Turn>) -> RunStream {
            let (_tx, rx) = mpsc::channel(1);
            RunStream::new(rx)
        }
    }

    fn handler(model: Arc<ScriptedModel>) -> TurnHandler {
        let shared: SharedModel = model;
        let dispatcher = PersonaRegistry::bundled().unwrap().build(shared).unwrap();
        TurnHandler::new(dispatcher, Arc::new(HandoffRuntime::default()), "Thinking...")
    }

    #[tokio::test]
    async fn test_hello_turn() {
        let model = Arc::new(ScriptedModel::new(vec![Reply::text(&["Hi", " there!"])]));
        let handler = handler(model.clone());
        let mut session = Session::new();
        let mut sink = RecordingSink::default();

        let outcome = handler.handle(&mut session, "Hello", &mut sink).await.unwrap();

        assert_eq!(
            outcome,
            TurnOutcome::Answered {
                persona: "Supreme AI".into(),
                content: "Hi there!".into()
            }
        );
        assert_eq!(
            session.turns(),
            &[Turn::user("Hello"), Turn::assistant("Hi there!")]
        );
        assert_eq!(
            sink.calls,
            vec![
                SinkCall::Open("Thinking...".into()),
                SinkCall::Token("Hi".into()),
                SinkCall::Token(" there!".into()),
                SinkCall::Update("Hi there!".into()),
            ]
        );
        assert_eq!(session.state(), TurnState::Idle);
        assert_eq!(model.requests()[0].history, vec![Turn::user("Hello")]);
    }

    #[tokio::test]
    async fn test_history_grows_two_per_successful_turn() {
        let replies = (0..4)
            .map(|i| {
                let answer = format!("answer {}", i);
                Reply::text(&[answer.as_str()])
            })
            .collect();
        let model = Arc::new(ScriptedModel::new(replies));
        let handler = handler(model.clone());
        let mut session = Session::new();

        for i in 0..4 {
            let outcome = handler
                .handle(&mut session, &format!("question {}", i), &mut RecordingSink::default())
                .await
                .unwrap();
            assert!(matches!(outcome, TurnOutcome::Answered { .. }));
            assert_eq!(session.len(), 2 * (i + 1));
        }

        let roles: Vec<Role> = session.turns().iter().map(|t| t.role).collect();
        for (i, role) in roles.iter().enumerate() {
            let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
            assert_eq!(*role, expected);
        }

        // The model saw the whole history every time, ending with the new user turn
        let requests = model.requests();
        assert_eq!(requests[3].history.len(), 7);
        assert_eq!(requests[3].history.last().unwrap(), &Turn::user("question 3"));
    }

    #[tokio::test]
    async fn test_silent_run_appends_empty_assistant_turn() {
        // Model stops without text or a handoff
        let model = Arc::new(ScriptedModel::new(vec![Reply::Events(vec![ModelEvent::Finished {
            reason: Some("stop".into()),
        }])]));
        let handler = handler(model);
        let mut session = Session::new();
        let mut sink = RecordingSink::default();

        let outcome = handler.handle(&mut session, "...", &mut sink).await.unwrap();

        assert_eq!(
            outcome,
            TurnOutcome::Answered {
                persona: "Supreme AI".into(),
                content: String::new()
            }
        );
        assert_eq!(session.turns(), &[Turn::user("..."), Turn::assistant("")]);
        assert_eq!(
            sink.calls,
            vec![SinkCall::Open("Thinking...".into()), SinkCall::Update(String::new())]
        );
        assert_eq!(session.state(), TurnState::Idle);
    }

    #[tokio::test]
    async fn test_failed_turn_keeps_user_turn_only() {
        let model = Arc::new(ScriptedModel::new(vec![
            Reply::text(&["fine"]),
            Reply::Status(503, "overloaded".into()),
        ]));
        let handler = handler(model);
        let mut session = Session::new();

        handler.handle(&mut session, "one", &mut RecordingSink::default()).await.unwrap();

        let mut sink = RecordingSink::default();
        let outcome = handler.handle(&mut session, "two", &mut sink).await.unwrap();

        // 2(k-1) + 1 with k = 2
        assert_eq!(session.len(), 3);
        assert_eq!(session.turns().last().unwrap(), &Turn::user("two"));
        let TurnOutcome::Failed { message } = outcome else {
            panic!("expected failure");
        };
        assert!(message.starts_with("Error: "));
        assert!(message.contains("503"));
        assert_eq!(sink.last_update(), Some(message.as_str()));
        assert_eq!(session.state(), TurnState::Idle);
    }

    #[tokio::test]
    async fn test_mid_stream_failure_replaces_partial_reply() {
        let model = Arc::new(ScriptedModel::new(vec![Reply::FailAfter(
            vec![ModelEvent::Text("half an ans".into())],
            "stream cut".into(),
        )]));
        let handler = handler(model);
        let mut session = Session::new();
        let mut sink = RecordingSink::default();

        let outcome = handler.handle(&mut session, "question", &mut sink).await.unwrap();

        assert!(matches!(outcome, TurnOutcome::Failed { .. }));
        assert_eq!(sink.tokens(), "half an ans");
        assert!(sink.last_update().unwrap().starts_with("Error: "));
        assert_eq!(session.len(), 1);
    }

    #[tokio::test]
    async fn test_streamed_tokens_equal_final_turn_across_handoff() {
        let model = Arc::new(ScriptedModel::new(vec![
            Reply::handoff(&["One moment. "], "transfer_to_history_politics"),
            Reply::text(&["Rome ", "fell ", "in 476."]),
        ]));
        let handler = handler(model);
        let mut session = Session::new();
        let mut sink = RecordingSink::default();

        let outcome = handler.handle(&mut session, "When did Rome fall?", &mut sink).await.unwrap();

        let TurnOutcome::Answered { persona, content } = outcome else {
            panic!("expected answer");
        };
        assert_eq!(persona, "History & Politics Expert");
        assert_eq!(sink.tokens(), content);
        assert_eq!(session.turns()[1].content, content);
    }

    #[tokio::test]
    async fn test_run_without_terminal_event_fails_turn() {
        let dispatcher = PersonaRegistry::bundled()
            .unwrap()
            .build(Arc::new(ScriptedModel::default()))
            .unwrap();
        let handler = TurnHandler::new(dispatcher, Arc::new(VanishingRuntime), "Thinking...");
        let mut session = Session::new();
        let mut sink = RecordingSink::default();

        let outcome = handler.handle(&mut session, "hi", &mut sink).await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Failed { .. }));
        assert_eq!(session.len(), 1);
    }

    #[tokio::test]
    async fn test_closed_sink_propagates() {
        let model = Arc::new(ScriptedModel::new(vec![Reply::text(&["unused"])]));
        let handler = handler(model);
        let mut session = Session::new();

        let err = handler.handle(&mut session, "hi", &mut ClosedSink).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
        assert_eq!(session.state(), TurnState::Idle);
    }
}
