//! Line-oriented chat in the terminal
//!
//! Same turn handling as the WebSocket server, one session per process.
//! Tokens are printed as they arrive; a failed turn prints its error line.

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::info;

use crate::error::Result;
use crate::session::Session;
use crate::turn::{ReplySink, TurnHandler, TurnOutcome};

const PROMPT: &str = "> ";

/// Commands that end the session
const EXIT_COMMANDS: &[&str] = &["/exit", "/quit"];

/// Prints one reply: author prefix, streamed tokens, then the settled text
struct TerminalReply<'a, W> {
    out: &'a mut W,
    author: &'a str,
    printed: String,
}

#[async_trait]
impl<'a, W> ReplySink for TerminalReply<'a, W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn open(&mut self, _placeholder: &str) -> Result<()> {
        self.out
            .write_all(format!("{}: ", self.author).as_bytes())
            .await?;
        self.out.flush().await?;
        Ok(())
    }

    async fn stream_token(&mut self, delta: &str) -> Result<()> {
        self.printed.push_str(delta);
        self.out.write_all(delta.as_bytes()).await?;
        self.out.flush().await?;
        Ok(())
    }

    async fn update(&mut self, content: &str) -> Result<()> {
        if content != self.printed {
            if !self.printed.is_empty() {
                self.out.write_all(b"\n").await?;
            }
            self.out.write_all(content.as_bytes()).await?;
        }
        self.out.write_all(b"\n\n").await?;
        self.out.flush().await?;
        Ok(())
    }
}

/// Interactive chat over a reader/writer pair
pub struct TerminalChat {
    handler: TurnHandler,
    welcome: String,
}

impl TerminalChat {
    pub fn new(handler: TurnHandler, welcome: impl Into<String>) -> Self {
        Self {
            handler,
            welcome: welcome.into(),
        }
    }

    /// Chat on stdin/stdout until EOF or an exit command
    pub async fn run_stdio(&self) -> Result<Session> {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let mut stdout = tokio::io::stdout();
        self.run(stdin, &mut stdout).await
    }

    /// Chat until `input` ends; returns the finished session
    pub async fn run<R, W>(&self, input: R, out: &mut W) -> Result<Session>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send,
    {
        let mut session = Session::new();
        info!(session = %session.id(), "Terminal chat started");

        out.write_all(format!("{}: {}\n\n", self.handler.author(), self.welcome).as_bytes())
            .await?;

        let mut lines = input.lines();
        loop {
            out.write_all(PROMPT.as_bytes()).await?;
            out.flush().await?;

            let Some(line) = lines.next_line().await? else {
                out.write_all(b"\n").await?;
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if EXIT_COMMANDS.contains(&line) {
                break;
            }

            let mut reply = TerminalReply {
                out: &mut *out,
                author: self.handler.author(),
                printed: String::new(),
            };
            if let TurnOutcome::Failed { message } =
                self.handler.handle(&mut session, line, &mut reply).await?
            {
                info!(session = %session.id(), message = %message, "Turn failed; chat continues");
            }
        }

        out.flush().await?;
        info!(session = %session.id(), turns = session.len(), "Terminal chat ended");
        Ok(session)
    }
}
