//! WebSocket chat server
//!
//! One tokio task per connection. The task owns the connection's `Session`
//! and handles its turns one at a time; the session is dropped with the
//! connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use super::protocol::{ClientMessage, ServerMessage};
use crate::config::ServerSettings;
use crate::error::{Error, Result};
use crate::session::Session;
use crate::turn::{ReplySink, TurnHandler};

// ─────────────────────────────────────────────────────────────────
// Reply Sink
// ─────────────────────────────────────────────────────────────────

async fn send_message<S>(sink: &mut S, message: &ServerMessage) -> Result<()>
where
    S: Sink<WsMessage, Error = WsError> + Unpin,
{
    trace!(msg_type = message.type_name(), "Sending frame");
    sink.send(WsMessage::Text(message.to_json()?)).await?;
    Ok(())
}

/// Writes one reply message to the socket
struct WsReplySink<'a, S> {
    sink: &'a mut S,
    author: &'a str,
    current: Option<Uuid>,
}

impl<'a, S> WsReplySink<'a, S> {
    fn new(sink: &'a mut S, author: &'a str) -> Self {
        Self {
            sink,
            author,
            current: None,
        }
    }

    fn current(&self) -> Result<Uuid> {
        self.current
            .ok_or_else(|| Error::Internal("no reply message is open".to_string()))
    }
}

#[async_trait]
impl<'a, S> ReplySink for WsReplySink<'a, S>
where
    S: Sink<WsMessage, Error = WsError> + Unpin + Send,
{
    async fn open(&mut self, placeholder: &str) -> Result<()> {
        let id = Uuid::new_v4();
        self.current = Some(id);
        send_message(
            &mut *self.sink,
            &ServerMessage::Message {
                id,
                author: self.author.to_string(),
                content: placeholder.to_string(),
            },
        )
        .await
    }

    async fn stream_token(&mut self, delta: &str) -> Result<()> {
        let id = self.current()?;
        send_message(
            &mut *self.sink,
            &ServerMessage::Token {
                id,
                delta: delta.to_string(),
            },
        )
        .await
    }

    async fn update(&mut self, content: &str) -> Result<()> {
        let id = self.current()?;
        send_message(
            &mut *self.sink,
            &ServerMessage::Update {
                id,
                content: content.to_string(),
            },
        )
        .await
    }
}

// ─────────────────────────────────────────────────────────────────
// Chat Server
// ─────────────────────────────────────────────────────────────────

/// Serves chat sessions over WebSocket
pub struct ChatServer {
    settings: ServerSettings,
    handler: TurnHandler,
    active: RwLock<usize>,
}

/// Decrements the active session count when the connection task ends
struct ActiveSession(Arc<ChatServer>);

impl Drop for ActiveSession {
    fn drop(&mut self) {
        let mut active = self.0.active.write();
        *active = active.saturating_sub(1);
    }
}

impl ChatServer {
    pub fn new(settings: ServerSettings, handler: TurnHandler) -> Self {
        Self {
            settings,
            handler,
            active: RwLock::new(0),
        }
    }

    /// Number of connected chat sessions
    pub fn active_sessions(&self) -> usize {
        *self.active.read()
    }

    /// Bind the listener, spawn the accept loop and return the bound address
    pub async fn start(self: &Arc<Self>, addr: SocketAddr) -> Result<SocketAddr> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        info!(addr = %addr, "Chat server listening");

        let server = Arc::clone(self);
        tokio::spawn(async move {
            server.accept_loop(listener).await;
        });

        Ok(addr)
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    debug!(peer_addr = %peer_addr, "Incoming chat connection");

                    let limit = self.settings.max_connections;
                    if limit > 0 && self.active_sessions() >= limit {
                        warn!(peer_addr = %peer_addr, limit, "Max chat sessions reached, rejecting");
                        tokio::spawn(reject(stream));
                        continue;
                    }

                    *self.active.write() += 1;
                    let guard = ActiveSession(Arc::clone(&self));
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        let _guard = guard;
                        if let Err(e) = server.handle_connection(stream, peer_addr).await {
                            debug!(peer_addr = %peer_addr, error = %e, "Chat connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// Run one chat session to completion
    async fn handle_connection(&self, stream: TcpStream, peer_addr: SocketAddr) -> Result<()> {
        let ws = tokio_tungstenite::accept_async(stream).await?;
        let (mut write, mut read) = ws.split();

        let mut session = Session::new();
        info!(session = %session.id(), peer_addr = %peer_addr, "Chat session started");

        send_message(
            &mut write,
            &ServerMessage::Message {
                id: Uuid::new_v4(),
                author: self.handler.author().to_string(),
                content: self.settings.welcome.clone(),
            },
        )
        .await?;

        while let Some(frame) = read.next().await {
            match frame? {
                WsMessage::Text(text) => match ClientMessage::from_json(&text) {
                    Ok(ClientMessage::UserMessage { content }) => {
                        let mut reply = WsReplySink::new(&mut write, self.handler.author());
                        self.handler.handle(&mut session, &content, &mut reply).await?;
                    }
                    Err(e) => {
                        warn!(session = %session.id(), error = %e, "Ignoring malformed frame");
                        send_message(&mut write, &ServerMessage::Error { message: e.to_string() }).await?;
                    }
                },
                WsMessage::Binary(_) => {
                    send_message(
                        &mut write,
                        &ServerMessage::Error {
                            message: "binary frames are not supported".to_string(),
                        },
                    )
                    .await?;
                }
                WsMessage::Close(_) => break,
                // Pings are answered by tungstenite
                _ => {}
            }
        }

        info!(
            session = %session.id(),
            turns = session.len(),
            duration_secs = (chrono::Utc::now() - session.started_at()).num_seconds(),
            "Chat session ended"
        );
        Ok(())
    }
}

/// Complete the handshake only to explain why the connection is refused
async fn reject(stream: TcpStream) {
    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    let message = ServerMessage::Error {
        message: "Too many chat sessions, try again later".to_string(),
    };
    if send_message(&mut ws, &message).await.is_ok() {
        let _ = ws.close(None).await;
    }
}
