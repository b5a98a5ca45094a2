//! Chat wire protocol
//!
//! JSON text frames over WebSocket, discriminated by `type`. The client only
//! sends user messages; the server opens, streams into and updates reply
//! messages identified by `id`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// ─────────────────────────────────────────────────────────────────
// Client → Server
// ─────────────────────────────────────────────────────────────────

/// Messages sent by the chat client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// The user typed something
    UserMessage { content: String },
}

impl ClientMessage {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::protocol_malformed(e.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────
// Server → Client
// ─────────────────────────────────────────────────────────────────

/// Messages sent by the chat server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    /// A new message from the assistant
    Message {
        id: Uuid,
        author: String,
        content: String,
    },

    /// Fragment appended to message `id`
    Token { id: Uuid, delta: String },

    /// Replace the content of message `id`
    Update { id: Uuid, content: String },

    /// The last client frame could not be handled
    Error { message: String },
}

impl ServerMessage {
    /// Get the message type name
    pub fn type_name(&self) -> &'static str {
        match self {
            ServerMessage::Message { .. } => "MESSAGE",
            ServerMessage::Token { .. } => "TOKEN",
            ServerMessage::Update { .. } => "UPDATE",
            ServerMessage::Error { .. } => "ERROR",
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Internal(e.to_string()))
    }
}
