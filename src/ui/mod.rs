//! Chat surfaces: WebSocket server and terminal

pub mod protocol;
pub mod server;
pub mod terminal;

pub use protocol::{ClientMessage, ServerMessage};
pub use server::ChatServer;
pub use terminal::TerminalChat;
