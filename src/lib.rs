//! Multi-user line-oriented TCP chat server library
//!
//! Clients connect over TCP, pick a unique nickname, and exchange
//! newline-terminated UTF-8 lines.
//!
//! # Features
//! - Nickname handshake (2-20 characters, no whitespace, unique, 5 attempts)
//! - Join and leave announcements
//! - Broadcast chat: `nick> message`
//! - Whispers: `/w nick message` (aliases `/whisper`, `/귓속말`)
//! - Directory listing: `/list`
//! - Quit: `/quit` (aliases `/exit`, `/종료`)
//! - Graceful shutdown that notifies and closes every session
//!
//! # Architecture
//! One tokio task per connection. The only shared state is the
//! [`Registry`], a nickname → session map behind a single lock that is never
//! held across IO. Each [`Session`] serializes its own writes, so
//! per-recipient order is preserved while cross-recipient order is not
//! guaranteed.
//!
//! # Example
//! ```ignore
//! use line_chat::{ChatServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig { port: 5000, ..ServerConfig::default() };
//!     let server = ChatServer::bind(&config).await.unwrap();
//!     server.run_until_ctrl_c().await.unwrap();
//! }
//! ```

pub mod broadcast;
pub mod cli;
pub mod command;
pub mod config;
pub mod error;
pub mod handler;
pub mod handshake;
pub mod message;
pub mod registry;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use broadcast::Broadcaster;
pub use cli::Cli;
pub use command::{ClientLine, Command, Dispatcher, Flow};
pub use config::{ConfigError, ServerConfig};
pub use error::{AppError, CommandError, HandshakeError, SendError};
pub use handler::{handle_connection, ConnectionContext, ConnectionState};
pub use handshake::Handshake;
pub use message::ServerLine;
pub use registry::Registry;
pub use server::ChatServer;
pub use session::{Session, SessionWriter};
pub use types::{Nickname, SessionId};
