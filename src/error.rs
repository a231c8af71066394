//! Error types for the chat server
//!
//! Defines the connection-level error, handshake failures, per-recipient
//! send failures and command parse errors. Uses thiserror for ergonomic
//! error definitions.

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

use crate::config::ConfigError;

/// Application-level errors
///
/// Returned by a connection handler. The spawning task logs it; it never
/// reaches other sessions or the accept loop.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error (fatal for the connection)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Line framing error (invalid UTF-8 or transport failure)
    #[error("Line codec error: {0}")]
    Codec(#[from] LinesCodecError),

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Nickname negotiation failed
    #[error("Handshake failed: {0}")]
    Handshake(#[from] HandshakeError),
}

/// Nickname negotiation errors
///
/// `InvalidFormat` and `Duplicate` are retryable; the rest end the
/// handshake and close the connection without touching the registry.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// Nickname is not 2-20 non-whitespace characters
    #[error("invalid nickname format")]
    InvalidFormat,

    /// Another active session already holds the nickname
    #[error("nickname '{0}' is already in use")]
    Duplicate(String),

    /// Client used up every allowed attempt
    #[error("too many nickname attempts")]
    TooManyAttempts,

    /// Peer closed the stream or the transport failed mid-handshake
    #[error("peer disconnected during handshake")]
    Disconnected,

    /// Server began shutting down mid-handshake
    #[error("server is shutting down")]
    Shutdown,
}

/// Line send errors
///
/// Occurs when writing a line to a session's connection fails.
#[derive(Debug, Error)]
pub enum SendError {
    /// The session was already closed
    #[error("Session closed")]
    Closed,

    /// The underlying write or flush failed
    #[error("Write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Malformed command errors
///
/// Rendered back to the sender as a system notice; the session stays active.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Command name not in the command table
    #[error("unknown command '{0}'")]
    Unknown(String),

    /// Whisper without a target or without a message
    #[error("missing whisper target or message")]
    WhisperUsage,

    /// Whisper addressed to the sender
    #[error("cannot whisper to yourself")]
    SelfWhisper,
}
