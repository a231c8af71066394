//! Wire line formats
//!
//! Every server → client line is built from a `ServerLine` variant, so the
//! separators live in exactly one place. Lines are rendered without the
//! trailing newline; the session writer appends it.

use std::fmt;

use crate::command::HELP_TEXT;
use crate::error::CommandError;

/// Prompt sent before every nickname attempt
pub const NICKNAME_PROMPT: &str = "Enter a nickname (2-20 characters, no whitespace):";

/// Prefix of every system notice
pub const SYSTEM_TAG: &str = "[system]";

/// Server → Client line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerLine {
    /// Nickname prompt
    Prompt,
    /// Ordinary chat: `nick> text`
    Chat { from: String, text: String },
    /// System notice: `[system] text`
    System(String),
    /// Whisper delivered to its target
    WhisperFrom { sender: String, text: String },
    /// Whisper confirmation echoed to the sender
    WhisperTo { target: String, text: String },
}

impl ServerLine {
    pub fn system(text: impl Into<String>) -> Self {
        ServerLine::System(text.into())
    }

    pub fn joined(nickname: &str) -> Self {
        Self::system(format!("{nickname} has joined"))
    }

    pub fn left(nickname: &str) -> Self {
        Self::system(format!("{nickname} has left"))
    }

    pub fn welcome(nickname: &str) -> Self {
        Self::system(format!("Welcome, {nickname}!"))
    }

    pub fn help() -> Self {
        Self::system(HELP_TEXT)
    }

    pub fn line_too_long() -> Self {
        Self::system("Line too long.")
    }

    pub fn shutdown() -> Self {
        Self::system("Server is shutting down.")
    }

    pub fn online(names: &[String]) -> Self {
        Self::system(format!("Online: {}", names.join(", ")))
    }
}

impl fmt::Display for ServerLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerLine::Prompt => f.write_str(NICKNAME_PROMPT),
            ServerLine::Chat { from, text } => write!(f, "{from}> {text}"),
            ServerLine::System(text) => write!(f, "{SYSTEM_TAG} {text}"),
            ServerLine::WhisperFrom { sender, text } => {
                write!(f, "[whisper from {sender}] {text}")
            }
            ServerLine::WhisperTo { target, text } => write!(f, "[whisper to {target}] {text}"),
        }
    }
}

/// Convert CommandError to a notice for the sender
impl From<CommandError> for ServerLine {
    fn from(err: CommandError) -> Self {
        let text = match err {
            CommandError::Unknown(name) => format!("Unknown command '{name}'. {HELP_TEXT}"),
            CommandError::WhisperUsage => "Usage: /w <nickname> <message>".to_string(),
            CommandError::SelfWhisper => "You cannot whisper to yourself.".to_string(),
        };
        ServerLine::System(text)
    }
}
