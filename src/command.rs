//! Client line parsing and command dispatch
//!
//! A line whose first non-whitespace character is [`COMMAND_PREFIX`] is a
//! command; anything else is chat. Command names are looked up in a closed
//! alias table, case-insensitively, and each command has its own handler.

use tracing::debug;

use crate::broadcast::Broadcaster;
use crate::error::CommandError;
use crate::message::ServerLine;
use crate::session::Session;

/// Marks a line as a command
pub const COMMAND_PREFIX: char = '/';

pub const QUIT_ALIASES: &[&str] = &["/quit", "/exit", "/종료"];
pub const LIST_ALIASES: &[&str] = &["/list"];
pub const WHISPER_ALIASES: &[&str] = &["/w", "/whisper", "/귓속말"];
pub const HELP_ALIASES: &[&str] = &["/help"];

/// One-line command summary sent after joining and on `/help`
pub const HELP_TEXT: &str =
    "Commands: /list, /w <nickname> <message>, /help, /quit (aliases: /exit, /whisper)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandKind {
    Quit,
    List,
    Whisper,
    Help,
}

const COMMAND_TABLE: &[(CommandKind, &[&str])] = &[
    (CommandKind::Quit, QUIT_ALIASES),
    (CommandKind::List, LIST_ALIASES),
    (CommandKind::Whisper, WHISPER_ALIASES),
    (CommandKind::Help, HELP_ALIASES),
];

fn lookup_kind(name: &str) -> Option<CommandKind> {
    let name = name.to_lowercase();
    COMMAND_TABLE
        .iter()
        .find(|(_, aliases)| aliases.contains(&name.as_str()))
        .map(|(kind, _)| *kind)
}

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Quit,
    List,
    Help,
    Whisper { target: String, text: String },
}

/// Client → Server line, classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientLine {
    /// Blank line, ignored
    Empty,
    /// Ordinary chat text (trimmed)
    Chat(String),
    /// Command line, possibly malformed
    Command(Result<Command, CommandError>),
}

impl ClientLine {
    pub fn parse(raw: &str) -> Self {
        let line = raw.trim();
        if line.is_empty() {
            return ClientLine::Empty;
        }
        if !line.starts_with(COMMAND_PREFIX) {
            return ClientLine::Chat(line.to_string());
        }
        ClientLine::Command(parse_command(line))
    }
}

/// Split off the first whitespace-delimited word
fn next_word(s: &str) -> (&str, &str) {
    match s.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim_start()),
        None => (s, ""),
    }
}

fn parse_command(line: &str) -> Result<Command, CommandError> {
    let (name, args) = next_word(line);
    let Some(kind) = lookup_kind(name) else {
        return Err(CommandError::Unknown(name.to_string()));
    };

    match kind {
        CommandKind::Quit => Ok(Command::Quit),
        CommandKind::List => Ok(Command::List),
        CommandKind::Help => Ok(Command::Help),
        CommandKind::Whisper => {
            let (target, text) = next_word(args);
            if target.is_empty() || text.is_empty() {
                return Err(CommandError::WhisperUsage);
            }
            Ok(Command::Whisper {
                target: target.to_string(),
                text: text.to_string(),
            })
        }
    }
}

/// What the session loop does after a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Routes lines from an active session to the broadcaster
#[derive(Debug, Clone)]
pub struct Dispatcher {
    broadcaster: Broadcaster,
}

impl Dispatcher {
    pub fn new(broadcaster: Broadcaster) -> Self {
        Self { broadcaster }
    }

    /// Handle one received line from `sender`
    pub async fn handle_line(&self, sender: &Session, raw: &str) -> Flow {
        match ClientLine::parse(raw) {
            ClientLine::Empty => Flow::Continue,
            ClientLine::Chat(text) => {
                let line = ServerLine::Chat {
                    from: sender.nickname().to_string(),
                    text,
                };
                self.broadcaster.broadcast_all(&line).await;
                Flow::Continue
            }
            ClientLine::Command(Ok(command)) => self.dispatch(sender, command).await,
            ClientLine::Command(Err(err)) => {
                debug!(nickname = %sender.nickname(), error = %err, "malformed command");
                self.reply(sender, err.into()).await;
                Flow::Continue
            }
        }
    }

    async fn dispatch(&self, sender: &Session, command: Command) -> Flow {
        debug!(nickname = %sender.nickname(), ?command, "dispatching command");
        match command {
            Command::Quit => self.handle_quit(sender).await,
            Command::List => self.handle_list(sender).await,
            Command::Help => self.handle_help(sender).await,
            Command::Whisper { target, text } => self.handle_whisper(sender, target, text).await,
        }
    }

    async fn handle_quit(&self, sender: &Session) -> Flow {
        self.reply(sender, ServerLine::system("Goodbye.")).await;
        Flow::Quit
    }

    async fn handle_list(&self, sender: &Session) -> Flow {
        let names = self.broadcaster.registry().snapshot_names();
        self.reply(sender, ServerLine::online(&names)).await;
        Flow::Continue
    }

    async fn handle_help(&self, sender: &Session) -> Flow {
        self.reply(sender, ServerLine::help()).await;
        Flow::Continue
    }

    async fn handle_whisper(&self, sender: &Session, target: String, text: String) -> Flow {
        if target == sender.nickname().as_str() {
            self.reply(sender, CommandError::SelfWhisper.into()).await;
            return Flow::Continue;
        }

        let whisper = ServerLine::WhisperFrom {
            sender: sender.nickname().to_string(),
            text: text.clone(),
        };
        let notice = if self.broadcaster.unicast(&target, &whisper).await {
            ServerLine::WhisperTo { target, text }
        } else {
            ServerLine::system(format!("No such user: {target}"))
        };
        self.reply(sender, notice).await;
        Flow::Continue
    }

    /// Send to the sender; a failure here closes the sender's own session
    async fn reply(&self, sender: &Session, line: ServerLine) {
        self.broadcaster.send_to(sender, &line).await;
    }
}
