//! Nickname negotiation
//!
//! Prompts for a nickname, validates it, and claims it in the registry in a
//! single atomic `register` call. Duplicates are rejected (no auto-suffix);
//! the client may retry up to the configured attempt limit.

use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use tokio_util::codec::LinesCodecError;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::HandshakeError;
use crate::message::ServerLine;
use crate::registry::Registry;
use crate::session::{Session, SessionWriter};
use crate::types::{Nickname, SessionId};

/// Default number of nickname attempts per connection
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Handshake run against one registry
pub struct Handshake<'a> {
    registry: &'a Registry,
    max_attempts: u32,
}

impl<'a> Handshake<'a> {
    pub fn new(registry: &'a Registry, max_attempts: u32) -> Self {
        Self {
            registry,
            max_attempts,
        }
    }

    /// Negotiate a nickname and return the registered session
    ///
    /// On any error the registry is left untouched.
    pub async fn negotiate<S>(
        &self,
        lines: &mut S,
        writer: &Arc<SessionWriter>,
        id: SessionId,
        closed: &CancellationToken,
    ) -> Result<Arc<Session>, HandshakeError>
    where
        S: Stream<Item = Result<String, LinesCodecError>> + Unpin,
    {
        for attempt in 1..=self.max_attempts {
            send(writer, &ServerLine::Prompt).await?;

            let result = match lines.next().await {
                Some(Ok(raw)) => self.claim(&raw, writer, id, closed),
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    // The framed reader ends after a codec error
                    send(writer, &ServerLine::line_too_long()).await?;
                    return Err(HandshakeError::Disconnected);
                }
                Some(Err(LinesCodecError::Io(e))) => {
                    debug!(session = %id, error = %e, "read failed during handshake");
                    return Err(HandshakeError::Disconnected);
                }
                None => return Err(HandshakeError::Disconnected),
            };

            match result {
                Ok(session) => return Ok(session),
                Err(err) => {
                    debug!(session = %id, attempt, error = %err, "nickname rejected");
                    send(writer, &rejection(&err)).await?;
                }
            }
        }

        send(
            writer,
            &ServerLine::system("Too many attempts. Closing connection."),
        )
        .await?;
        Err(HandshakeError::TooManyAttempts)
    }

    fn claim(
        &self,
        raw: &str,
        writer: &Arc<SessionWriter>,
        id: SessionId,
        closed: &CancellationToken,
    ) -> Result<Arc<Session>, HandshakeError> {
        let nickname = Nickname::parse(raw)?;
        let session = Arc::new(Session::new(
            id,
            nickname,
            Arc::clone(writer),
            closed.clone(),
        ));
        if !self.registry.register(Arc::clone(&session)) {
            return Err(HandshakeError::Duplicate(session.nickname().to_string()));
        }
        Ok(session)
    }
}

async fn send(writer: &SessionWriter, line: &ServerLine) -> Result<(), HandshakeError> {
    writer
        .send(line)
        .await
        .map_err(|_| HandshakeError::Disconnected)
}

fn rejection(err: &HandshakeError) -> ServerLine {
    match err {
        HandshakeError::Duplicate(nickname) => {
            ServerLine::system(format!("Nickname '{nickname}' is already in use."))
        }
        _ => ServerLine::system("Invalid nickname. Use 2-20 characters without whitespace."),
    }
}
