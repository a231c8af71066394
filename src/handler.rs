//! Connection handler
//!
//! Drives one accepted connection through
//! `Connecting → Handshaking → Active → Closing → Closed`. Peer disconnects
//! and write failures are ordinary transitions here, not errors for the
//! rest of the server.

use std::io::ErrorKind;
use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broadcast::Broadcaster;
use crate::command::{Dispatcher, Flow};
use crate::error::{AppError, HandshakeError};
use crate::handshake::Handshake;
use crate::message::ServerLine;
use crate::session::{Session, SessionWriter};
use crate::types::SessionId;

/// Lifecycle of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Handshaking,
    Active,
    Closing,
    Closed,
}

impl ConnectionState {
    /// Whether `self → next` is a legal step; nothing is re-entered and
    /// `Closed` is absorbing
    pub fn can_transition(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Handshaking)
                | (Handshaking, Active)
                | (Handshaking, Closing)
                | (Active, Closing)
                | (Closing, Closed)
        )
    }
}

/// Tracks the state of one connection and logs every step
#[derive(Debug)]
pub struct ConnectionMachine {
    id: SessionId,
    state: ConnectionState,
}

impl ConnectionMachine {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            state: ConnectionState::Connecting,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Move to `next`; illegal steps are refused and return false
    pub fn transition(&mut self, next: ConnectionState) -> bool {
        if !self.state.can_transition(next) {
            warn!(session = %self.id, from = ?self.state, to = ?next, "illegal state transition");
            return false;
        }
        debug!(session = %self.id, from = ?self.state, to = ?next, "state transition");
        self.state = next;
        true
    }
}

/// Everything a connection task needs from the server
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub broadcaster: Broadcaster,
    pub dispatcher: Dispatcher,
    pub max_nickname_attempts: u32,
    pub max_line_length: usize,
    /// Cancelled when the server shuts down; every session token is a child
    pub shutdown: CancellationToken,
}

/// Handle one accepted connection until it is closed
///
/// Per-connection failures are contained: only unexpected transport errors
/// and exhausted handshakes come back as `Err`, for the caller to log.
pub async fn handle_connection<R, W>(
    reader: R,
    writer: W,
    peer: String,
    ctx: ConnectionContext,
) -> Result<(), AppError>
where
    R: AsyncRead + Send + Unpin,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let id = SessionId::new();
    let mut machine = ConnectionMachine::new(id);
    let closed = ctx.shutdown.child_token();
    let writer = Arc::new(SessionWriter::new(writer));
    let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(ctx.max_line_length));

    debug!(session = %id, %peer, "connection accepted");
    machine.transition(ConnectionState::Handshaking);

    let handshake = Handshake::new(ctx.broadcaster.registry(), ctx.max_nickname_attempts);
    let outcome = tokio::select! {
        result = handshake.negotiate(&mut lines, &writer, id, &closed) => result,
        _ = closed.cancelled() => Err(HandshakeError::Shutdown),
    };

    let session = match outcome {
        Ok(session) => session,
        Err(err) => {
            machine.transition(ConnectionState::Closing);
            writer.shutdown().await;
            machine.transition(ConnectionState::Closed);
            return match err {
                HandshakeError::Disconnected | HandshakeError::Shutdown => {
                    debug!(session = %id, %peer, error = %err, "handshake abandoned");
                    Ok(())
                }
                err => Err(err.into()),
            };
        }
    };

    machine.transition(ConnectionState::Active);
    let nickname = session.nickname().to_string();
    info!(session = %id, %peer, %nickname, "session joined");

    // A newcomer lost before its greeting is never announced, so it also
    // leaves without a departure notice
    let greeted = ctx.broadcaster.send_to(&session, &ServerLine::welcome(&nickname)).await
        && ctx.broadcaster.send_to(&session, &ServerLine::help()).await;
    if greeted && ctx.broadcaster.registry().announce(&session) {
        ctx.broadcaster.broadcast_all(&ServerLine::joined(&nickname)).await;
    }

    let result = run_active(&ctx, &session, &mut lines).await;

    machine.transition(ConnectionState::Closing);
    ctx.broadcaster.depart(&session).await;
    session.close();
    writer.shutdown().await;
    machine.transition(ConnectionState::Closed);
    debug!(session = %id, %nickname, "connection closed");

    result
}

/// Feed lines to the dispatcher until quit, end of stream, or close
async fn run_active<S>(
    ctx: &ConnectionContext,
    session: &Session,
    lines: &mut S,
) -> Result<(), AppError>
where
    S: Stream<Item = Result<String, LinesCodecError>> + Unpin,
{
    loop {
        let next = tokio::select! {
            next = lines.next() => next,
            _ = session.closed() => {
                debug!(nickname = %session.nickname(), "session closed by server");
                return Ok(());
            }
        };

        match next {
            Some(Ok(line)) => {
                if ctx.dispatcher.handle_line(session, &line).await == Flow::Quit {
                    return Ok(());
                }
            }
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                ctx.broadcaster
                    .send_to(session, &ServerLine::line_too_long())
                    .await;
                return Ok(());
            }
            Some(Err(LinesCodecError::Io(e))) if is_disconnect(&e) => {
                debug!(nickname = %session.nickname(), error = %e, "peer disconnected");
                return Ok(());
            }
            Some(Err(err)) => return Err(err.into()),
            None => {
                debug!(nickname = %session.nickname(), "end of stream");
                return Ok(());
            }
        }
    }
}

fn is_disconnect(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf};
    use tokio::task::JoinHandle;

    fn context() -> ConnectionContext {
        let broadcaster = Broadcaster::new(Arc::new(Registry::new()));
        ConnectionContext {
            dispatcher: Dispatcher::new(broadcaster.clone()),
            broadcaster,
            max_nickname_attempts: 5,
            max_line_length: 128,
            shutdown: CancellationToken::new(),
        }
    }

    struct Peer {
        lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
        writer: tokio::io::WriteHalf<DuplexStream>,
        task: JoinHandle<Result<(), AppError>>,
    }

    impl Peer {
        async fn send(&mut self, line: &str) {
            self.writer.write_all(format!("{line}\n").as_bytes()).await.unwrap();
        }

        async fn recv(&mut self) -> String {
            self.lines.next_line().await.unwrap().unwrap()
        }
    }

    fn connect(ctx: &ConnectionContext) -> Peer {
        let (client, server) = tokio::io::duplex(8192);
        let (server_rd, server_wr) = tokio::io::split(server);
        let (client_rd, client_wr) = tokio::io::split(client);
        let task = tokio::spawn(handle_connection(
            server_rd,
            server_wr,
            "test".to_string(),
            ctx.clone(),
        ));
        Peer {
            lines: BufReader::new(client_rd).lines(),
            writer: client_wr,
            task,
        }
    }

    async fn join(ctx: &ConnectionContext, nickname: &str) -> Peer {
        let mut peer = connect(ctx);
        assert_eq!(peer.recv().await, ServerLine::Prompt.to_string());
        peer.send(nickname).await;
        assert_eq!(peer.recv().await, ServerLine::welcome(nickname).to_string());
        assert_eq!(peer.recv().await, ServerLine::help().to_string());
        assert_eq!(peer.recv().await, ServerLine::joined(nickname).to_string());
        peer
    }

    #[test]
    fn test_transition_table() {
        use ConnectionState::*;
        assert!(Connecting.can_transition(Handshaking));
        assert!(Handshaking.can_transition(Closing));
        assert!(Active.can_transition(Closing));
        assert!(!Active.can_transition(Handshaking));
        assert!(!Closed.can_transition(Closing));
        assert!(!Closing.can_transition(Active));
    }

    #[test]
    fn test_machine_refuses_reentry() {
        let mut machine = ConnectionMachine::new(SessionId::new());
        assert!(machine.transition(ConnectionState::Handshaking));
        assert!(machine.transition(ConnectionState::Closing));
        assert!(machine.transition(ConnectionState::Closed));
        assert!(!machine.transition(ConnectionState::Handshaking));
        assert_eq!(machine.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_quit_unregisters_and_announces() {
        let ctx = context();
        let mut alice = join(&ctx, "alice").await;
        let mut bob = join(&ctx, "bob").await;
        assert_eq!(alice.recv().await, "[system] bob has joined");

        bob.send("/quit").await;
        assert_eq!(bob.recv().await, "[system] Goodbye.");
        bob.task.await.unwrap().unwrap();

        assert_eq!(alice.recv().await, "[system] bob has left");
        assert_eq!(ctx.broadcaster.registry().snapshot_names(), vec!["alice"]);
    }

    #[tokio::test]
    async fn test_peer_disconnect_is_implicit_quit() {
        let ctx = context();
        let mut alice = join(&ctx, "alice").await;
        let bob = join(&ctx, "bob").await;
        assert_eq!(alice.recv().await, "[system] bob has joined");

        let Peer { lines, writer, task } = bob;
        drop(writer);
        drop(lines);
        task.await.unwrap().unwrap();

        assert_eq!(alice.recv().await, "[system] bob has left");
        assert!(!ctx.broadcaster.registry().contains("bob"));
    }

    #[tokio::test]
    async fn test_newcomer_lost_before_greeting_is_never_announced() {
        let ctx = context();
        let mut alice = join(&ctx, "alice").await;

        let mut ghost = connect(&ctx);
        assert_eq!(ghost.recv().await, ServerLine::Prompt.to_string());
        ghost.send("ghost").await;
        // Gone before the welcome line can be written
        let Peer { lines, writer, task } = ghost;
        drop(writer);
        drop(lines);
        task.await.unwrap().unwrap();
        assert!(!ctx.broadcaster.registry().contains("ghost"));

        ctx.broadcaster
            .broadcast_all(&ServerLine::system("marker"))
            .await;
        assert_eq!(alice.recv().await, "[system] marker");
    }

    #[tokio::test]
    async fn test_overlong_line_closes_session() {
        let ctx = context();
        let mut alice = join(&ctx, "alice").await;

        alice.send(&"z".repeat(500)).await;
        assert_eq!(alice.recv().await, "[system] Line too long.");
        alice.task.await.unwrap().unwrap();
        assert!(ctx.broadcaster.registry().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_aborts_handshake() {
        let ctx = context();
        let mut peer = connect(&ctx);
        assert_eq!(peer.recv().await, ServerLine::Prompt.to_string());

        ctx.shutdown.cancel();
        peer.task.await.unwrap().unwrap();
        assert!(ctx.broadcaster.registry().is_empty());
    }

    #[tokio::test]
    async fn test_too_many_attempts_is_reported() {
        let ctx = context();
        let mut peer = connect(&ctx);
        for _ in 0..5 {
            peer.send("x").await;
        }

        let result = peer.task.await.unwrap();
        assert!(matches!(
            result,
            Err(AppError::Handshake(HandshakeError::TooManyAttempts))
        ));
        assert!(ctx.broadcaster.registry().is_empty());
    }
}
