//! Session struct definition
//!
//! Represents one handshaken client: its identity, the serialized write
//! path onto its connection, and the signal that forces it closed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::error::SendError;
use crate::message::ServerLine;
use crate::types::{Nickname, SessionId};

/// Type-erased write half of a connection
pub type LineSink = Box<dyn AsyncWrite + Send + Unpin>;

/// Serialized write path for one connection
///
/// Each line is written and flushed while holding the lock, so concurrent
/// broadcasts and whispers to the same recipient never interleave.
pub struct SessionWriter {
    sink: Mutex<LineSink>,
}

impl SessionWriter {
    pub fn new<W>(sink: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            sink: Mutex::new(Box::new(sink)),
        }
    }

    /// Write one line followed by `\n`
    pub async fn send(&self, line: &ServerLine) -> Result<(), SendError> {
        let mut buf = line.to_string();
        buf.push('\n');

        let mut sink = self.sink.lock().await;
        sink.write_all(buf.as_bytes()).await?;
        sink.flush().await?;
        Ok(())
    }

    /// Shut down the write direction, ignoring errors from a dead peer
    pub async fn shutdown(&self) {
        let _ = self.sink.lock().await.shutdown().await;
    }
}

impl std::fmt::Debug for SessionWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionWriter").finish_non_exhaustive()
    }
}

/// Active client session
///
/// Owned by its connection handler. The registry only holds a clone of the
/// `Arc` while the session is registered.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    nickname: Nickname,
    writer: Arc<SessionWriter>,
    closed: CancellationToken,
    announced: AtomicBool,
}

impl Session {
    pub fn new(
        id: SessionId,
        nickname: Nickname,
        writer: Arc<SessionWriter>,
        closed: CancellationToken,
    ) -> Self {
        Self {
            id,
            nickname,
            writer,
            closed,
            announced: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn nickname(&self) -> &Nickname {
        &self.nickname
    }

    /// Send a line to this session
    ///
    /// Fails fast once the session is closed. A write stuck on a peer that
    /// stopped reading is abandoned as soon as the session gets closed.
    pub async fn send(&self, line: &ServerLine) -> Result<(), SendError> {
        if self.closed.is_cancelled() {
            return Err(SendError::Closed);
        }
        tokio::select! {
            result = self.writer.send(line) => result,
            _ = self.closed.cancelled() => Err(SendError::Closed),
        }
    }

    /// Force the owning handler out of its read loop
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Whether the rest of the room was told this session joined
    ///
    /// A departure notice is only owed for announced sessions.
    pub fn is_announced(&self) -> bool {
        self.announced.load(Ordering::Acquire)
    }

    /// Only called by [`Registry::announce`](crate::registry::Registry::announce)
    /// while it holds the registry lock
    pub(crate) fn mark_announced(&self) {
        self.announced.store(true, Ordering::Release);
    }

    /// Resolves once the session has been closed
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }
}
