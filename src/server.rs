//! ChatServer listener
//!
//! Owns the TCP listener and the shared registry. The accept loop only
//! spawns: every connection runs in its own task, tracked in a `JoinSet` so
//! shutdown can wait for all of them.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broadcast::Broadcaster;
use crate::command::Dispatcher;
use crate::config::ServerConfig;
use crate::error::AppError;
use crate::handler::{handle_connection, ConnectionContext};
use crate::message::ServerLine;
use crate::registry::Registry;

/// How long shutdown waits for the farewell notice to reach every session
/// before closing them regardless
pub const SHUTDOWN_NOTICE_TIMEOUT: Duration = Duration::from_secs(2);

/// The chat server
///
/// Bind with [`ChatServer::bind`], then drive it with [`ChatServer::run_until`].
pub struct ChatServer {
    listener: TcpListener,
    registry: Arc<Registry>,
    ctx: ConnectionContext,
}

impl ChatServer {
    /// Bind the listener; a bind failure is fatal to the caller
    pub async fn bind(config: &ServerConfig) -> Result<Self, AppError> {
        config.validate()?;
        let listener = TcpListener::bind(config.bind_addr()).await?;
        Ok(Self::from_listener(listener, config))
    }

    /// Wrap an already bound listener
    pub fn from_listener(listener: TcpListener, config: &ServerConfig) -> Self {
        let registry = Arc::new(Registry::new());
        let broadcaster = Broadcaster::new(Arc::clone(&registry));
        let ctx = ConnectionContext {
            dispatcher: Dispatcher::new(broadcaster.clone()),
            broadcaster,
            max_nickname_attempts: config.max_nickname_attempts,
            max_line_length: config.max_line_length,
            shutdown: CancellationToken::new(),
        };
        Self {
            listener,
            registry,
            ctx,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared handle to the session registry
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Accept connections until `shutdown` resolves, then close every
    /// session and wait for all connection tasks to finish
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), AppError>
    where
        F: Future<Output = ()> + Send,
    {
        let ChatServer {
            listener,
            registry,
            ctx,
        } = self;
        let mut tasks = JoinSet::new();
        tokio::pin!(shutdown);

        info!(addr = ?listener.local_addr().ok(), "ChatServer started");

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => spawn_connection(&mut tasks, stream, peer, &ctx),
                    Err(e) => warn!(error = %e, "failed to accept connection"),
                },
                Some(result) = tasks.join_next(), if !tasks.is_empty() => reap(result),
            }
        }

        // Stop admitting new connections before touching sessions
        drop(listener);
        info!(sessions = registry.len(), "ChatServer shutting down");

        // Bounded, as a peer that stopped reading never drains its socket.
        // Its pending write is abandoned once the session is cancelled below
        let sessions = registry.snapshot_sessions();
        let notice = ServerLine::shutdown();
        let notify = join_all(sessions.iter().map(|s| s.send(&notice)));
        if tokio::time::timeout(SHUTDOWN_NOTICE_TIMEOUT, notify).await.is_err() {
            warn!("shutdown notice did not reach every session in time");
        }

        // Clear first so closing sessions do not announce departures to
        // each other
        registry.clear();
        ctx.shutdown.cancel();

        while let Some(result) = tasks.join_next().await {
            reap(result);
        }

        info!("ChatServer stopped");
        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<(), AppError> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "failed to install ctrl-c handler");
                std::future::pending::<()>().await;
            }
        })
        .await
    }
}

fn spawn_connection(
    tasks: &mut JoinSet<()>,
    stream: TcpStream,
    peer: SocketAddr,
    ctx: &ConnectionContext,
) {
    debug!(%peer, "new connection");
    let ctx = ctx.clone();
    let (reader, writer) = stream.into_split();
    tasks.spawn(async move {
        if let Err(e) = handle_connection(reader, writer, peer.to_string(), ctx).await {
            warn!(%peer, error = %e, "connection closed with error");
        }
    });
}

fn reap(result: Result<(), JoinError>) {
    if let Err(e) = result {
        warn!(error = %e, "connection task failed");
    }
}
