//! Line fan-out over the registry
//!
//! Every delivery works on a registry snapshot, so the registry lock is
//! never held while writing. A recipient whose write fails is evicted as if
//! it had disconnected, and whoever evicts it announces the departure.

use std::collections::VecDeque;
use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::error::SendError;
use crate::message::ServerLine;
use crate::registry::Registry;
use crate::session::Session;

/// Sends lines to all, all-but-one, or exactly one registered session
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<Registry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Deliver `line` to every registered session
    ///
    /// Returns how many recipients got the line.
    pub async fn broadcast_all(&self, line: &ServerLine) -> usize {
        self.fan_out(line.clone(), None).await
    }

    /// Deliver `line` to every registered session except `excluded`
    pub async fn broadcast_except(&self, line: &ServerLine, excluded: &str) -> usize {
        self.fan_out(line.clone(), Some(excluded.to_string())).await
    }

    /// Deliver `line` to one nickname
    ///
    /// Returns false when the target is not registered or the write failed.
    pub async fn unicast(&self, target: &str, line: &ServerLine) -> bool {
        let Some(session) = self.registry.lookup(target) else {
            debug!(target, "unicast target not found");
            return false;
        };
        self.send_to(&session, line).await
    }

    /// Deliver `line` to a session handle already in hand
    ///
    /// A failed write evicts the session the same way a failed broadcast does.
    pub async fn send_to(&self, session: &Session, line: &ServerLine) -> bool {
        match session.send(line).await {
            Ok(()) => true,
            Err(err) => {
                if self.evict(session, &err) {
                    let nickname = session.nickname().to_string();
                    self.fan_out(ServerLine::left(&nickname), Some(nickname))
                        .await;
                }
                false
            }
        }
    }

    /// Unregister a session leaving normally and announce it
    ///
    /// Only the caller that actually removed the session announces, so a
    /// departure is reported exactly once however many paths race here. A
    /// session whose join was never announced leaves silently.
    pub async fn depart(&self, session: &Session) -> bool {
        if !self.registry.unregister_session(session) {
            return false;
        }
        let nickname = session.nickname().to_string();
        info!(%nickname, session = %session.id(), "session left");
        if session.is_announced() {
            self.fan_out(ServerLine::left(&nickname), Some(nickname))
                .await;
        }
        true
    }

    /// Snapshot-then-write delivery with a queue of follow-up departures
    ///
    /// Returns the delivered count of the first (requested) line only.
    async fn fan_out(&self, line: ServerLine, excluded: Option<String>) -> usize {
        let mut queue = VecDeque::from([(line, excluded)]);
        let mut requested = None;

        while let Some((line, excluded)) = queue.pop_front() {
            let recipients: Vec<Arc<Session>> = self
                .registry
                .snapshot_sessions()
                .into_iter()
                .filter(|s| excluded.as_deref() != Some(s.nickname().as_str()))
                .collect();

            let results = join_all(recipients.iter().map(|s| s.send(&line))).await;

            let mut delivered = 0;
            for (session, result) in recipients.iter().zip(results) {
                match result {
                    Ok(()) => delivered += 1,
                    Err(err) => {
                        if self.evict(session, &err) {
                            let nickname = session.nickname().to_string();
                            queue.push_back((ServerLine::left(&nickname), Some(nickname)));
                        }
                    }
                }
            }
            requested.get_or_insert(delivered);
        }

        requested.unwrap_or(0)
    }

    /// Close a recipient whose write failed and drop it from the registry
    ///
    /// Returns true if this call removed it and the room had seen it join,
    /// i.e. the caller owes a departure notice.
    fn evict(&self, session: &Session, err: &SendError) -> bool {
        match err {
            SendError::Closed => {
                debug!(nickname = %session.nickname(), "dropping closed session")
            }
            SendError::Io(e) => {
                warn!(nickname = %session.nickname(), error = %e, "write failed, evicting session")
            }
        }
        session.close();
        self.registry.unregister_session(session) && session.is_announced()
    }
}
