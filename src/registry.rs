//! Session registry
//!
//! The only state shared between connection tasks. Every operation takes the
//! lock for the duration of one map operation and never across an await, so
//! callers snapshot first and do their IO afterwards.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::session::Session;
use crate::types::Nickname;

/// Process-wide nickname → session directory
///
/// The map is ordered so name snapshots come out sorted.
#[derive(Debug, Default)]
pub struct Registry {
    sessions: Mutex<BTreeMap<Nickname, Arc<Session>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the session only if its nickname is free
    ///
    /// Returns false when the nickname is already held; the caller must treat
    /// that as a duplicate.
    pub fn register(&self, session: Arc<Session>) -> bool {
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(session.nickname()) {
            return false;
        }
        debug!(nickname = %session.nickname(), session = %session.id(), "registered");
        sessions.insert(session.nickname().clone(), session);
        true
    }

    /// Remove whatever session holds `nickname`
    ///
    /// A missing nickname is a no-op. Only one of several racing callers gets
    /// `Some` back.
    pub fn unregister(&self, nickname: &str) -> Option<Arc<Session>> {
        self.sessions.lock().remove(nickname)
    }

    /// Remove the entry only if it is this exact session
    ///
    /// Guards against a stale handler removing a newer session that has since
    /// taken the same nickname.
    pub fn unregister_session(&self, session: &Session) -> bool {
        let mut sessions = self.sessions.lock();
        match sessions.get(session.nickname()) {
            Some(current) if current.id() == session.id() => {
                sessions.remove(session.nickname());
                debug!(nickname = %session.nickname(), session = %session.id(), "unregistered");
                true
            }
            _ => false,
        }
    }

    /// Flag a registered session as announced to the room
    ///
    /// Returns false if the session was already removed, in which case no
    /// join notice should go out. Flagging under the lock orders it against
    /// `unregister_session`, so whoever removes the session sees a settled flag.
    pub fn announce(&self, session: &Session) -> bool {
        let sessions = self.sessions.lock();
        match sessions.get(session.nickname()) {
            Some(current) if current.id() == session.id() => {
                session.mark_announced();
                true
            }
            _ => false,
        }
    }

    pub fn lookup(&self, nickname: &str) -> Option<Arc<Session>> {
        self.sessions.lock().get(nickname).cloned()
    }

    pub fn contains(&self, nickname: &str) -> bool {
        self.sessions.lock().contains_key(nickname)
    }

    /// Sorted copy of every registered nickname
    pub fn snapshot_names(&self) -> Vec<String> {
        self.sessions
            .lock()
            .keys()
            .map(|nick| nick.as_str().to_string())
            .collect()
    }

    /// Copy of every registered session handle, in nickname order
    pub fn snapshot_sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Drop every entry (server shutdown)
    pub fn clear(&self) {
        self.sessions.lock().clear();
    }
}
