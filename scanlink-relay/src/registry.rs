//! Session membership bookkeeping.
//!
//! One explicit table, `session id → { desktop, capture, created_at }`,
//! mutated only through [`SessionRegistry::join`] and
//! [`SessionRegistry::leave`]. Sessions exist implicitly: created on
//! first join, destroyed when the last member leaves. The registry is
//! internal to the relay — nothing outside this crate sees it.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use scanlink_core::{PeerRole, SessionId};

/// Server-side identifier for one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(pub u64);

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

// ── Table entries ────────────────────────────────────────────────

/// One pairing session's membership.
#[derive(Debug)]
struct SessionEntry {
    desktop: Option<ConnId>,
    capture: Option<ConnId>,
    created_at: Instant,
    /// Set once both roles have been present simultaneously. Paired
    /// sessions are exempt from the staleness sweep.
    paired_once: bool,
}

impl SessionEntry {
    fn new() -> Self {
        Self {
            desktop: None,
            capture: None,
            created_at: Instant::now(),
            paired_once: false,
        }
    }

    fn slot(&self, role: PeerRole) -> Option<ConnId> {
        match role {
            PeerRole::Desktop => self.desktop,
            PeerRole::Capture => self.capture,
        }
    }

    fn slot_mut(&mut self, role: PeerRole) -> &mut Option<ConnId> {
        match role {
            PeerRole::Desktop => &mut self.desktop,
            PeerRole::Capture => &mut self.capture,
        }
    }

    fn is_empty(&self) -> bool {
        self.desktop.is_none() && self.capture.is_none()
    }

    fn members(&self) -> impl Iterator<Item = ConnId> {
        self.desktop.into_iter().chain(self.capture)
    }
}

// ── Join / leave results ─────────────────────────────────────────

/// What [`SessionRegistry::join`] observed.
#[derive(Debug, PartialEq, Eq)]
pub struct JoinOutcome {
    /// A prior connection that held this role and was silently
    /// replaced (phone reconnects without renegotiating the token).
    pub replaced: Option<ConnId>,
    /// The other role's connection, if present, so the caller can
    /// notify it synchronously.
    pub peer: Option<ConnId>,
}

/// One `(session, role)` membership removed by [`SessionRegistry::leave`].
#[derive(Debug, PartialEq, Eq)]
pub struct Departure {
    pub session_id: SessionId,
    pub role: PeerRole,
    /// The peer left behind, for disconnect notification.
    pub remaining_peer: Option<ConnId>,
}

// ── SessionRegistry ──────────────────────────────────────────────

/// Membership table for all live sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, SessionEntry>,
    /// Reverse index; a connection belongs to at most one session.
    by_conn: HashMap<ConnId, SessionId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `conn` under `session_id` for `role`, creating the
    /// session on first join and overwriting any prior holder of the
    /// role.
    pub fn join(&mut self, session_id: &SessionId, role: PeerRole, conn: ConnId) -> JoinOutcome {
        let entry = self
            .sessions
            .entry(session_id.clone())
            .or_insert_with(SessionEntry::new);

        let replaced = entry.slot_mut(role).replace(conn).filter(|old| *old != conn);
        if let Some(old) = replaced {
            self.by_conn.remove(&old);
        }
        self.by_conn.insert(conn, session_id.clone());

        let peer = entry.slot(role.other());
        if peer.is_some() {
            entry.paired_once = true;
        }
        JoinOutcome { replaced, peer }
    }

    /// Remove every membership bound to `conn` (at most one in this
    /// protocol) and report what was removed. Sessions left with no
    /// members are destroyed.
    pub fn leave(&mut self, conn: ConnId) -> Vec<Departure> {
        let Some(session_id) = self.by_conn.remove(&conn) else {
            return Vec::new();
        };
        let Some(entry) = self.sessions.get_mut(&session_id) else {
            return Vec::new();
        };

        let mut departures = Vec::new();
        for role in [PeerRole::Desktop, PeerRole::Capture] {
            if entry.slot(role) == Some(conn) {
                *entry.slot_mut(role) = None;
                departures.push(Departure {
                    session_id: session_id.clone(),
                    role,
                    remaining_peer: entry.slot(role.other()),
                });
            }
        }
        if entry.is_empty() {
            self.sessions.remove(&session_id);
        }
        departures
    }

    /// The connection registered for `role` in `session_id`, if any.
    pub fn member(&self, session_id: &SessionId, role: PeerRole) -> Option<ConnId> {
        self.sessions.get(session_id).and_then(|e| e.slot(role))
    }

    /// Session ids older than `ttl` that never became fully paired.
    pub fn expired(&self, ttl: Duration) -> Vec<SessionId> {
        self.sessions
            .iter()
            .filter(|(_, entry)| !entry.paired_once && entry.created_at.elapsed() > ttl)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Destroy a session outright, returning its members for detach.
    pub fn remove(&mut self, session_id: &SessionId) -> Vec<ConnId> {
        let Some(entry) = self.sessions.remove(session_id) else {
            return Vec::new();
        };
        let members: Vec<ConnId> = entry.members().collect();
        for conn in &members {
            self.by_conn.remove(conn);
        }
        members
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

// ── Tests ────────────────────────────────────────────────────────
