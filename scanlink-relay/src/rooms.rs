//! Room-scoped event broadcast.
//!
//! Delivery is best-effort and at-most-once: a packet is cloned into
//! each member's outbox with `try_send`, and a full or closed outbox
//! simply drops it. No acknowledgment, no retry, at any layer.

use std::collections::HashMap;

use scanlink_core::{Packet, PacketSender, SessionId};
use tracing::debug;

use crate::registry::ConnId;

/// Broadcast fan-out for all session rooms.
#[derive(Debug, Default)]
pub struct RelayChannel {
    rooms: HashMap<SessionId, Vec<ConnId>>,
    outboxes: HashMap<ConnId, PacketSender>,
}

impl RelayChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `conn` to broadcasts scoped to `session_id`.
    pub fn join_room(&mut self, conn: ConnId, outbox: PacketSender, session_id: SessionId) {
        self.outboxes.insert(conn, outbox);
        let members = self.rooms.entry(session_id).or_default();
        if !members.contains(&conn) {
            members.push(conn);
        }
    }

    /// Drop `conn` from its room and discard its outbox.
    pub fn leave(&mut self, conn: ConnId) {
        self.outboxes.remove(&conn);
        self.rooms.retain(|_, members| {
            members.retain(|m| *m != conn);
            !members.is_empty()
        });
    }

    /// Deliver `packet` to all current room members.
    pub fn broadcast(&self, session_id: &SessionId, packet: &Packet) {
        self.broadcast_inner(session_id, packet, None);
    }

    /// Deliver `packet` to all room members except `sender` — used for
    /// republished submissions, which only the other peer should see.
    pub fn broadcast_except(&self, session_id: &SessionId, sender: ConnId, packet: &Packet) {
        self.broadcast_inner(session_id, packet, Some(sender));
    }

    fn broadcast_inner(&self, session_id: &SessionId, packet: &Packet, except: Option<ConnId>) {
        let Some(members) = self.rooms.get(session_id) else {
            return;
        };
        for member in members {
            if Some(*member) == except {
                continue;
            }
            let Some(outbox) = self.outboxes.get(member) else {
                continue;
            };
            if outbox.try_send(packet.clone()).is_err() {
                debug!(%member, "outbox full or closed, event dropped");
            }
        }
    }

    /// Tear a room down: unsubscribe and drop every member outbox so
    /// their writer tasks wind down. Returns the former members.
    pub fn close_room(&mut self, session_id: &SessionId) -> Vec<ConnId> {
        let members = self.rooms.remove(session_id).unwrap_or_default();
        for member in &members {
            self.outboxes.remove(member);
        }
        members
    }
}

// ── Tests ────────────────────────────────────────────────────────
