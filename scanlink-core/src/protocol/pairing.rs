//! Pairing protocol payloads.
//!
//! # Wire Protocol
//!
//! ```text
//! Desktop ──[join-session]────────────────────► Relay
//!   Payload: JoinSession (bincode)
//!
//! Capture ──[phone-connect]───────────────────► Relay
//!   Payload: PhoneConnect (bincode)
//!
//! Relay   ──[phone-connected / -disconnected]─► Room    (empty payload)
//!
//! Capture ──[barcode-scanned]─────────────────► Relay
//!   Payload: ScanEnvelope (bincode)
//! Relay   ──[comic-received]──────────────────► Desktop
//!   Payload: the envelope's item bytes, verbatim
//!
//! Desktop ──[comic-duplicate]─────────────────► Relay
//!   Payload: ScanEnvelope (bincode)
//! Relay   ──[duplicate-detected]──────────────► Capture
//!   Payload: the envelope's item bytes, verbatim
//! ```
//!
//! Republished events carry the submitted item bytes untouched, so the
//! relay never needs to understand item contents and pass-through is
//! byte-exact by construction.

use serde::{Deserialize, Serialize};

use crate::error::ScanlinkError;
use crate::event::Event;
use crate::packet::Packet;
use crate::session::SessionId;

// ── JoinSession ──────────────────────────────────────────────────

/// Payload for `join-session` (desktop → relay).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JoinSession {
    /// The freshly minted session id.
    pub session_id: SessionId,
}

impl JoinSession {
    pub fn new(session_id: SessionId) -> Self {
        Self { session_id }
    }

    /// Serialize to bytes for a frame payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ScanlinkError> {
        bincode::serialize(self).map_err(|e| ScanlinkError::Encoding(e.to_string()))
    }

    /// Deserialize from frame payload bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ScanlinkError> {
        bincode::deserialize(bytes).map_err(|e| ScanlinkError::Encoding(e.to_string()))
    }

    /// Build the `join-session` frame.
    pub fn into_packet(self, sequence: u64) -> Result<Packet, ScanlinkError> {
        let payload = self.to_bytes()?;
        Packet::new_event(Event::JoinSession, sequence, payload)
    }
}

// ── PhoneConnect ─────────────────────────────────────────────────

/// Payload for `phone-connect` (capture → relay).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhoneConnect {
    /// The session id read from the rendezvous URL.
    pub session_id: SessionId,
}

impl PhoneConnect {
    pub fn new(session_id: SessionId) -> Self {
        Self { session_id }
    }

    /// Serialize to bytes for a frame payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ScanlinkError> {
        bincode::serialize(self).map_err(|e| ScanlinkError::Encoding(e.to_string()))
    }

    /// Deserialize from frame payload bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ScanlinkError> {
        bincode::deserialize(bytes).map_err(|e| ScanlinkError::Encoding(e.to_string()))
    }

    /// Build the `phone-connect` frame.
    pub fn into_packet(self, sequence: u64) -> Result<Packet, ScanlinkError> {
        let payload = self.to_bytes()?;
        Packet::new_event(Event::PhoneConnect, sequence, payload)
    }
}

// ── ScanEnvelope ─────────────────────────────────────────────────

/// Session-scoped submission wrapper used by `barcode-scanned` and
/// `comic-duplicate`.
///
/// `item` is the serialized form of a [`ScannedItem`] but is treated as opaque
/// bytes here: the relay republishes it without deserializing.
///
/// [`ScannedItem`]: crate::protocol::item::ScannedItem
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanEnvelope {
    /// The session whose room the item is relayed into.
    pub session_id: SessionId,

    /// Opaque item bytes, republished verbatim.
    pub item: Vec<u8>,
}

impl ScanEnvelope {
    pub fn new(session_id: SessionId, item: Vec<u8>) -> Self {
        Self { session_id, item }
    }

    /// Serialize to bytes for a frame payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ScanlinkError> {
        bincode::serialize(self).map_err(|e| ScanlinkError::Encoding(e.to_string()))
    }

    /// Deserialize from frame payload bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ScanlinkError> {
        bincode::deserialize(bytes).map_err(|e| ScanlinkError::Encoding(e.to_string()))
    }

    /// Build the capture-side `barcode-scanned` frame.
    pub fn into_scanned_packet(self, sequence: u64) -> Result<Packet, ScanlinkError> {
        let payload = self.to_bytes()?;
        Packet::new_event(Event::BarcodeScanned, sequence, payload)
    }

    /// Build the desktop-side `comic-duplicate` frame.
    pub fn into_duplicate_packet(self, sequence: u64) -> Result<Packet, ScanlinkError> {
        let payload = self.to_bytes()?;
        Packet::new_event(Event::ComicDuplicate, sequence, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::item::ScannedItem;

    fn session() -> SessionId {
        "abc-123".parse().unwrap()
    }

    #[test]
    fn join_session_roundtrip() {
        let join = JoinSession::new(session());
        let packet = join.clone().into_packet(1).unwrap();
        assert_eq!(packet.event().unwrap(), Event::JoinSession);
        assert_eq!(packet.sequence(), 1);

        let decoded = JoinSession::from_bytes(packet.payload()).unwrap();
        assert_eq!(decoded, join);
    }

    #[test]
    fn phone_connect_roundtrip() {
        let connect = PhoneConnect::new(session());
        let packet = connect.clone().into_packet(1).unwrap();
        assert_eq!(packet.event().unwrap(), Event::PhoneConnect);

        let decoded = PhoneConnect::from_bytes(packet.payload()).unwrap();
        assert_eq!(decoded.session_id, session());
    }

    #[test]
    fn envelope_preserves_item_bytes() {
        let item_bytes = ScannedItem::new("00001234567811").to_bytes().unwrap();
        let envelope = ScanEnvelope::new(session(), item_bytes.clone());

        let packet = envelope.clone().into_scanned_packet(4).unwrap();
        assert_eq!(packet.event().unwrap(), Event::BarcodeScanned);

        let decoded = ScanEnvelope::from_bytes(packet.payload()).unwrap();
        assert_eq!(decoded.item, item_bytes);
        assert_eq!(decoded.session_id, session());
    }

    #[test]
    fn duplicate_packet_event() {
        let envelope = ScanEnvelope::new(session(), b"opaque".to_vec());
        let packet = envelope.into_duplicate_packet(9).unwrap();
        assert_eq!(packet.event().unwrap(), Event::ComicDuplicate);
        assert_eq!(packet.sequence(), 9);
    }
}
