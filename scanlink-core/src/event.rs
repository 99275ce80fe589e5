//! Relay event definitions.
//!
//! Uses proper enums with `TryFrom` — no panics on unknown values.
//! The kebab-case wire names from the original rendezvous protocol are
//! kept as [`Event::wire_name`] for logging and diagnostics.

use crate::error::ScanlinkError;
use std::fmt;

// ── Event ────────────────────────────────────────────────────────

/// All events understood by the scanlink relay protocol.
///
/// Organized by category:
/// - `0x0001..0x00FF` — Link-level (heartbeat, goodbye)
/// - `0x0100..0x01FF` — Session membership
/// - `0x0200..0x02FF` — Item relay (capture → desktop)
/// - `0x0300..0x03FF` — Duplicate handshake (desktop → capture)
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    // ── Link (0x00xx) ────────────────────────────────────────────
    /// Periodic keep-alive heartbeat.
    Ping = 0x0001,
    /// Graceful disconnect.
    Goodbye = 0x0002,

    // ── Membership (0x01xx) ──────────────────────────────────────
    /// Desktop registers itself under a freshly minted session id.
    JoinSession = 0x0101,
    /// Capture device joins the session named in its rendezvous URL.
    PhoneConnect = 0x0102,
    /// Both peers are now present in the room.
    PhoneConnected = 0x0103,
    /// A peer left the room.
    PhoneDisconnected = 0x0104,

    // ── Item relay (0x02xx) ──────────────────────────────────────
    /// Capture device submits a decoded item for relay.
    BarcodeScanned = 0x0201,
    /// The submission, republished to the desktop unmodified.
    ComicReceived = 0x0202,

    // ── Duplicate handshake (0x03xx) ─────────────────────────────
    /// Desktop reports the item already exists in the collection.
    ComicDuplicate = 0x0301,
    /// The report, republished to the capture device unmodified.
    DuplicateDetected = 0x0302,
}

impl TryFrom<u32> for Event {
    type Error = ScanlinkError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0x0001 => Ok(Event::Ping),
            0x0002 => Ok(Event::Goodbye),

            0x0101 => Ok(Event::JoinSession),
            0x0102 => Ok(Event::PhoneConnect),
            0x0103 => Ok(Event::PhoneConnected),
            0x0104 => Ok(Event::PhoneDisconnected),

            0x0201 => Ok(Event::BarcodeScanned),
            0x0202 => Ok(Event::ComicReceived),

            0x0301 => Ok(Event::ComicDuplicate),
            0x0302 => Ok(Event::DuplicateDetected),

            _ => Err(ScanlinkError::UnknownEvent(value)),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.wire_name())
    }
}

impl Event {
    /// The kebab-case event name used by the original wire protocol.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Event::Ping => "ping",
            Event::Goodbye => "goodbye",
            Event::JoinSession => "join-session",
            Event::PhoneConnect => "phone-connect",
            Event::PhoneConnected => "phone-connected",
            Event::PhoneDisconnected => "phone-disconnected",
            Event::BarcodeScanned => "barcode-scanned",
            Event::ComicReceived => "comic-received",
            Event::ComicDuplicate => "comic-duplicate",
            Event::DuplicateDetected => "duplicate-detected",
        }
    }

    /// Returns `true` for events a client may legitimately send to the
    /// relay server. Everything else originates server-side.
    pub fn is_client_origin(&self) -> bool {
        matches!(
            self,
            Event::Ping
                | Event::Goodbye
                | Event::JoinSession
                | Event::PhoneConnect
                | Event::BarcodeScanned
                | Event::ComicDuplicate
        )
    }
}
