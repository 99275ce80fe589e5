//! The desktop pairing peer.
//!
//! Mints the session, publishes its rendezvous URL for QR encoding,
//! consumes membership and item events from the relay, and runs the
//! duplicate-check handshake against the collection capability.

use scanlink_core::{
    Connection, ConnectionInfo, Event, JoinSession, LinkPhase, Packet, ScanEnvelope, ScanlinkError,
    ScannedItem, SessionId, rendezvous_url,
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::collection::CollectionStore;

// ── PairingPhase ─────────────────────────────────────────────────

/// Desktop-side pairing lifecycle.
///
/// ```text
///  Idle ──► Waiting ◄──► Paired
///    │         │            │
///    └─────────┴────────────┴──► Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PairingPhase {
    /// No session minted yet. Initial state.
    #[default]
    Idle,

    /// Session minted and joined; no capture peer present.
    Waiting,

    /// The capture peer is in the room.
    Paired,

    /// Pairing ended. Terminal.
    Closed,
}

impl std::fmt::Display for PairingPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Waiting => write!(f, "Waiting"),
            Self::Paired => write!(f, "Paired"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

impl PairingPhase {
    /// Transition to `Waiting` once the session is minted and joined.
    ///
    /// Valid from: `Idle`.
    pub fn session_minted(&mut self) -> Result<(), ScanlinkError> {
        match self {
            Self::Idle => {
                *self = Self::Waiting;
                Ok(())
            }
            _ => Err(ScanlinkError::ProtocolViolation(
                "cannot mint session: pairing already begun",
            )),
        }
    }

    /// Transition to `Paired` when the capture peer arrives.
    ///
    /// Valid from: `Waiting`; a repeat announcement while `Paired`
    /// (phone reconnect replacing its transport) is a no-op.
    pub fn peer_joined(&mut self) -> Result<(), ScanlinkError> {
        match self {
            Self::Waiting | Self::Paired => {
                *self = Self::Paired;
                Ok(())
            }
            _ => Err(ScanlinkError::ProtocolViolation(
                "peer joined while not waiting",
            )),
        }
    }

    /// Transition back to `Waiting` when the capture peer leaves.
    ///
    /// Valid from: `Paired`.
    pub fn peer_left(&mut self) -> Result<(), ScanlinkError> {
        match self {
            Self::Paired => {
                *self = Self::Waiting;
                Ok(())
            }
            _ => Err(ScanlinkError::ProtocolViolation(
                "peer left while not paired",
            )),
        }
    }

    /// Transition to `Closed`. Valid from any state, idempotent.
    pub fn close(&mut self) {
        *self = Self::Closed;
    }
}

// ── PairingEvent ─────────────────────────────────────────────────

/// Events surfaced to the surrounding desktop application.
#[derive(Debug, Clone, PartialEq)]
pub enum PairingEvent {
    /// The capture peer joined the session.
    PhoneConnected,
    /// The capture peer left the session.
    PhoneDisconnected,
    /// A newly scanned item was stored in the collection.
    ItemAdded(ScannedItem),
    /// The relay link is gone; pairing is over.
    Closed,
}

// ── PairingClient ────────────────────────────────────────────────

/// The desktop peer of one pairing session.
pub struct PairingClient<C: CollectionStore> {
    relay: ConnectionInfo,
    client_origin: String,
    collection: C,
    app_tx: mpsc::UnboundedSender<PairingEvent>,
    conn: Option<Connection>,
    link: LinkPhase,
    phase: PairingPhase,
    session: Option<SessionId>,
    /// Monotonically increasing emission counter.
    next_seq: u64,
}

impl<C: CollectionStore> PairingClient<C> {
    /// Prepare a client that will dial `relay` and advertise rendezvous
    /// URLs under `client_origin`.
    pub fn new(
        relay: ConnectionInfo,
        client_origin: impl Into<String>,
        collection: C,
        app_tx: mpsc::UnboundedSender<PairingEvent>,
    ) -> Self {
        Self {
            relay,
            client_origin: client_origin.into(),
            collection,
            app_tx,
            conn: None,
            link: LinkPhase::Connecting,
            phase: PairingPhase::Idle,
            session: None,
            next_seq: 1,
        }
    }

    pub fn phase(&self) -> PairingPhase {
        self.phase
    }

    pub fn link(&self) -> &LinkPhase {
        &self.link
    }

    pub fn session(&self) -> Option<&SessionId> {
        self.session.as_ref()
    }

    /// The URL to encode into the QR code, once a session exists.
    pub fn rendezvous_url(&self) -> Option<String> {
        self.session
            .as_ref()
            .map(|id| rendezvous_url(&self.client_origin, id))
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Mint a session, dial the relay, and join the room as desktop.
    ///
    /// Returns the session id for rendezvous encoding. A handshake
    /// failure drives the link to its terminal `Error` state — the
    /// only recovery is a fresh client with a fresh token.
    pub async fn begin(&mut self) -> Result<SessionId, ScanlinkError> {
        if self.phase != PairingPhase::Idle {
            return Err(ScanlinkError::ProtocolViolation(
                "begin() on a client that already began",
            ));
        }

        let session = SessionId::mint();
        let conn = match Connection::connect(&self.relay).await {
            Ok(conn) => {
                self.link.established()?;
                conn
            }
            Err(e) => {
                self.link.failed()?;
                return Err(e.into());
            }
        };

        let seq = self.bump_seq();
        let join = JoinSession::new(session.clone()).into_packet(seq)?;
        conn.send(join).await.map_err(|_| ScanlinkError::ChannelClosed)?;

        self.conn = Some(conn);
        self.session = Some(session.clone());
        self.phase.session_minted()?;
        Ok(session)
    }

    /// Consume relay events until the link closes or `end` is called.
    pub async fn run(&mut self) -> Result<(), ScanlinkError> {
        loop {
            let Some(conn) = self.conn.as_mut() else {
                return Ok(()); // ended
            };
            let Some(packet) = conn.recv().await else {
                // Transport lost. No queue, no catch-up: anything the
                // phone scanned while we were gone is dropped.
                if self.link.is_connected() {
                    self.link.closed()?;
                }
                self.phase.close();
                let _ = self.app_tx.send(PairingEvent::Closed);
                return Ok(());
            };

            match packet.event() {
                Ok(Event::Ping) => continue,
                Ok(Event::PhoneConnected) => {
                    self.phase.peer_joined()?;
                    let _ = self.app_tx.send(PairingEvent::PhoneConnected);
                }
                Ok(Event::PhoneDisconnected) => {
                    self.phase.peer_left()?;
                    let _ = self.app_tx.send(PairingEvent::PhoneDisconnected);
                }
                Ok(Event::ComicReceived) => {
                    self.handle_item(packet.payload().to_vec()).await?;
                }
                Ok(other) => debug!(%other, "ignoring event"),
                Err(e) => warn!("dropping frame: {e}"),
            }
        }
    }

    /// One duplicate-check round trip per received item, no batching.
    async fn handle_item(&mut self, item_bytes: Vec<u8>) -> Result<(), ScanlinkError> {
        let item = match ScannedItem::from_bytes(&item_bytes) {
            Ok(item) => item,
            Err(e) => {
                warn!("undecodable item dropped: {e}");
                return Ok(());
            }
        };

        if self.collection.contains(&item.identity_key).await? {
            // Already in the collection: tell the phone, touch nothing
            // locally. The envelope carries the received bytes back
            // verbatim.
            let Some(session) = self.session.clone() else {
                return Ok(());
            };
            let seq = self.bump_seq();
            let packet = ScanEnvelope::new(session, item_bytes).into_duplicate_packet(seq)?;
            if let Some(conn) = self.conn.as_ref() {
                if conn.send(packet).await.is_err() {
                    debug!("duplicate signal dropped, link gone");
                }
            }
        } else {
            self.collection.insert(item.clone()).await?;
            let _ = self.app_tx.send(PairingEvent::ItemAdded(item));
        }
        Ok(())
    }

    /// Close the transport and discard the session id.
    ///
    /// Callable from any state; idempotent.
    pub async fn end(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Ok(goodbye) = Packet::new_event(Event::Goodbye, self.next_seq, Vec::new()) {
                let _ = conn.send(goodbye).await;
            }
            if self.link.is_connected() {
                let _ = self.link.closed();
            }
        }
        self.session = None;
        self.phase.close();
    }
}

// ── Tests ────────────────────────────────────────────────────────
