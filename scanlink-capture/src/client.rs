//! Relay glue for the capture peer.
//!
//! Parses the rendezvous URL the phone loaded, joins the session, and
//! shuttles traffic between the scheduler and the relay: emissions go
//! out as `barcode-scanned`, inbound `duplicate-detected` becomes UI
//! feedback. The scan counter lives in the scheduler and is not
//! touched by duplicate reports.

use scanlink_core::{
    Connection, ConnectionInfo, Event, LinkPhase, Packet, PhoneConnect, ScanEnvelope,
    ScanlinkError, ScannedItem, SessionId, parse_rendezvous,
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::scheduler::ScanFeedback;

/// The capture peer of one pairing session.
pub struct CaptureClient {
    conn: Connection,
    link: LinkPhase,
    session: SessionId,
    /// Monotonically increasing emission counter.
    next_seq: u64,
}

impl CaptureClient {
    /// Join the session named by a rendezvous URL
    /// (`{origin}/scan/{session-id}`).
    pub async fn connect(relay: &ConnectionInfo, rendezvous: &str) -> Result<Self, ScanlinkError> {
        let session = parse_rendezvous(rendezvous)?;
        Self::connect_session(relay, session).await
    }

    /// Join a session whose id is already known.
    pub async fn connect_session(
        relay: &ConnectionInfo,
        session: SessionId,
    ) -> Result<Self, ScanlinkError> {
        let mut link = LinkPhase::Connecting;
        let conn = match Connection::connect(relay).await {
            Ok(conn) => {
                link.established()?;
                conn
            }
            Err(e) => {
                link.failed()?;
                return Err(e.into());
            }
        };

        let mut client = Self {
            conn,
            link,
            session,
            next_seq: 1,
        };
        let seq = client.bump_seq();
        let join = PhoneConnect::new(client.session.clone()).into_packet(seq)?;
        client
            .conn
            .send(join)
            .await
            .map_err(|_| ScanlinkError::ChannelClosed)?;
        Ok(client)
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub fn link(&self) -> &LinkPhase {
        &self.link
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Shuttle until the link closes or the scheduler's emission
    /// channel is dropped.
    pub async fn run(
        &mut self,
        mut emissions: mpsc::Receiver<ScannedItem>,
        feedback: mpsc::UnboundedSender<ScanFeedback>,
    ) -> Result<(), ScanlinkError> {
        loop {
            tokio::select! {
                maybe_item = emissions.recv() => match maybe_item {
                    Some(item) => self.forward(item).await?,
                    None => break, // scheduler stopped
                },
                maybe_packet = self.conn.recv() => match maybe_packet {
                    Some(packet) => self.handle_packet(packet, &feedback),
                    None => {
                        if self.link.is_connected() {
                            self.link.closed()?;
                        }
                        break;
                    }
                },
            }
        }
        Ok(())
    }

    /// Relay one decoded item into the session room.
    async fn forward(&mut self, item: ScannedItem) -> Result<(), ScanlinkError> {
        let bytes = item.to_bytes()?;
        let seq = self.bump_seq();
        let packet = ScanEnvelope::new(self.session.clone(), bytes).into_scanned_packet(seq)?;
        if self.conn.send(packet).await.is_err() {
            // best effort
            debug!("emission dropped, link gone");
        }
        Ok(())
    }

    fn handle_packet(&mut self, packet: Packet, feedback: &mpsc::UnboundedSender<ScanFeedback>) {
        match packet.event() {
            Ok(Event::Ping) => {}
            Ok(Event::DuplicateDetected) => match ScannedItem::from_bytes(packet.payload()) {
                Ok(item) => {
                    let _ = feedback.send(ScanFeedback::Duplicate(item));
                }
                Err(e) => warn!("undecodable duplicate report: {e}"),
            },
            Ok(Event::PhoneConnected) => {} // room echo of our own join
            Ok(Event::PhoneDisconnected) => debug!("desktop left the session"),
            Ok(other) => debug!(%other, "ignoring event"),
            Err(e) => warn!("dropping frame: {e}"),
        }
    }

    /// Announce departure and close the link. Idempotent.
    pub async fn close(&mut self) {
        if self.link.is_connected() {
            let seq = self.bump_seq();
            if let Ok(goodbye) = Packet::new_event(Event::Goodbye, seq, Vec::new()) {
                let _ = self.conn.send(goodbye).await;
            }
            let _ = self.link.closed();
        }
    }
}
