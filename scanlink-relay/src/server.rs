//! Relay server: accept loop, per-connection reader tasks, and the hub
//! actor that owns all session state.
//!
//! Every mutation of membership or room state happens inside the hub
//! task, which consumes [`HubCommand`]s from connection tasks over one
//! mpsc channel. Joins and leaves touching the same session are thereby
//! serialized without locks; different sessions share nothing but the
//! queue.

use std::time::Duration;

use scanlink_core::{
    Connection, Event, JoinSession, Packet, PacketSender, PeerRole, PhoneConnect, ScanEnvelope,
    ScanlinkError, SessionId,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::registry::{ConnId, SessionRegistry};
use crate::rooms::RelayChannel;

// ── HubCommand ───────────────────────────────────────────────────

/// One unit of work for the hub actor.
#[derive(Debug)]
enum HubCommand {
    /// A connection asked to become `role` in `session_id`.
    Join {
        conn: ConnId,
        role: PeerRole,
        session_id: SessionId,
        outbox: PacketSender,
    },
    /// A client submission to republish into its room.
    Forward { conn: ConnId, packet: Packet },
    /// The connection's transport is gone.
    Disconnected { conn: ConnId },
    /// Periodic stale-session eviction.
    Sweep,
}

// ── RelayServer ──────────────────────────────────────────────────

/// The top-level relay service.
pub struct RelayServer {
    config: RelayConfig,
    shutdown: CancellationToken,
}

impl RelayServer {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// A token other tasks (ctrl-c handler, tests) can cancel to stop
    /// the server.
    pub fn shutdown_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Bind the configured port and serve until shutdown.
    pub async fn run(&self) -> Result<(), ScanlinkError> {
        let addr = format!("0.0.0.0:{}", self.config.network.listen_port);
        let listener = TcpListener::bind(&addr).await?;
        info!("relay listening on {addr}");
        self.run_on(listener).await
    }

    /// Serve on an already-bound listener (tests bind port 0).
    pub async fn run_on(&self, listener: TcpListener) -> Result<(), ScanlinkError> {
        let (hub_tx, hub_rx) = mpsc::channel(256);

        let hub = Hub::new(Duration::from_secs(self.config.session.ttl_secs));
        let hub_task = tokio::spawn(hub.run(hub_rx));

        // Sweep timer.
        let sweep_tx = hub_tx.clone();
        let sweep_interval = Duration::from_secs(self.config.session.sweep_interval_secs.max(1));
        let sweep_shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = sweep_shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        if sweep_tx.send(HubCommand::Sweep).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        // Accept loop.
        let mut next_conn_id: u64 = 1;
        loop {
            let accept = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                result = listener.accept() => result,
            };
            let (stream, peer) = match accept {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("accept error: {e}");
                    continue;
                }
            };

            let conn = ConnId(next_conn_id);
            next_conn_id += 1;
            debug!(%conn, "accepted {peer}");
            tokio::spawn(connection_task(conn, stream, hub_tx.clone()));
        }

        drop(hub_tx);
        let _ = hub_task.await;
        Ok(())
    }
}

// ── Connection task ──────────────────────────────────────────────

/// Read frames from one client and translate them into hub commands.
async fn connection_task(conn: ConnId, stream: TcpStream, hub_tx: mpsc::Sender<HubCommand>) {
    let mut link = Connection::new(stream);
    let outbox = link.sender();

    loop {
        let Some(packet) = link.recv().await else {
            break; // transport gone
        };
        let event = match packet.event() {
            Ok(ev) => ev,
            Err(e) => {
                warn!(%conn, "dropping frame: {e}");
                continue;
            }
        };
        if !event.is_client_origin() {
            warn!(%conn, %event, "dropping server-origin event from client");
            continue;
        }

        match event {
            Event::Ping => continue,
            Event::Goodbye => break,
            Event::JoinSession => match JoinSession::from_bytes(packet.payload()) {
                Ok(join) => {
                    let cmd = HubCommand::Join {
                        conn,
                        role: PeerRole::Desktop,
                        session_id: join.session_id,
                        outbox: outbox.clone(),
                    };
                    if hub_tx.send(cmd).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(%conn, "bad join-session payload: {e}"),
            },
            Event::PhoneConnect => match PhoneConnect::from_bytes(packet.payload()) {
                Ok(join) => {
                    let cmd = HubCommand::Join {
                        conn,
                        role: PeerRole::Capture,
                        session_id: join.session_id,
                        outbox: outbox.clone(),
                    };
                    if hub_tx.send(cmd).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(%conn, "bad phone-connect payload: {e}"),
            },
            Event::BarcodeScanned | Event::ComicDuplicate => {
                if hub_tx
                    .send(HubCommand::Forward { conn, packet })
                    .await
                    .is_err()
                {
                    break;
                }
            }
            other => warn!(%conn, %other, "unexpected event"),
        }
    }

    let _ = hub_tx.send(HubCommand::Disconnected { conn }).await;
}

// ── Hub ──────────────────────────────────────────────────────────

/// Single-task owner of the registry and the rooms.
struct Hub {
    registry: SessionRegistry,
    rooms: RelayChannel,
    session_ttl: Duration,
    /// Emission counter for server-originated frames.
    next_seq: u64,
}

impl Hub {
    fn new(session_ttl: Duration) -> Self {
        Self {
            registry: SessionRegistry::new(),
            rooms: RelayChannel::new(),
            session_ttl,
            next_seq: 1,
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<HubCommand>) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                HubCommand::Join {
                    conn,
                    role,
                    session_id,
                    outbox,
                } => self.on_join(conn, role, session_id, outbox),
                HubCommand::Forward { conn, packet } => self.on_forward(conn, packet),
                HubCommand::Disconnected { conn } => self.on_disconnected(conn),
                HubCommand::Sweep => self.on_sweep(),
            }
        }
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn on_join(&mut self, conn: ConnId, role: PeerRole, session_id: SessionId, outbox: PacketSender) {
        let outcome = self.registry.join(&session_id, role, conn);

        if let Some(old) = outcome.replaced {
            // Phone reconnect: the stale transport is detached; its
            // reader task will report Disconnected on its own.
            self.rooms.leave(old);
            debug!(session = %session_id, %role, "replaced {old}");
        }
        self.rooms.join_room(conn, outbox, session_id.clone());
        info!(session = %session_id, %role, %conn, "joined");

        // Both peers present now — tell the room. The peer that joined
        // first learns its counterpart has arrived.
        if outcome.peer.is_some() {
            let seq = self.bump_seq();
            if let Ok(packet) = Packet::new_event(Event::PhoneConnected, seq, Vec::new()) {
                self.rooms.broadcast(&session_id, &packet);
            }
        }
    }

    fn on_forward(&mut self, conn: ConnId, packet: Packet) {
        let Ok(event) = packet.event() else { return };
        let (expected_role, republish_as) = match event {
            Event::BarcodeScanned => (PeerRole::Capture, Event::ComicReceived),
            Event::ComicDuplicate => (PeerRole::Desktop, Event::DuplicateDetected),
            _ => return,
        };

        let envelope = match ScanEnvelope::from_bytes(packet.payload()) {
            Ok(env) => env,
            Err(e) => {
                warn!(%conn, %event, "bad envelope: {e}");
                return;
            }
        };
        if self.registry.member(&envelope.session_id, expected_role) != Some(conn) {
            warn!(%conn, %event, session = %envelope.session_id, "submission from non-member dropped");
            return;
        }

        // Republish the item bytes verbatim; the relay never inspects
        // them.
        let seq = self.bump_seq();
        match Packet::new_event(republish_as, seq, envelope.item) {
            Ok(out) => self.rooms.broadcast_except(&envelope.session_id, conn, &out),
            Err(e) => warn!(%conn, "republish failed: {e}"),
        }
    }

    fn on_disconnected(&mut self, conn: ConnId) {
        for departure in self.registry.leave(conn) {
            info!(
                session = %departure.session_id,
                role = %departure.role,
                %conn,
                "left"
            );
            if departure.remaining_peer.is_some() {
                let seq = self.bump_seq();
                if let Ok(packet) = Packet::new_event(Event::PhoneDisconnected, seq, Vec::new()) {
                    self.rooms.broadcast(&departure.session_id, &packet);
                }
            }
        }
        self.rooms.leave(conn);
    }

    fn on_sweep(&mut self) {
        for session_id in self.registry.expired(self.session_ttl) {
            let members = self.registry.remove(&session_id);
            self.rooms.close_room(&session_id);
            info!(session = %session_id, members = members.len(), "evicted stale session");
        }
    }
}
