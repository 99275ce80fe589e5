//! Managed TCP connection with background reader, writer, and heartbeat
//! tasks.
//!
//! The connection owns a framed stream split into halves. Callers only
//! ever touch a pair of mpsc channels; frame ordering from a single
//! sender is preserved by the writer task plus TCP.

use futures::{SinkExt, StreamExt};
use tokio::{net::TcpStream, sync::mpsc};
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use crate::codec::ScanlinkCodec;
use crate::packet::Packet;

/// How often the heartbeat task emits a ping.
const HEARTBEAT_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5);

/// Sending half handed to tasks that only push frames outward.
pub type PacketSender = mpsc::Sender<Packet>;

/// A live link to a single peer.
#[derive(Debug)]
pub struct Connection {
    // Channel to send packets to the background writer task
    tx: mpsc::Sender<Packet>,
    // Channel to receive packets from the background reader task
    rx: mpsc::Receiver<Packet>,
}

impl Connection {
    /// Wrap an established TCP stream in reader/writer/heartbeat tasks.
    pub fn new(stream: TcpStream) -> Self {
        let (mut net_writer, mut net_reader) = Framed::new(stream, ScanlinkCodec).split();

        // User -> Network
        let (user_tx, mut network_rx) = mpsc::channel(100);

        // Network -> User
        let (network_tx, user_rx) = mpsc::channel(100);

        // Writer task: User -> Network
        tokio::spawn(async move {
            while let Some(packet) = network_rx.recv().await {
                if let Err(e) = net_writer.send(packet).await {
                    warn!("network write error: {e}");
                    break;
                }
            }
        });

        // Reader task: Network -> User
        tokio::spawn(async move {
            while let Some(result) = net_reader.next().await {
                match result {
                    Ok(packet) => {
                        if network_tx.send(packet).await.is_err() {
                            // user_rx was dropped, stop reading
                            break;
                        }
                    }
                    Err(e) => {
                        debug!("network read error: {e}");
                        break; // stop on codec/transport errors
                    }
                }
            }
        });

        // Heartbeat task.
        let heartbeat_tx = user_tx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if heartbeat_tx.send(Packet::heartbeat()).await.is_err() {
                    break; // connection handle was dropped
                }
            }
        });

        Self {
            tx: user_tx,
            rx: user_rx,
        }
    }

    /// Dial a peer and wrap the resulting stream.
    pub async fn connect(info: &ConnectionInfo) -> Result<Self, std::io::Error> {
        let stream = TcpStream::connect(info.to_socket_string()).await?;
        Ok(Self::new(stream))
    }

    /// Queue a packet for the writer task. Fails only when the link is
    /// gone.
    pub async fn send(&self, packet: Packet) -> Result<(), mpsc::error::SendError<Packet>> {
        self.tx.send(packet).await
    }

    /// Next inbound packet; `None` once the transport is closed.
    pub async fn recv(&mut self) -> Option<Packet> {
        self.rx.recv().await
    }

    /// Clone the outbound half for tasks that only send.
    pub fn sender(&self) -> PacketSender {
        self.tx.clone()
    }
}

// ── ConnectionInfo ───────────────────────────────────────────────

/// Host/port pair for dialing or binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    host: String,
    port: u16,
}

impl ConnectionInfo {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn to_socket_string(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
