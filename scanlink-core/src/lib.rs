//! # scanlink-core
//!
//! Core protocol library for the scanlink pairing system: a handheld
//! camera device scans barcodes and relays the decoded items, in real
//! time, into a desktop session it was paired with via a QR rendezvous
//! token.
//!
//! This crate contains:
//! - **Protocol types**: `FrameHeader`, `Packet`, `Event`
//! - **Protocol payloads**: `JoinSession`, `PhoneConnect`, `ScanEnvelope`, `ScannedItem`
//! - **Codec**: `ScanlinkCodec` for framed TCP I/O via `tokio_util`
//! - **Network**: `Connection` for managed TCP connections with heartbeat
//! - **Session**: `SessionId` minting and rendezvous URL handling
//! - **State**: the shared `LinkPhase` connection state machine
//! - **Error**: `ScanlinkError` — typed, `thiserror`-based error hierarchy

pub mod codec;
pub mod error;
pub mod event;
pub mod header;
pub mod network;
pub mod packet;
pub mod protocol;
pub mod session;
pub mod state;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::ScanlinkCodec;
pub use error::ScanlinkError;
pub use event::Event;
pub use header::{FrameHeader, HEADER_SIZE};
pub use network::{Connection, ConnectionInfo, PacketSender};
pub use packet::{MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE, Packet};
pub use protocol::{JoinSession, PhoneConnect, ScanEnvelope, ScannedItem};
pub use session::{PeerRole, SessionId, parse_rendezvous, rendezvous_url};
pub use state::LinkPhase;
