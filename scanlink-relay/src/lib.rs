//! Scanlink relay server library.
//!
//! Rendezvous point for pairing sessions: desktops mint a session id
//! and join; capture devices follow the QR-encoded URL and join the
//! same room; decoded items and duplicate signals are republished
//! between the two, best-effort, with no retries and no persistence.

pub mod config;
pub mod registry;
pub mod rooms;
pub mod server;

pub use config::RelayConfig;
pub use server::RelayServer;
