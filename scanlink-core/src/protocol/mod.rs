//! High-level protocol payload definitions.
//!
//! Each sub-module defines the structured payloads for one protocol
//! domain. Pairing payloads are serialized with `serde` + `bincode`;
//! items ride as JSON because their metadata is free-form. Both are
//! carried inside [`Packet`] bodies.
//!
//! [`Packet`]: crate::packet::Packet

pub mod item;
pub mod pairing;

// Re-export the most commonly used types at the protocol level.
pub use item::ScannedItem;
pub use pairing::{JoinSession, PhoneConnect, ScanEnvelope};
