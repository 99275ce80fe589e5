//! Scanlink desktop peer.
//!
//! The desktop side of a pairing session: mints the rendezvous token,
//! consumes relayed items, and answers each with the duplicate-check
//! handshake against the collection capability.

pub mod collection;
pub mod pairing;

pub use collection::{CollectionStore, MemoryCollection};
pub use pairing::{PairingClient, PairingEvent, PairingPhase};
