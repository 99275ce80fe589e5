//! Connection lifecycle state shared by both peers.

pub mod link;

pub use link::LinkPhase;
