//! Scanlink capture peer.
//!
//! The phone side of a pairing session: a continuous capture loop
//! snapshots frames, submits them to the external decode capability,
//! suppresses duplicates, paces itself with a cooldown, and relays
//! every fresh item into the session room.

pub mod client;
pub mod decode;
pub mod device;
pub mod scheduler;

pub use client::CaptureClient;
pub use decode::BarcodeDecoder;
pub use device::{Frame, FrameSource};
pub use scheduler::{CaptureScheduler, ScanConfig, ScanFeedback, ScannerPhase};
