//! Domain-specific error types for the scanlink protocol.
//!
//! All fallible operations return `Result<T, ScanlinkError>`.
//! No panics on invalid input — every error is typed and recoverable.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the scanlink protocol.
#[derive(Debug, Error)]
pub enum ScanlinkError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// Received bytes that do not start with the SLK0 magic sequence.
    #[error("invalid magic bytes: expected SLK0")]
    InvalidMagic,

    /// A field in the frame header could not be parsed.
    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),

    /// The frame payload failed checksum verification.
    #[error("checksum mismatch")]
    ChecksumMismatch,

    /// A numeric value did not map to any known event.
    #[error("unknown event id: {0:#x}")]
    UnknownEvent(u32),

    /// A peer violated protocol rules (bad state for an operation,
    /// event sent in the wrong direction, and so on).
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    // ── Frame Errors ─────────────────────────────────────────────
    /// The payload exceeds the configured maximum size.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The received frame is shorter or longer than expected.
    #[error("invalid frame length: expected {expected}, got {actual}")]
    InvalidFrameLength { expected: usize, actual: usize },

    /// Frame size exceeded the codec limit.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    // ── Transport Errors ─────────────────────────────────────────
    /// The TCP/IO layer reported an error. Terminal for the link —
    /// recovery requires minting a fresh session.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    // ── Capability Errors ────────────────────────────────────────
    /// The capture device could not be acquired or failed mid-use.
    /// Capture stays disabled until the user retries.
    #[error("capture device error: {0}")]
    Device(String),

    /// The external decode capability reported a failure. Swallowed
    /// by the continuous loop, surfaced by the manual path.
    #[error("decode error: {0}")]
    Decode(String),

    // ── Serialization Errors ─────────────────────────────────────
    /// Encoding or decoding of a payload failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// A rendezvous URL or session token could not be parsed.
    #[error("invalid rendezvous: {0}")]
    InvalidRendezvous(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for ScanlinkError {
    fn from(s: String) -> Self {
        ScanlinkError::Other(s)
    }
}

impl From<&str> for ScanlinkError {
    fn from(s: &str) -> Self {
        ScanlinkError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for ScanlinkError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        ScanlinkError::ChannelClosed
    }
}

impl From<Box<bincode::ErrorKind>> for ScanlinkError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        ScanlinkError::Encoding(e.to_string())
    }
}
