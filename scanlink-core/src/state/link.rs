//! Shared connection state machine used by both the desktop and the
//! capture peer.
//!
//! ```text
//!  Connecting ──► Connected ──► Disconnected
//!      │
//!      ▼
//!    Error
//! ```
//!
//! `Disconnected` and `Error` are terminal: this layer never reconnects.
//! Recovery from a failed handshake means minting a fresh rendezvous
//! token, not retrying in place — simplicity is chosen over resilience.

use std::time::Instant;

use crate::error::ScanlinkError;

/// The lifecycle phase of one peer's relay link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkPhase {
    /// Transport initiated but the handshake has not completed.
    /// Initial state.
    Connecting,

    /// Handshake complete; events flow in both directions.
    Connected {
        /// When the link entered the `Connected` state.
        since: Instant,
    },

    /// Transport lost or explicitly closed. Terminal.
    Disconnected,

    /// Handshake failed. Terminal.
    Error,
}

impl Default for LinkPhase {
    fn default() -> Self {
        Self::Connecting
    }
}

impl std::fmt::Display for LinkPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected { .. } => write!(f, "Connected"),
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Error => write!(f, "Error"),
        }
    }
}

impl LinkPhase {
    /// Returns `true` when events can flow.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Returns `true` for the two terminal states.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Error)
    }

    /// How long the link has been in the `Connected` state.
    ///
    /// Returns `None` for any other phase.
    pub fn connected_duration(&self) -> Option<std::time::Duration> {
        match self {
            Self::Connected { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Connected` on handshake success.
    ///
    /// Valid from: `Connecting`.
    pub fn established(&mut self) -> Result<(), ScanlinkError> {
        match self {
            Self::Connecting => {
                *self = Self::Connected {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(ScanlinkError::ProtocolViolation(
                "cannot establish: not in Connecting state",
            )),
        }
    }

    /// Transition to `Error` on handshake failure. Terminal.
    ///
    /// Valid from: `Connecting`.
    pub fn failed(&mut self) -> Result<(), ScanlinkError> {
        match self {
            Self::Connecting => {
                *self = Self::Error;
                Ok(())
            }
            _ => Err(ScanlinkError::ProtocolViolation(
                "cannot fail handshake: not in Connecting state",
            )),
        }
    }

    /// Transition to `Disconnected` on transport loss or explicit close.
    ///
    /// Valid from: `Connected`.
    pub fn closed(&mut self) -> Result<(), ScanlinkError> {
        match self {
            Self::Connected { .. } => {
                *self = Self::Disconnected;
                Ok(())
            }
            _ => Err(ScanlinkError::ProtocolViolation(
                "cannot close: not in Connected state",
            )),
        }
    }
}
