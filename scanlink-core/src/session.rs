//! Session identity and rendezvous addressing.
//!
//! A session links exactly one desktop peer and one capture peer. Its id
//! is an opaque, unguessable token minted by the desktop and carried to
//! the phone inside a rendezvous URL (usually rendered as a QR code).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ScanlinkError;

// ── SessionId ────────────────────────────────────────────────────

/// Opaque rendezvous token identifying one pairing session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Mint a fresh id. UUID v4 carries 122 bits of randomness.
    pub fn mint() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = ScanlinkError;

    /// Accept any opaque token that can survive as a URL path segment.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ScanlinkError::InvalidRendezvous(
                "empty session token".into(),
            ));
        }
        if s.contains('/') || s.chars().any(char::is_whitespace) {
            return Err(ScanlinkError::InvalidRendezvous(format!(
                "token is not a valid path segment: {s:?}"
            )));
        }
        Ok(Self(s.to_string()))
    }
}

// ── PeerRole ─────────────────────────────────────────────────────

/// Which side of the pairing a connection represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeerRole {
    /// The desktop session that minted the rendezvous token.
    Desktop,
    /// The handheld camera device.
    Capture,
}

impl PeerRole {
    /// The role on the other side of the session.
    pub fn other(&self) -> Self {
        match self {
            PeerRole::Desktop => PeerRole::Capture,
            PeerRole::Capture => PeerRole::Desktop,
        }
    }
}

impl fmt::Display for PeerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerRole::Desktop => write!(f, "desktop"),
            PeerRole::Capture => write!(f, "capture"),
        }
    }
}

// ── Rendezvous URL ───────────────────────────────────────────────

/// Path prefix under which the capture device loads a session.
const RENDEZVOUS_PATH: &str = "/scan/";

/// Build the rendezvous URL the desktop encodes into a QR code.
pub fn rendezvous_url(client_origin: &str, session: &SessionId) -> String {
    let origin = client_origin.trim_end_matches('/');
    format!("{origin}{RENDEZVOUS_PATH}{session}")
}

/// Extract the session id from a rendezvous URL.
pub fn parse_rendezvous(url: &str) -> Result<SessionId, ScanlinkError> {
    let (_, token) = url.rsplit_once(RENDEZVOUS_PATH).ok_or_else(|| {
        ScanlinkError::InvalidRendezvous(format!("no {RENDEZVOUS_PATH} segment in {url:?}"))
    })?;
    token.parse()
}
