//! A single wire frame: header plus opaque payload.

use crate::error::ScanlinkError;
use crate::event::Event;
use crate::header::{self, FrameHeader, FrameHeaderBytes};

/// Maximum payload size accepted in a single frame (256 KiB).
pub const MAX_PAYLOAD_SIZE: usize = 256 * 1024;

/// Maximum total frame size the codec will buffer.
pub const MAX_FRAME_SIZE: usize = header::HEADER_SIZE + MAX_PAYLOAD_SIZE;

/// One framed protocol message.
#[derive(Debug, Clone)]
pub struct Packet {
    header: FrameHeader,
    payload: Vec<u8>,
}

impl Packet {
    /// Build a frame for `event` carrying `payload`.
    ///
    /// The checksum is the first four bytes of the blake3 hash of the
    /// payload, or zero for empty payloads.
    pub fn new_event(event: Event, sequence: u64, payload: Vec<u8>) -> Result<Self, ScanlinkError> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ScanlinkError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let mut header = FrameHeader::new(0, event as u32, sequence, payload.len() as u64);
        if !payload.is_empty() {
            header.set_checksum(checksum_of(&payload));
        }
        Ok(Self { header, payload })
    }

    /// The periodic keep-alive frame. Sequence zero marks heartbeats.
    pub fn heartbeat() -> Self {
        Self {
            header: FrameHeader::new(0, Event::Ping as u32, 0, 0),
            payload: Vec::new(),
        }
    }

    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consume the packet and take ownership of the payload bytes.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// The event this frame carries, if the id is known.
    pub fn event(&self) -> Result<Event, ScanlinkError> {
        Event::try_from(self.header.event_id())
    }

    pub fn sequence(&self) -> u64 {
        self.header.sequence()
    }

    pub fn payload_length(&self) -> u64 {
        self.header.payload_length()
    }

    /// Serialize header + payload into one contiguous buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ScanlinkError> {
        if self.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ScanlinkError::PayloadTooLarge {
                size: self.payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        let mut out = self.header.to_bytes().to_vec();
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    /// Parse a complete frame from `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ScanlinkError> {
        if bytes.len() < header::HEADER_SIZE {
            return Err(ScanlinkError::InvalidFrameLength {
                expected: header::HEADER_SIZE,
                actual: bytes.len(),
            });
        }

        let header_bytes: FrameHeaderBytes = bytes[0..header::HEADER_SIZE]
            .try_into()
            .map_err(|_| ScanlinkError::InvalidHeader("header slice length"))?;
        let header = FrameHeader::from_bytes(header_bytes)?;

        let expected = header::HEADER_SIZE + header.payload_length() as usize;
        if bytes.len() != expected {
            return Err(ScanlinkError::InvalidFrameLength {
                expected,
                actual: bytes.len(),
            });
        }
        if header.payload_length() as usize > MAX_PAYLOAD_SIZE {
            return Err(ScanlinkError::PayloadTooLarge {
                size: header.payload_length() as usize,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        Ok(Self {
            header,
            payload: bytes[header::HEADER_SIZE..].to_vec(),
        })
    }

    /// Verify the payload against the header checksum.
    pub fn validate(&self) -> bool {
        if self.payload.is_empty() {
            return self.header.checksum() == 0;
        }
        self.header.checksum() == checksum_of(&self.payload)
    }
}

/// First four little-endian bytes of the blake3 hash.
fn checksum_of(payload: &[u8]) -> u32 {
    let hash = blake3::hash(payload);
    let bytes = hash.as_bytes();
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_packet_roundtrip() {
        let packet = Packet::new_event(Event::BarcodeScanned, 3, b"item".to_vec()).unwrap();
        let bytes = packet.to_bytes().unwrap();
        let decoded = Packet::from_bytes(&bytes).unwrap();

        assert_eq!(decoded.event().unwrap(), Event::BarcodeScanned);
        assert_eq!(decoded.sequence(), 3);
        assert_eq!(decoded.payload(), b"item");
        assert!(decoded.validate());
    }

    #[test]
    fn heartbeat_has_zero_sequence() {
        let hb = Packet::heartbeat();
        assert_eq!(hb.sequence(), 0);
        assert_eq!(hb.event().unwrap(), Event::Ping);
        assert!(hb.validate());
    }

    #[test]
    fn payload_too_large_rejected() {
        let result = Packet::new_event(Event::BarcodeScanned, 1, vec![0u8; MAX_PAYLOAD_SIZE + 1]);
        assert!(matches!(
            result,
            Err(ScanlinkError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn truncated_frame_rejected() {
        let packet = Packet::new_event(Event::ComicReceived, 1, b"payload".to_vec()).unwrap();
        let mut bytes = packet.to_bytes().unwrap();
        bytes.pop();
        assert!(matches!(
            Packet::from_bytes(&bytes),
            Err(ScanlinkError::InvalidFrameLength { .. })
        ));
    }

    #[test]
    fn tampered_payload_fails_validation() {
        let packet = Packet::new_event(Event::ComicReceived, 1, b"payload".to_vec()).unwrap();
        let mut bytes = packet.to_bytes().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let decoded = Packet::from_bytes(&bytes).unwrap();
        assert!(!decoded.validate());
    }
}
