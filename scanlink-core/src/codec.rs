//! Framing codec for `tokio_util::codec::Framed` transports.

use bytes::BytesMut;

use crate::error::ScanlinkError;
use crate::header::{self, FrameHeader, FrameHeaderBytes};
use crate::packet::{MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE, Packet};

/// Length-delimited codec for scanlink frames.
#[derive(Debug, Default)]
pub struct ScanlinkCodec;

impl tokio_util::codec::Decoder for ScanlinkCodec {
    type Item = Packet;
    type Error = ScanlinkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() > MAX_FRAME_SIZE {
            return Err(ScanlinkError::FrameTooLarge {
                size: src.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        if src.len() < header::HEADER_SIZE {
            return Ok(None);
        }

        let header_bytes: FrameHeaderBytes = src[..header::HEADER_SIZE]
            .try_into()
            .map_err(|_| ScanlinkError::InvalidHeader("header slice length"))?;
        let header = FrameHeader::from_bytes(header_bytes)?;

        let payload_len = header.payload_length() as usize;
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ScanlinkError::PayloadTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }
        if src.len() < header::HEADER_SIZE + payload_len {
            // partial frame, wait for more bytes
            return Ok(None);
        }

        let frame = src.split_to(header::HEADER_SIZE + payload_len);
        let packet = Packet::from_bytes(&frame)?;

        if !packet.validate() {
            return Err(ScanlinkError::ChecksumMismatch);
        }
        Ok(Some(packet))
    }
}

impl tokio_util::codec::Encoder<Packet> for ScanlinkCodec {
    type Error = ScanlinkError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let bytes = item.to_bytes()?;
        dst.extend_from_slice(&bytes);
        Ok(())
    }
}
