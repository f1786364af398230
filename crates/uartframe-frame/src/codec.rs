use bytes::{BufMut, Bytes, BytesMut};

use crate::crc::{crc16_ccitt, crc16_ccitt_update};
use crate::error::{FrameError, Result};
use crate::wire::{
    is_token, ESCAPE_MASK, ESCAPE_TOKEN, FRAME_OVERHEAD, HEADER_SIZE, MAX_PAYLOAD, OPCODE_SIZE,
    START_TOKEN,
};

/// A validated packet: an application-defined opcode and its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    opcode: u16,
    payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(opcode: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            opcode,
            payload: payload.into(),
        }
    }

    /// The frame opcode.
    pub fn opcode(&self) -> u16 {
        self.opcode
    }

    /// The frame payload.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consume the frame and take its payload.
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Size of the frame before byte-stuffing (header + payload + CRC).
    pub fn unstuffed_size(&self) -> usize {
        FRAME_OVERHEAD + self.payload.len()
    }
}

/// Encode a frame into the wire format, appending to `dst`.
///
/// Wire format:
/// ```text
/// ┌───────┬──────────────────────────────────────────────────────┐
/// │ 0x7E  │ stuff( opcode 2B LE | length 2B LE | payload | crc ) │
/// └───────┴──────────────────────────────────────────────────────┘
/// ```
///
/// `dst` is left untouched when the payload is too large.
pub fn encode_frame(opcode: u16, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let len = u16::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: payload.len(),
        max: MAX_PAYLOAD,
    })?;

    let mut header = [0u8; HEADER_SIZE];
    header[..OPCODE_SIZE].copy_from_slice(&opcode.to_le_bytes());
    header[OPCODE_SIZE..].copy_from_slice(&len.to_le_bytes());
    let crc = crc16_ccitt_update(crc16_ccitt(&header), payload);

    dst.reserve(1 + FRAME_OVERHEAD + payload.len());
    dst.put_u8(START_TOKEN);
    put_stuffed(dst, &header);
    put_stuffed(dst, payload);
    put_stuffed(dst, &crc.to_le_bytes());
    Ok(())
}

/// Encode a frame into a freshly allocated buffer.
pub fn encode(opcode: u16, payload: &[u8]) -> Result<Vec<u8>> {
    let mut buf = BytesMut::new();
    encode_frame(opcode, payload, &mut buf)?;
    Ok(buf.to_vec())
}

fn put_stuffed(dst: &mut BytesMut, bytes: &[u8]) {
    for &b in bytes {
        if is_token(b) {
            dst.put_u8(ESCAPE_TOKEN);
            dst.put_u8(b ^ ESCAPE_MASK);
        } else {
            dst.put_u8(b);
        }
    }
}

/// Configuration for frame readers and writers.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default and upper bound: [`MAX_PAYLOAD`].
    pub max_payload_size: usize,
    /// Read timeout applied to serial streams.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout applied to serial streams.
    pub write_timeout: Option<std::time::Duration>,
}

impl FrameConfig {
    /// The payload limit actually enforced (never above what the wire can address).
    pub fn effective_max_payload(&self) -> usize {
        self.max_payload_size.min(MAX_PAYLOAD)
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
