//! Byte-stuffed, CRC-protected packet framing for serial links.
//!
//! Every packet travels as:
//! - a single unescaped start token (`0x7E`)
//! - a 2-byte little-endian opcode and a 2-byte little-endian payload length
//! - the payload
//! - a little-endian CRC-16/CCITT over header and payload
//!
//! with every start or escape token after the first byte escaped.
//!
//! The decoder consumes bytes in any chunking, reports corrupted runs as
//! noise and always resynchronizes on the next start token.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod crc;
pub mod decoder;
pub mod error;
pub mod reader;
pub mod sink;
pub mod wire;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::UartCodec;
pub use codec::{encode, encode_frame, Frame, FrameConfig};
pub use crc::crc16_ccitt;
pub use decoder::{DecoderState, DecoderStats, FrameDecoder, FrameSink, NoiseReason};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use sink::{decode_all, ChannelSink, DecodeEvent};
pub use wire::{
    CRC_SIZE, ESCAPE_MASK, ESCAPE_TOKEN, FRAME_OVERHEAD, HEADER_SIZE, LENGTH_SIZE, MAX_PAYLOAD,
    OPCODE_SIZE, START_TOKEN,
};
pub use writer::FrameWriter;
