//! Wire-format constants shared by the encoder and the decoder.
//!
//! ```text
//! unescaped frame = OPCODE (2B LE) | LENGTH (2B LE) | PAYLOAD (LENGTH bytes) | CRC16 (2B LE)
//! wire bytes      = START_TOKEN | stuff(unescaped frame)
//! ```
//!
//! Stuffing replaces every `START_TOKEN` or `ESCAPE_TOKEN` byte in the
//! unescaped frame with `ESCAPE_TOKEN, byte ^ ESCAPE_MASK`.

/// Unescaped byte that marks the beginning of a frame.
pub const START_TOKEN: u8 = 0x7E;

/// Byte announcing that the next wire byte is escaped.
pub const ESCAPE_TOKEN: u8 = 0x7D;

/// XOR mask applied to an escaped byte.
pub const ESCAPE_MASK: u8 = 0x20;

/// Width of the opcode field.
pub const OPCODE_SIZE: usize = 2;

/// Width of the payload-length field.
pub const LENGTH_SIZE: usize = 2;

/// Opcode + length.
pub const HEADER_SIZE: usize = OPCODE_SIZE + LENGTH_SIZE;

/// Width of the trailing CRC-16.
pub const CRC_SIZE: usize = 2;

/// Unescaped bytes added around every payload.
pub const FRAME_OVERHEAD: usize = HEADER_SIZE + CRC_SIZE;

/// Largest payload the length field can address.
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// Returns true if `byte` must be escaped on the wire.
pub fn is_token(byte: u8) -> bool {
    byte == START_TOKEN || byte == ESCAPE_TOKEN
}

/// Worst-case number of wire bytes for a payload of `payload_len` bytes
/// (every unescaped byte stuffed, plus the start token).
pub fn max_stuffed_len(payload_len: usize) -> usize {
    1 + 2 * (FRAME_OVERHEAD + payload_len)
}
