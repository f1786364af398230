//! Byte-at-a-time frame reassembly.
//!
//! [`FrameDecoder`] never fails and never blocks. Every protocol violation is
//! reported to the [`FrameSink`] as a [`NoiseReason`] and the decoder falls
//! back to a well-defined state, so the next start token always resynchronizes
//! the stream.

use std::fmt;

use bytes::{BufMut, BytesMut};
use tracing::{debug, trace};

use crate::codec::Frame;
use crate::crc::crc16_ccitt;
use crate::wire::{
    CRC_SIZE, ESCAPE_MASK, ESCAPE_TOKEN, HEADER_SIZE, MAX_PAYLOAD, OPCODE_SIZE, START_TOKEN,
};

const INITIAL_BUFFER_CAPACITY: usize = 256;

/// Where the decoder is within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Waiting for a start token; everything else is dropped.
    Idle,
    /// Inside a frame, appending unescaped bytes.
    Collecting,
    /// Inside a frame, the previous byte was an escape token.
    Escaping,
}

/// Why a run of bytes was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoiseReason {
    /// A start token arrived in the middle of a frame.
    MultipleStartTokens,
    /// An escape token followed another escape token.
    DoubleEscape,
    /// The frame ran past its declared length, or declared more than allowed.
    Overflow,
    /// The frame was complete but its checksum did not match.
    CrcMismatch,
}

impl NoiseReason {
    /// Short lowercase description.
    pub fn as_str(self) -> &'static str {
        match self {
            NoiseReason::MultipleStartTokens => "multiple start tokens",
            NoiseReason::DoubleEscape => "double escape",
            NoiseReason::Overflow => "overflow",
            NoiseReason::CrcMismatch => "crc mismatch",
        }
    }
}

impl fmt::Display for NoiseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives decoder output, synchronously and in stream order.
pub trait FrameSink {
    /// A structurally complete, CRC-valid frame.
    fn on_frame(&mut self, frame: Frame);

    /// A discarded byte sequence.
    fn on_noise(&mut self, reason: NoiseReason);
}

/// Running counters. Not reset with the decoder state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub bytes_fed: u64,
    pub frames: u64,
    pub multiple_start_tokens: u64,
    pub double_escapes: u64,
    pub overflows: u64,
    pub crc_mismatches: u64,
}

impl DecoderStats {
    /// Total number of noise events of any kind.
    pub fn noise_total(&self) -> u64 {
        self.multiple_start_tokens + self.double_escapes + self.overflows + self.crc_mismatches
    }

    fn record_noise(&mut self, reason: NoiseReason) {
        let counter = match reason {
            NoiseReason::MultipleStartTokens => &mut self.multiple_start_tokens,
            NoiseReason::DoubleEscape => &mut self.double_escapes,
            NoiseReason::Overflow => &mut self.overflows,
            NoiseReason::CrcMismatch => &mut self.crc_mismatches,
        };
        *counter = counter.saturating_add(1);
    }
}

/// Reassembles frames from an unbounded, arbitrarily chunked byte stream.
///
/// One decoder per connection. Memory use is bounded by the single in-flight
/// frame (at most `HEADER_SIZE + max_payload + CRC_SIZE` bytes).
#[derive(Debug)]
pub struct FrameDecoder {
    state: DecoderState,
    buf: BytesMut,
    expected_len: Option<usize>,
    max_payload: usize,
    stats: DecoderStats,
}

impl FrameDecoder {
    /// Create a decoder accepting any payload the length field can address.
    pub fn new() -> Self {
        Self::with_max_payload(MAX_PAYLOAD)
    }

    /// Create a decoder that rejects frames declaring more than `max_payload` bytes.
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            state: DecoderState::Idle,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            expected_len: None,
            max_payload: max_payload.min(MAX_PAYLOAD),
            stats: DecoderStats::default(),
        }
    }

    /// Process `bytes`, reporting frames and noise to `sink` as they complete.
    pub fn feed<S: FrameSink + ?Sized>(&mut self, bytes: &[u8], sink: &mut S) {
        self.stats.bytes_fed = self.stats.bytes_fed.saturating_add(bytes.len() as u64);
        for &byte in bytes {
            self.push(byte, sink);
        }
    }

    /// Drop any partial frame and return to `Idle`.
    pub fn reset(&mut self) {
        self.state = DecoderState::Idle;
        self.buf.clear();
        self.expected_len = None;
    }

    /// Current state.
    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Unescaped bytes of the in-flight frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Largest payload this decoder accepts.
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Change the payload limit. Applies from the next frame header.
    pub fn set_max_payload(&mut self, max_payload: usize) {
        self.max_payload = max_payload.min(MAX_PAYLOAD);
    }

    /// Counters since construction.
    pub fn stats(&self) -> &DecoderStats {
        &self.stats
    }

    fn push<S: FrameSink + ?Sized>(&mut self, byte: u8, sink: &mut S) {
        let byte = match self.state {
            DecoderState::Idle => {
                if byte == START_TOKEN {
                    self.begin();
                }
                return;
            }
            _ if byte == START_TOKEN => {
                // Treat the new token as the start of the next frame.
                self.noise(NoiseReason::MultipleStartTokens, sink);
                self.begin();
                return;
            }
            DecoderState::Escaping if byte == ESCAPE_TOKEN => {
                self.noise(NoiseReason::DoubleEscape, sink);
                self.reset();
                return;
            }
            DecoderState::Escaping => {
                self.state = DecoderState::Collecting;
                byte ^ ESCAPE_MASK
            }
            DecoderState::Collecting if byte == ESCAPE_TOKEN => {
                self.state = DecoderState::Escaping;
                return;
            }
            DecoderState::Collecting => byte,
        };

        self.buf.put_u8(byte);
        self.check_length(sink);
    }

    fn check_length<S: FrameSink + ?Sized>(&mut self, sink: &mut S) {
        let len = self.buf.len();
        if len == HEADER_SIZE {
            let declared =
                u16::from_le_bytes([self.buf[OPCODE_SIZE], self.buf[OPCODE_SIZE + 1]]) as usize;
            if declared > self.max_payload {
                self.noise(NoiseReason::Overflow, sink);
                self.reset();
                return;
            }
            self.expected_len = Some(declared);
            self.buf.reserve(declared + CRC_SIZE);
            return;
        }

        let Some(expected) = self.expected_len else {
            return;
        };
        let total = HEADER_SIZE + expected + CRC_SIZE;
        if len == total {
            self.complete(sink);
        } else if len > total {
            self.noise(NoiseReason::Overflow, sink);
            self.reset();
        }
    }

    fn complete<S: FrameSink + ?Sized>(&mut self, sink: &mut S) {
        let crc_at = self.buf.len() - CRC_SIZE;
        let received = u16::from_le_bytes([self.buf[crc_at], self.buf[crc_at + 1]]);
        let calculated = crc16_ccitt(&self.buf[..crc_at]);

        if received != calculated {
            debug!(received, calculated, "checksum mismatch");
            self.noise(NoiseReason::CrcMismatch, sink);
            self.reset();
            return;
        }

        let mut body = self.buf.split_to(crc_at);
        self.reset();

        let opcode = u16::from_le_bytes([body[0], body[1]]);
        let payload = body.split_off(HEADER_SIZE).freeze();
        self.stats.frames = self.stats.frames.saturating_add(1);
        trace!(opcode, size = payload.len(), "frame decoded");
        sink.on_frame(Frame::new(opcode, payload));
    }

    fn begin(&mut self) {
        self.buf.clear();
        self.expected_len = None;
        self.state = DecoderState::Collecting;
    }

    fn noise<S: FrameSink + ?Sized>(&mut self, reason: NoiseReason, sink: &mut S) {
        self.stats.record_noise(reason);
        debug!(%reason, buffered = self.buf.len(), "discarding noise");
        sink.on_noise(reason);
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
