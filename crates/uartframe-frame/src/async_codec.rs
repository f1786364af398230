//! `tokio-util` codec for use with `FramedRead` / `FramedWrite`.

use std::collections::VecDeque;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::codec::{encode_frame, Frame};
use crate::decoder::{DecoderState, DecoderStats, FrameDecoder};
use crate::error::{FrameError, Result};
use crate::sink::DecodeEvent;

/// Streams [`DecodeEvent`]s out of, and [`Frame`]s into, async byte streams.
///
/// Every byte handed to [`Decoder::decode`] is consumed immediately; partial
/// frames live inside the state machine, not in the read buffer.
#[derive(Debug, Default)]
pub struct UartCodec {
    decoder: FrameDecoder,
    pending: VecDeque<DecodeEvent>,
}

impl UartCodec {
    /// Codec accepting any addressable payload size.
    pub fn new() -> Self {
        Self::default()
    }

    /// Codec limited to `max_payload` bytes in both directions.
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            decoder: FrameDecoder::with_max_payload(max_payload),
            pending: VecDeque::new(),
        }
    }

    /// Decoder counters.
    pub fn stats(&self) -> &DecoderStats {
        self.decoder.stats()
    }
}

impl Decoder for UartCodec {
    type Item = DecodeEvent;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<DecodeEvent>> {
        if !src.is_empty() {
            let chunk = src.split();
            self.decoder.feed(&chunk, &mut self.pending);
        }
        Ok(self.pending.pop_front())
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<DecodeEvent>> {
        if let Some(event) = self.decode(src)? {
            return Ok(Some(event));
        }
        if self.decoder.state() != DecoderState::Idle {
            debug!(
                buffered = self.decoder.buffered(),
                "discarding partial frame at end of stream"
            );
            self.decoder.reset();
        }
        Ok(None)
    }
}

impl Encoder<Frame> for UartCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        let max = self.decoder.max_payload();
        if frame.payload().len() > max {
            return Err(FrameError::PayloadTooLarge {
                size: frame.payload().len(),
                max,
            });
        }
        encode_frame(frame.opcode(), frame.payload(), dst)
    }
}
