use std::collections::VecDeque;
use std::io::{ErrorKind, Read};

#[cfg(unix)]
use uartframe_transport::SerialStream;

use crate::codec::{Frame, FrameConfig};
use crate::decoder::{DecoderStats, FrameDecoder};
use crate::error::{FrameError, Result};
use crate::sink::DecodeEvent;

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads frames from any `Read` byte stream.
///
/// Handles partial reads, chunking and noise internally; callers get
/// complete frames (or noise events, via [`read_event`](Self::read_event)).
pub struct FrameReader<T> {
    inner: T,
    decoder: FrameDecoder,
    pending: VecDeque<DecodeEvent>,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            decoder: FrameDecoder::with_max_payload(config.effective_max_payload()),
            pending: VecDeque::new(),
            config,
        }
    }

    /// Read the next frame or noise event (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached. A
    /// partial frame at EOF is discarded.
    pub fn read_event(&mut self) -> Result<DecodeEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(event);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.decoder.feed(&chunk[..read], &mut self.pending);
        }
    }

    /// Read the next complete frame (blocking), skipping noise.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let DecodeEvent::Frame(frame) = self.read_event()? {
                return Ok(frame);
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    ///
    /// Any buffered partial frame is lost.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum payload size for subsequent frames.
    pub fn set_max_payload_size(&mut self, max_payload_size: usize) {
        self.config.max_payload_size = max_payload_size;
        self.decoder.set_max_payload(self.config.effective_max_payload());
    }

    /// Decoder counters.
    pub fn stats(&self) -> &DecoderStats {
        self.decoder.stats()
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(unix)]
impl FrameReader<SerialStream> {
    /// Create a frame reader for a serial stream and apply the read timeout from config.
    pub fn with_config_serial(inner: SerialStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

#[cfg(unix)]
pub(crate) fn transport_to_frame_error(err: uartframe_transport::TransportError) -> FrameError {
    match err {
        uartframe_transport::TransportError::Io(io) => FrameError::Io(io),
        uartframe_transport::TransportError::Open { source, .. }
        | uartframe_transport::TransportError::Configure { source, .. } => FrameError::Io(source),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
