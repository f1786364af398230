use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info};
use uartframe_frame::{
    DecoderStats, Frame, FrameConfig, FrameDecoder, FrameWriter, NoiseReason, MAX_PAYLOAD,
};
use uartframe_transport::TransportError;

use crate::error::{LinkError, Result};
use crate::pump;

/// Something the pump thread observed on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Frame(Frame),
    Noise(NoiseReason),
    /// The read side ended; no further events follow.
    Closed(String),
}

/// Link tuning.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Bytes requested per read on the pump thread.
    pub read_chunk_size: usize,
    /// Largest payload accepted in either direction.
    pub max_payload_size: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: 1024,
            max_payload_size: MAX_PAYLOAD,
        }
    }
}

/// A framed, bidirectional serial link.
///
/// Reads happen on a dedicated pump thread; writes happen on the calling
/// thread through an owned [`FrameWriter`].
///
/// Dropping a `Link` signals the pump to stop but does not wait for it. The
/// thread exits at its next read timeout, or never if the reader blocks
/// without one. Use [`shutdown`](Self::shutdown) to join it.
pub struct Link<W: Write> {
    writer: FrameWriter<W>,
    events: Receiver<LinkEvent>,
    stop: Arc<AtomicBool>,
    pump: Option<JoinHandle<DecoderStats>>,
}

impl<W: Write> Link<W> {
    /// Start pumping `reader` in the background and write through `writer`.
    ///
    /// `reader` should have a read timeout (or otherwise return periodically)
    /// so [`shutdown`](Self::shutdown) does not wait on an idle line.
    pub fn spawn<R>(reader: R, writer: W, config: LinkConfig) -> Result<Self>
    where
        R: Read + Send + 'static,
    {
        let frame_config = FrameConfig {
            max_payload_size: config.max_payload_size,
            ..FrameConfig::default()
        };
        let decoder = FrameDecoder::with_max_payload(frame_config.effective_max_payload());
        let (tx, rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));

        let pump_stop = Arc::clone(&stop);
        let chunk_size = config.read_chunk_size;
        let handle = thread::Builder::new()
            .name("uartframe-pump".to_string())
            .spawn(move || pump::run(reader, decoder, chunk_size, tx, &pump_stop))
            .map_err(TransportError::Io)?;

        info!(
            chunk_size,
            max_payload = frame_config.effective_max_payload(),
            "link started"
        );

        Ok(Self {
            writer: FrameWriter::with_config(writer, frame_config),
            events: rx,
            stop,
            pump: Some(handle),
        })
    }

    /// Encode and send one frame.
    pub fn send(&mut self, opcode: u16, payload: &[u8]) -> Result<()> {
        self.writer.send(opcode, payload)?;
        Ok(())
    }

    pub fn send_frame(&mut self, frame: &Frame) -> Result<()> {
        self.writer.write_frame(frame)?;
        Ok(())
    }

    /// Block until the next event.
    pub fn recv(&self) -> Result<LinkEvent> {
        self.events.recv().map_err(|_| pump_gone())
    }

    /// Wait up to `timeout` for the next event.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<LinkEvent> {
        self.events.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => LinkError::Timeout(timeout),
            RecvTimeoutError::Disconnected => pump_gone(),
        })
    }

    /// Next event if one is already queued.
    pub fn try_recv(&self) -> Result<Option<LinkEvent>> {
        match self.events.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(pump_gone()),
        }
    }

    /// Wait up to `timeout` for a frame, optionally only one with `opcode`.
    ///
    /// Noise and frames with other opcodes are dropped while waiting. A
    /// closed link fails with [`LinkError::Disconnected`].
    pub fn recv_frame_timeout(&self, timeout: Duration, opcode: Option<u16>) -> Result<Frame> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(LinkError::Timeout(timeout));
            }

            match self.recv_timeout(remaining) {
                Ok(LinkEvent::Frame(frame)) => {
                    if opcode.is_none_or(|wanted| wanted == frame.opcode()) {
                        return Ok(frame);
                    }
                    debug!(opcode = frame.opcode(), "skipping frame while waiting");
                }
                Ok(LinkEvent::Noise(reason)) => {
                    debug!(%reason, "skipping noise while waiting");
                }
                Ok(LinkEvent::Closed(reason)) => return Err(LinkError::Disconnected(reason)),
                Err(LinkError::Timeout(_)) => return Err(LinkError::Timeout(timeout)),
                Err(err) => return Err(err),
            }
        }
    }

    /// Borrow the frame writer.
    pub fn writer(&self) -> &FrameWriter<W> {
        &self.writer
    }

    /// Stop the pump thread, wait for it and return its decoder counters.
    pub fn shutdown(mut self) -> Result<DecoderStats> {
        self.stop.store(true, Ordering::Release);
        let handle = self
            .pump
            .take()
            .ok_or_else(|| LinkError::Disconnected("pump already joined".to_string()))?;
        let stats = handle
            .join()
            .map_err(|_| LinkError::Disconnected("pump thread panicked".to_string()))?;
        info!(
            frames = stats.frames,
            noise = stats.noise_total(),
            "link shut down"
        );
        Ok(stats)
    }
}

impl<W: Write> Drop for Link<W> {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

fn pump_gone() -> LinkError {
    LinkError::Disconnected("pump thread stopped".to_string())
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::net::UnixStream;

    use uartframe_frame::{decode_all, encode, DecodeEvent, FrameError};

    use super::*;

    fn link_pair() -> (Link<UnixStream>, UnixStream) {
        let (local, remote) = UnixStream::pair().unwrap();
        local
            .set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();
        let reader = local.try_clone().unwrap();
        let link = Link::spawn(reader, local, LinkConfig::default()).unwrap();
        (link, remote)
    }

    #[test]
    fn receives_frames_and_noise_in_order() {
        let (link, mut remote) = link_pair();

        let mut wire = encode(1, b"hello").unwrap();
        wire.extend_from_slice(&[0x7E, 0x01, 0x00, 0xFF, 0xFF]);
        wire.extend(encode(2, b"world").unwrap());
        remote.write_all(&wire).unwrap();

        let timeout = Duration::from_secs(2);
        assert_eq!(
            link.recv_timeout(timeout).unwrap(),
            LinkEvent::Frame(Frame::new(1, "hello"))
        );
        // 0xFFFF is a legal length, so the bogus frame swallows bytes until the next start.
        assert_eq!(
            link.recv_timeout(timeout).unwrap(),
            LinkEvent::Noise(NoiseReason::MultipleStartTokens)
        );
        assert_eq!(
            link.recv_timeout(timeout).unwrap(),
            LinkEvent::Frame(Frame::new(2, "world"))
        );

        let stats = link.shutdown().unwrap();
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.multiple_start_tokens, 1);
    }

    #[test]
    fn sends_encoded_frames() {
        let (mut link, mut remote) = link_pair();
        link.send(0x7E7D, &[0x7E, 0x7D]).unwrap();
        link.send_frame(&Frame::new(3, "abc")).unwrap();

        let expected_len =
            encode(0x7E7D, &[0x7E, 0x7D]).unwrap().len() + encode(3, b"abc").unwrap().len();
        let mut wire = vec![0u8; expected_len];
        remote.read_exact(&mut wire).unwrap();

        assert_eq!(
            decode_all(&wire),
            vec![
                DecodeEvent::Frame(Frame::new(0x7E7D, vec![0x7E, 0x7D])),
                DecodeEvent::Frame(Frame::new(3, "abc")),
            ]
        );
        link.shutdown().unwrap();
    }

    #[test]
    fn recv_frame_timeout_filters_by_opcode() {
        let (link, mut remote) = link_pair();

        let mut wire = vec![0x7E, 0x7D, 0x7D];
        wire.extend(encode(5, b"status").unwrap());
        wire.extend(encode(9, b"reply").unwrap());
        remote.write_all(&wire).unwrap();

        let frame = link
            .recv_frame_timeout(Duration::from_secs(2), Some(9))
            .unwrap();
        assert_eq!(frame, Frame::new(9, "reply"));
        assert!(link.try_recv().unwrap().is_none());
    }

    #[test]
    fn recv_frame_timeout_times_out_on_idle_line() {
        let (link, _remote) = link_pair();
        let err = link
            .recv_frame_timeout(Duration::from_millis(50), None)
            .unwrap_err();
        assert!(matches!(err, LinkError::Timeout(d) if d == Duration::from_millis(50)));
    }

    #[test]
    fn remote_close_is_reported() {
        let (link, remote) = link_pair();
        drop(remote);

        assert_eq!(
            link.recv_timeout(Duration::from_secs(2)).unwrap(),
            LinkEvent::Closed("end of stream".to_string())
        );
        assert!(matches!(
            link.recv_timeout(Duration::from_secs(2)),
            Err(LinkError::Disconnected(_))
        ));
        let err = link
            .recv_frame_timeout(Duration::from_millis(50), None)
            .unwrap_err();
        assert!(matches!(err, LinkError::Disconnected(_)));
    }

    #[test]
    fn dropped_link_releases_reader_after_timeout() {
        let (link, mut remote) = link_pair();
        remote
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        drop(link);

        // Both local handles are gone once the detached pump has exited.
        let mut buf = [0u8; 1];
        assert_eq!(remote.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn oversized_send_is_rejected() {
        let (local, _remote) = UnixStream::pair().unwrap();
        local
            .set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();
        let reader = local.try_clone().unwrap();
        let config = LinkConfig {
            max_payload_size: 4,
            ..LinkConfig::default()
        };
        let mut link = Link::spawn(reader, local, config).unwrap();

        let err = link.send(1, b"too long").unwrap_err();
        assert!(matches!(
            err,
            LinkError::Frame(FrameError::PayloadTooLarge { size: 8, max: 4 })
        ));
        assert_eq!(link.writer().config().max_payload_size, 4);
    }
}
