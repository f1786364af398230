//! The read side of a link: device bytes in, [`LinkEvent`]s out.

use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;

use tracing::{debug, trace, warn};
use uartframe_frame::{DecoderStats, Frame, FrameDecoder, FrameSink, NoiseReason};

use crate::link::LinkEvent;

/// Forwards decoder output to the link's event channel.
struct EventForwarder<'a> {
    events: &'a Sender<LinkEvent>,
    receiver_gone: bool,
}

impl EventForwarder<'_> {
    fn forward(&mut self, event: LinkEvent) {
        if !self.receiver_gone && self.events.send(event).is_err() {
            self.receiver_gone = true;
        }
    }
}

impl FrameSink for EventForwarder<'_> {
    fn on_frame(&mut self, frame: Frame) {
        self.forward(LinkEvent::Frame(frame));
    }

    fn on_noise(&mut self, reason: NoiseReason) {
        self.forward(LinkEvent::Noise(reason));
    }
}

/// Pump `reader` until `stop` is set, the stream ends, or nobody listens.
///
/// Read timeouts only re-check `stop`, so a reader without a timeout keeps
/// the pump alive until data arrives or the stream closes. End of stream and
/// hard I/O errors are reported once as [`LinkEvent::Closed`].
pub fn run<R: Read>(
    mut reader: R,
    mut decoder: FrameDecoder,
    chunk_size: usize,
    events: Sender<LinkEvent>,
    stop: &AtomicBool,
) -> DecoderStats {
    let mut chunk = vec![0u8; chunk_size.max(1)];
    let mut forwarder = EventForwarder {
        events: &events,
        receiver_gone: false,
    };

    while !stop.load(Ordering::Acquire) {
        let read = match reader.read(&mut chunk) {
            Ok(0) => {
                debug!("serial stream reached end of file");
                forwarder.forward(LinkEvent::Closed("end of stream".to_string()));
                break;
            }
            Ok(n) => n,
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                continue;
            }
            Err(err) => {
                warn!(error = %err, "serial read failed; stopping pump");
                forwarder.forward(LinkEvent::Closed(err.to_string()));
                break;
            }
        };

        trace!(bytes = read, "pumping chunk");
        decoder.feed(&chunk[..read], &mut forwarder);

        if forwarder.receiver_gone {
            debug!("link receiver dropped; stopping pump");
            break;
        }
    }

    *decoder.stats()
}

#[cfg(test)]
mod tests {
    use std::io::{self, Cursor};
    use std::sync::mpsc;

    use uartframe_frame::encode;

    use super::*;

    #[test]
    fn pump_forwards_frames_noise_and_close() {
        let mut wire = encode(1, b"one").unwrap();
        wire.extend_from_slice(&[0x7E, 0x00, 0x7D, 0x7D]);
        wire.extend(encode(2, b"two").unwrap());

        let (tx, rx) = mpsc::channel();
        let stop = AtomicBool::new(false);
        let stats = run(Cursor::new(wire), FrameDecoder::new(), 4, tx, &stop);

        let events: Vec<_> = rx.iter().collect();
        assert_eq!(
            events,
            vec![
                LinkEvent::Frame(Frame::new(1, "one")),
                LinkEvent::Noise(NoiseReason::DoubleEscape),
                LinkEvent::Frame(Frame::new(2, "two")),
                LinkEvent::Closed("end of stream".to_string()),
            ]
        );
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.double_escapes, 1);
    }

    #[test]
    fn pump_skips_timeouts_and_reports_hard_errors() {
        struct Scripted(Vec<io::Result<Vec<u8>>>);

        impl Read for Scripted {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                match self.0.remove(0) {
                    Ok(bytes) => {
                        buf[..bytes.len()].copy_from_slice(&bytes);
                        Ok(bytes.len())
                    }
                    Err(err) => Err(err),
                }
            }
        }

        let wire = encode(7, b"x").unwrap();
        let reader = Scripted(vec![
            Err(io::Error::from(ErrorKind::TimedOut)),
            Ok(wire[..3].to_vec()),
            Err(io::Error::from(ErrorKind::Interrupted)),
            Ok(wire[3..].to_vec()),
            Err(io::Error::new(ErrorKind::BrokenPipe, "unplugged")),
        ]);

        let (tx, rx) = mpsc::channel();
        let stop = AtomicBool::new(false);
        run(reader, FrameDecoder::new(), 64, tx, &stop);

        let events: Vec<_> = rx.iter().collect();
        assert_eq!(
            events,
            vec![
                LinkEvent::Frame(Frame::new(7, "x")),
                LinkEvent::Closed("unplugged".to_string()),
            ]
        );
    }

    #[test]
    fn pump_stops_when_flag_set() {
        let (tx, rx) = mpsc::channel();
        let stop = AtomicBool::new(true);
        let stats = run(Cursor::new(encode(1, b"never").unwrap()), FrameDecoder::new(), 8, tx, &stop);

        assert!(rx.try_recv().is_err());
        assert_eq!(stats.bytes_fed, 0);
    }

    #[test]
    fn pump_stops_when_receiver_dropped() {
        let mut wire = Vec::new();
        for i in 0..16u16 {
            wire.extend(encode(i, b"payload").unwrap());
        }

        let (tx, rx) = mpsc::channel();
        drop(rx);
        let stop = AtomicBool::new(false);
        let stats = run(Cursor::new(wire), FrameDecoder::new(), 16, tx, &stop);

        assert!(stats.frames < 16);
    }
}
