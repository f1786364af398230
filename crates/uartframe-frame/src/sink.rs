//! Ready-made [`FrameSink`] implementations.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};

use crate::codec::Frame;
use crate::decoder::{FrameDecoder, FrameSink, NoiseReason};

/// One decoder output, in stream order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeEvent {
    Frame(Frame),
    Noise(NoiseReason),
}

impl DecodeEvent {
    /// The frame, if this event carries one.
    pub fn into_frame(self) -> Option<Frame> {
        match self {
            DecodeEvent::Frame(frame) => Some(frame),
            DecodeEvent::Noise(_) => None,
        }
    }
}

impl FrameSink for Vec<DecodeEvent> {
    fn on_frame(&mut self, frame: Frame) {
        self.push(DecodeEvent::Frame(frame));
    }

    fn on_noise(&mut self, reason: NoiseReason) {
        self.push(DecodeEvent::Noise(reason));
    }
}

impl FrameSink for VecDeque<DecodeEvent> {
    fn on_frame(&mut self, frame: Frame) {
        self.push_back(DecodeEvent::Frame(frame));
    }

    fn on_noise(&mut self, reason: NoiseReason) {
        self.push_back(DecodeEvent::Noise(reason));
    }
}

/// Forwards frames and noise to two `mpsc` channels.
///
/// This is the hand-off point when frames are consumed on another thread.
/// Sends to a dropped receiver are ignored.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    frames: Sender<Frame>,
    noise: Option<Sender<NoiseReason>>,
}

impl ChannelSink {
    /// Forward frames to `frames` and noise to `noise`.
    pub fn new(frames: Sender<Frame>, noise: Sender<NoiseReason>) -> Self {
        Self {
            frames,
            noise: Some(noise),
        }
    }

    /// Forward frames only; noise is dropped.
    pub fn frames_only(frames: Sender<Frame>) -> Self {
        Self {
            frames,
            noise: None,
        }
    }

    /// Create a sink together with its two receivers.
    pub fn channel() -> (Self, Receiver<Frame>, Receiver<NoiseReason>) {
        let (frame_tx, frame_rx) = mpsc::channel();
        let (noise_tx, noise_rx) = mpsc::channel();
        (Self::new(frame_tx, noise_tx), frame_rx, noise_rx)
    }
}

impl FrameSink for ChannelSink {
    fn on_frame(&mut self, frame: Frame) {
        let _ = self.frames.send(frame);
    }

    fn on_noise(&mut self, reason: NoiseReason) {
        if let Some(noise) = &self.noise {
            let _ = noise.send(reason);
        }
    }
}

/// Decode a complete capture with a fresh decoder.
///
/// A trailing partial frame produces no event.
pub fn decode_all(bytes: &[u8]) -> Vec<DecodeEvent> {
    let mut events = Vec::new();
    FrameDecoder::new().feed(bytes, &mut events);
    events
}
