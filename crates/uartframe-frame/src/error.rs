/// Errors surfaced by frame encoding and frame I/O.
///
/// Malformed input on the receive side is never an error: the decoder reports
/// it as a [`NoiseReason`](crate::NoiseReason) and resynchronizes.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload does not fit the length field (or the configured maximum).
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The byte stream ended.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
