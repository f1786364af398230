/// Errors that can occur in link operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] uartframe_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] uartframe_frame::FrameError),

    /// Waiting for an event timed out.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The pump thread stopped or the device went away.
    #[error("link disconnected: {0}")]
    Disconnected(String),
}

pub type Result<T> = std::result::Result<T, LinkError>;
