//! Byte-stuffed, CRC-protected packet framing over serial links.
//!
//! # Crate Structure
//!
//! - [`frame`]: wire format, encoder and the resynchronizing stream decoder
//! - [`transport`]: raw-mode serial device access (unix)
//! - [`link`]: background pump thread with a frame/noise event channel
//!   (behind the `link` feature)

/// Re-export frame types.
pub mod frame {
    pub use uartframe_frame::*;
}

/// Re-export transport types.
pub mod transport {
    pub use uartframe_transport::*;
}

/// Re-export link types (requires `link` feature).
#[cfg(feature = "link")]
pub mod link {
    pub use uartframe_link::*;
}
