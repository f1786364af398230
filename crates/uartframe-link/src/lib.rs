//! Serial link management.
//!
//! A [`Link`] owns a background pump thread that reads raw bytes from the
//! device, runs them through a [`uartframe_frame::FrameDecoder`] and forwards
//! decoded frames and noise over a channel. Outgoing frames are encoded and
//! written on the caller's thread.

pub mod connector;
pub mod error;
pub mod link;
pub mod pump;

#[cfg(unix)]
pub use connector::open;
pub use error::{LinkError, Result};
pub use link::{Link, LinkConfig, LinkEvent};
