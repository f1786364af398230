//! Serial device transport.
//!
//! Opens a tty, switches it to raw 8N1 mode at the requested baud rate and
//! hands back a [`SerialStream`] implementing `Read + Write`.
//!
//! This is the lowest layer of uartframe. The framing and link crates build
//! on top of the stream provided here.

pub mod error;

#[cfg(unix)]
pub mod serial;
#[cfg(unix)]
pub mod stream;

pub use error::{Result, TransportError};

#[cfg(unix)]
pub use serial::{baud_to_speed, SerialConfig, SerialPort};
#[cfg(unix)]
pub use stream::SerialStream;
