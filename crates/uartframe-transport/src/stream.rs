use std::fs::File;
use std::io::{self, ErrorKind, Read, Write};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::Result;
use crate::serial::{drain, wait_readable};

/// An open, raw-mode serial device. Implements `Read + Write`.
///
/// When a read timeout is set, a read that sees no data within the timeout
/// fails with [`ErrorKind::TimedOut`]. `Ok(0)` always means the device hung
/// up. Timeouts are shared with every clone made by [`try_clone`](Self::try_clone).
pub struct SerialStream {
    file: File,
    path: PathBuf,
    read_timeout: SharedTimeout,
    write_timeout: SharedTimeout,
}

/// Timeout slot shared between a stream and its clones, in nanoseconds.
/// Zero stands for `None`.
#[derive(Clone, Default)]
struct SharedTimeout(Arc<AtomicU64>);

impl SharedTimeout {
    fn new(timeout: Option<Duration>) -> Self {
        let slot = Self::default();
        slot.set(timeout);
        slot
    }

    fn get(&self) -> Option<Duration> {
        match self.0.load(Ordering::Acquire) {
            0 => None,
            nanos => Some(Duration::from_nanos(nanos)),
        }
    }

    fn set(&self, timeout: Option<Duration>) {
        let nanos = timeout.map_or(0, |t| u64::try_from(t.as_nanos()).unwrap_or(u64::MAX).max(1));
        self.0.store(nanos, Ordering::Release);
    }
}

impl SerialStream {
    pub(crate) fn new(file: File, path: PathBuf, read_timeout: Option<Duration>) -> Self {
        Self {
            file,
            path,
            read_timeout: SharedTimeout::new(read_timeout),
            write_timeout: SharedTimeout::default(),
        }
    }

    /// Device path this stream was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Change the read timeout for this stream and all of its clones.
    /// `Some(Duration::ZERO)` is rejected.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        reject_zero(timeout)?;
        self.read_timeout.set(timeout);
        debug!(path = ?self.path, ?timeout, "serial read timeout updated");
        Ok(())
    }

    /// Record a write timeout. `Some(Duration::ZERO)` is rejected.
    ///
    /// Serial writes block until the kernel has queued the bytes; the value
    /// is kept for callers that inspect it.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        reject_zero(timeout)?;
        self.write_timeout.set(timeout);
        Ok(())
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout.get()
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout.get()
    }

    /// Try to clone this stream (creates a new file descriptor).
    ///
    /// Only one handle should read at a time: once `poll` reports data, the
    /// read blocks until a byte arrives, so a competing reader can stall it.
    pub fn try_clone(&self) -> Result<Self> {
        let file = self.file.try_clone()?;
        Ok(Self {
            file,
            path: self.path.clone(),
            read_timeout: self.read_timeout.clone(),
            write_timeout: self.write_timeout.clone(),
        })
    }
}

fn reject_zero(timeout: Option<Duration>) -> io::Result<()> {
    if timeout == Some(Duration::ZERO) {
        return Err(io::Error::new(
            ErrorKind::InvalidInput,
            "cannot set a zero duration timeout",
        ));
    }
    Ok(())
}

impl Read for SerialStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if let Some(timeout) = self.read_timeout.get() {
            if !wait_readable(self.file.as_raw_fd(), timeout)? {
                return Err(io::Error::new(
                    ErrorKind::TimedOut,
                    format!("no data within {timeout:?}"),
                ));
            }
        }
        self.file.read(buf)
    }
}

impl Write for SerialStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    /// Wait until the UART has shifted out everything written so far.
    fn flush(&mut self) -> io::Result<()> {
        drain(self.file.as_raw_fd())
    }
}

impl std::fmt::Debug for SerialStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialStream")
            .field("path", &self.path)
            .field("read_timeout", &self.read_timeout.get())
            .finish()
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::serial::tests::pty_pair;
    use crate::serial::{SerialConfig, SerialPort};

    #[test]
    fn test_zero_timeouts_rejected() {
        let (_master, slave_path) = pty_pair();
        let port = SerialPort::open(&slave_path, &SerialConfig::default()).unwrap();

        let err = port.set_read_timeout(Some(Duration::ZERO)).unwrap_err();
        assert!(matches!(err, TransportError::Io(ref e) if e.kind() == ErrorKind::InvalidInput));
        assert!(port.set_write_timeout(Some(Duration::ZERO)).is_err());
        assert_eq!(port.read_timeout(), Some(SerialConfig::DEFAULT_READ_TIMEOUT));
    }

    #[test]
    fn test_blocking_read_returns_data() {
        let (mut master, slave_path) = pty_pair();
        let config = SerialConfig {
            read_timeout: None,
            ..SerialConfig::default()
        };
        let mut port = SerialPort::open(&slave_path, &config).unwrap();
        assert_eq!(port.read_timeout(), None);

        let writer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            master.write_all(b"late").unwrap();
            master
        });

        let mut buf = [0u8; 4];
        port.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"late");
        drop(writer.join().unwrap());
    }

    #[test]
    fn test_clone_shares_device() {
        let (mut master, slave_path) = pty_pair();
        let port = SerialPort::open(&slave_path, &SerialConfig::default()).unwrap();
        port.set_write_timeout(Some(Duration::from_secs(1))).unwrap();

        let mut reader = port.try_clone().unwrap();
        let mut writer = port;
        assert_eq!(reader.path(), writer.path());
        assert_eq!(reader.write_timeout(), Some(Duration::from_secs(1)));

        writer.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        master.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        master.write_all(b"pong").unwrap();
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[test]
    fn test_read_timeout_can_be_changed() {
        let (_master, slave_path) = pty_pair();
        let mut port = SerialPort::open(&slave_path, &SerialConfig::default()).unwrap();
        port.set_read_timeout(Some(Duration::from_millis(20))).unwrap();

        let started = std::time::Instant::now();
        let err = port.read(&mut [0u8; 1]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_read_timeout_is_shared_with_clones() {
        let (_master, slave_path) = pty_pair();
        let config = SerialConfig {
            read_timeout: None,
            ..SerialConfig::default()
        };
        let mut port = SerialPort::open(&slave_path, &config).unwrap();
        let clone = port.try_clone().unwrap();

        clone.set_read_timeout(Some(Duration::from_millis(50))).unwrap();
        assert_eq!(port.read_timeout(), Some(Duration::from_millis(50)));

        let err = port.read(&mut [0u8; 4]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimedOut);
    }

    #[test]
    fn test_hangup_is_end_of_file_with_timeout_set() {
        let (master, slave_path) = pty_pair();
        let mut port = SerialPort::open(&slave_path, &SerialConfig::default()).unwrap();
        assert!(port.read_timeout().is_some());
        drop(master);

        let started = std::time::Instant::now();
        let mut buf = [0u8; 8];
        assert_eq!(port.read(&mut buf).unwrap(), 0);
        assert_eq!(port.read(&mut buf).unwrap(), 0);
        assert!(started.elapsed() < SerialConfig::DEFAULT_READ_TIMEOUT);
    }

    #[test]
    fn test_flush_drains_output() {
        let (mut master, slave_path) = pty_pair();
        let mut port = SerialPort::open(&slave_path, &SerialConfig::default()).unwrap();

        port.write_all(&[0x7E, 0x00, 0x7D]).unwrap();
        port.flush().unwrap();

        let mut buf = [0u8; 3];
        master.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [0x7E, 0x00, 0x7D]);
    }
}
