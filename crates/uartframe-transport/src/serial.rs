use std::fs::OpenOptions;
use std::io;
use std::mem::MaybeUninit;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::SerialStream;

/// Line settings applied when a device is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Line speed in bits per second. See [`baud_to_speed`] for accepted values.
    pub baud_rate: u32,
    /// How long a read waits for the first byte before reporting `TimedOut`.
    /// `None` blocks until data arrives.
    pub read_timeout: Option<Duration>,
}

impl SerialConfig {
    pub const DEFAULT_BAUD_RATE: u32 = 115_200;
    pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

    /// Default settings at a different baud rate.
    pub fn with_baud_rate(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            ..Self::default()
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: Self::DEFAULT_BAUD_RATE,
            read_timeout: Some(Self::DEFAULT_READ_TIMEOUT),
        }
    }
}

/// Map a numeric baud rate onto its termios speed constant.
pub fn baud_to_speed(baud: u32) -> Option<libc::speed_t> {
    let speed = match baud {
        1200 => libc::B1200,
        2400 => libc::B2400,
        4800 => libc::B4800,
        9600 => libc::B9600,
        19_200 => libc::B19200,
        38_400 => libc::B38400,
        57_600 => libc::B57600,
        115_200 => libc::B115200,
        230_400 => libc::B230400,
        #[cfg(target_os = "linux")]
        460_800 => libc::B460800,
        #[cfg(target_os = "linux")]
        921_600 => libc::B921600,
        _ => return None,
    };
    Some(speed)
}

/// Serial device opener.
pub struct SerialPort;

impl SerialPort {
    /// Open `path` read/write and switch it to raw 8N1 mode.
    ///
    /// The device is opened non-blocking so a missing carrier cannot stall the
    /// open itself; once `CLOCAL` is set the descriptor is switched back to
    /// blocking mode and reads are bounded by `config.read_timeout` instead.
    /// A read on a device that hung up returns `Ok(0)` even with a timeout set.
    /// Input queued before the open is discarded.
    pub fn open(path: impl AsRef<Path>, config: &SerialConfig) -> Result<SerialStream> {
        let path = path.as_ref();
        let speed = baud_to_speed(config.baud_rate)
            .ok_or(TransportError::UnsupportedBaudRate(config.baud_rate))?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(path)
            .map_err(|source| TransportError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        configure_raw(file.as_raw_fd(), speed).map_err(|source| {
            TransportError::Configure {
                path: path.to_path_buf(),
                source,
            }
        })?;

        info!(?path, baud = config.baud_rate, "opened serial port");

        Ok(SerialStream::new(
            file,
            path.to_path_buf(),
            config.read_timeout,
        ))
    }
}

fn configure_raw(fd: RawFd, speed: libc::speed_t) -> io::Result<()> {
    let mut tio = get_termios(fd)?;

    // SAFETY: `tio` is a fully initialized termios obtained from tcgetattr.
    unsafe { libc::cfmakeraw(&mut tio) };
    tio.c_cflag |= libc::CLOCAL | libc::CREAD;
    tio.c_cflag &= !libc::CSTOPB;
    // Reads block for at least one byte; timeouts are enforced with poll(2)
    // so a zero-byte read always means hangup.
    tio.c_cc[libc::VMIN] = 1;
    tio.c_cc[libc::VTIME] = 0;

    // SAFETY: as above; `speed` is one of the B* constants.
    cvt(unsafe { libc::cfsetispeed(&mut tio, speed) })?;
    cvt(unsafe { libc::cfsetospeed(&mut tio, speed) })?;

    set_termios(fd, &tio)?;

    // SAFETY: `fd` is an open descriptor owned by the caller.
    cvt(unsafe { libc::tcflush(fd, libc::TCIOFLUSH) })?;
    let flags = cvt(unsafe { libc::fcntl(fd, libc::F_GETFL) })?;
    cvt(unsafe { libc::fcntl(fd, libc::F_SETFL, flags & !libc::O_NONBLOCK) })?;

    debug!(fd, speed, "configured raw mode");
    Ok(())
}

/// Wait up to `timeout` for `fd` to become readable.
///
/// Returns `false` when the timeout expired. Hangup and error conditions
/// count as readable so the following read can report them.
pub(crate) fn wait_readable(fd: RawFd, timeout: Duration) -> io::Result<bool> {
    let millis = timeout.as_nanos().div_ceil(1_000_000);
    let millis = libc::c_int::try_from(millis).unwrap_or(libc::c_int::MAX);
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    // SAFETY: `pfd` is a single valid pollfd for the duration of the call.
    let ready = cvt(unsafe { libc::poll(&mut pfd, 1, millis) })?;
    Ok(ready > 0)
}

/// Block until everything written to `fd` has been transmitted.
pub(crate) fn drain(fd: RawFd) -> io::Result<()> {
    // SAFETY: `fd` is an open terminal descriptor.
    cvt(unsafe { libc::tcdrain(fd) })?;
    Ok(())
}

fn get_termios(fd: RawFd) -> io::Result<libc::termios> {
    let mut tio = MaybeUninit::<libc::termios>::uninit();
    // SAFETY: tcgetattr fully initializes `tio` when it returns 0.
    cvt(unsafe { libc::tcgetattr(fd, tio.as_mut_ptr()) })?;
    Ok(unsafe { tio.assume_init() })
}

fn set_termios(fd: RawFd, tio: &libc::termios) -> io::Result<()> {
    // SAFETY: `tio` points to a valid termios for the duration of the call.
    cvt(unsafe { libc::tcsetattr(fd, libc::TCSANOW, tio) })?;
    Ok(())
}

fn cvt(rc: libc::c_int) -> io::Result<libc::c_int> {
    if rc == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::ffi::CStr;
    use std::fs::File;
    use std::io::{ErrorKind, Read, Write};
    use std::os::fd::FromRawFd;
    use std::path::PathBuf;

    /// Allocate a pseudo-terminal; returns the master side and the slave path.
    #[cfg(target_os = "linux")]
    pub(crate) fn pty_pair() -> (File, PathBuf) {
        // SAFETY: plain libc calls on a descriptor this function owns.
        unsafe {
            let fd = libc::posix_openpt(libc::O_RDWR | libc::O_NOCTTY);
            assert!(fd >= 0, "posix_openpt: {}", io::Error::last_os_error());
            assert_eq!(libc::grantpt(fd), 0);
            assert_eq!(libc::unlockpt(fd), 0);

            let mut name = [0 as libc::c_char; 128];
            assert_eq!(libc::ptsname_r(fd, name.as_mut_ptr(), name.len()), 0);
            let path = PathBuf::from(CStr::from_ptr(name.as_ptr()).to_string_lossy().into_owned());

            (File::from_raw_fd(fd), path)
        }
    }

    #[test]
    fn test_baud_to_speed() {
        assert_eq!(baud_to_speed(9600), Some(libc::B9600));
        assert_eq!(baud_to_speed(115_200), Some(libc::B115200));
        assert_eq!(baud_to_speed(0), None);
        assert_eq!(baud_to_speed(12_345), None);
    }

    #[test]
    fn test_default_config() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.read_timeout, Some(Duration::from_millis(100)));
        assert_eq!(SerialConfig::with_baud_rate(9600).baud_rate, 9600);
    }

    #[test]
    fn test_unsupported_baud_rate_rejected_before_open() {
        let result = SerialPort::open("/dev/uartframe-does-not-exist", &SerialConfig::with_baud_rate(12_345));
        assert!(matches!(result, Err(TransportError::UnsupportedBaudRate(12_345))));
    }

    #[test]
    fn test_missing_device_is_open_error() {
        let result = SerialPort::open("/dev/uartframe-does-not-exist", &SerialConfig::default());
        assert!(matches!(result, Err(TransportError::Open { .. })));
    }

    #[test]
    fn test_regular_file_is_configure_error() {
        let path = std::env::temp_dir().join(format!("uartframe-notty-{}", std::process::id()));
        std::fs::write(&path, b"not a tty").unwrap();

        let result = SerialPort::open(&path, &SerialConfig::default());
        match result {
            Err(TransportError::Configure { path: reported, source }) => {
                assert_eq!(reported, path);
                assert_eq!(source.raw_os_error(), Some(libc::ENOTTY));
            }
            other => panic!("expected configure error, got {other:?}"),
        }

        let _ = std::fs::remove_file(&path);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_pty_roundtrip_in_raw_mode() {
        let (mut master, slave_path) = pty_pair();
        let mut port = SerialPort::open(&slave_path, &SerialConfig::default()).unwrap();
        assert_eq!(port.path(), slave_path.as_path());

        // Raw mode: no echo, no newline translation, control bytes pass through.
        master.write_all(b"\x7e\x7d\n\x03\x00").unwrap();
        let mut buf = [0u8; 5];
        port.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"\x7e\x7d\n\x03\x00");

        port.write_all(b"a\nb").unwrap();
        let mut out = [0u8; 3];
        master.read_exact(&mut out).unwrap();
        assert_eq!(&out, b"a\nb");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_idle_read_times_out() {
        let (_master, slave_path) = pty_pair();
        let mut port = SerialPort::open(&slave_path, &SerialConfig::default()).unwrap();

        let mut buf = [0u8; 8];
        let err = port.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimedOut);
    }
}
