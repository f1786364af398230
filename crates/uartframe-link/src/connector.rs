#[cfg(unix)]
use std::path::Path;

#[cfg(unix)]
use uartframe_transport::{SerialConfig, SerialPort, SerialStream};

#[cfg(unix)]
use crate::error::Result;
#[cfg(unix)]
use crate::link::{Link, LinkConfig};

/// Open a serial device and start a link over it.
///
/// The device's read timeout bounds how long [`Link::shutdown`] waits for the
/// pump thread; a `None` timeout is replaced with the default.
#[cfg(unix)]
pub fn open(
    path: impl AsRef<Path>,
    serial_config: &SerialConfig,
    link_config: LinkConfig,
) -> Result<Link<SerialStream>> {
    let serial_config = SerialConfig {
        read_timeout: serial_config
            .read_timeout
            .or(Some(SerialConfig::DEFAULT_READ_TIMEOUT)),
        ..serial_config.clone()
    };

    let stream = SerialPort::open(path, &serial_config)?;
    let reader = stream.try_clone()?;
    Link::spawn(reader, stream, link_config)
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use std::ffi::CStr;
    use std::fs::File;
    use std::io::{Read, Write};
    use std::os::fd::FromRawFd;
    use std::path::PathBuf;
    use std::time::Duration;

    use uartframe_frame::{decode_all, encode, DecodeEvent, Frame};
    use uartframe_transport::TransportError;

    use super::*;
    use crate::error::LinkError;
    use crate::link::LinkEvent;

    fn pty_pair() -> (File, PathBuf) {
        // SAFETY: plain libc calls on a descriptor this function owns.
        unsafe {
            let fd = libc::posix_openpt(libc::O_RDWR | libc::O_NOCTTY);
            assert!(fd >= 0);
            assert_eq!(libc::grantpt(fd), 0);
            assert_eq!(libc::unlockpt(fd), 0);
            let mut name = [0 as libc::c_char; 128];
            assert_eq!(libc::ptsname_r(fd, name.as_mut_ptr(), name.len()), 0);
            let path = PathBuf::from(CStr::from_ptr(name.as_ptr()).to_string_lossy().into_owned());
            (File::from_raw_fd(fd), path)
        }
    }

    #[test]
    fn open_pty_and_exchange_frames() {
        let (mut device, port_path) = pty_pair();
        let serial = SerialConfig {
            read_timeout: None,
            ..SerialConfig::default()
        };
        let mut link = open(&port_path, &serial, LinkConfig::default()).unwrap();

        device.write_all(&encode(0x0101, b"from device").unwrap()).unwrap();
        let frame = link
            .recv_frame_timeout(Duration::from_secs(2), Some(0x0101))
            .unwrap();
        assert_eq!(frame, Frame::new(0x0101, "from device"));

        link.send(0x0202, b"from host").unwrap();
        let expected = encode(0x0202, b"from host").unwrap();
        let mut wire = vec![0u8; expected.len()];
        device.read_exact(&mut wire).unwrap();
        assert_eq!(
            decode_all(&wire),
            vec![DecodeEvent::Frame(Frame::new(0x0202, "from host"))]
        );

        assert!(!matches!(link.try_recv().unwrap(), Some(LinkEvent::Closed(_))));
        link.shutdown().unwrap();
    }

    #[test]
    fn device_hangup_closes_link() {
        let (device, port_path) = pty_pair();
        let link = open(&port_path, &SerialConfig::default(), LinkConfig::default()).unwrap();
        drop(device);

        match link.recv_timeout(Duration::from_secs(2)).unwrap() {
            LinkEvent::Closed(_) => {}
            other => panic!("expected closed link, got {other:?}"),
        }
        assert!(matches!(
            link.recv_timeout(Duration::from_secs(2)),
            Err(LinkError::Disconnected(_))
        ));
        link.shutdown().unwrap();
    }

    #[test]
    fn open_missing_device_fails() {
        let err = open(
            "/dev/uartframe-does-not-exist",
            &SerialConfig::default(),
            LinkConfig::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(
            err,
            LinkError::Transport(TransportError::Open { .. })
        ));
    }
}
