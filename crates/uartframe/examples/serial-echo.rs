//! Echo every frame received on a serial device back to the sender.
//!
//! Run with:
//!   cargo run --example serial-echo -- /dev/ttyUSB0 115200
//!
//! In another terminal (or on the far end of the line):
//!   cargo run --features cli -- send /dev/ttyUSB1 --opcode 0x10 --data hello --wait

#[cfg(unix)]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    use uartframe::link::{open, LinkConfig, LinkEvent};
    use uartframe::transport::SerialConfig;

    let mut args = std::env::args().skip(1);
    let device = args.next().ok_or("usage: serial-echo DEVICE [BAUD]")?;
    let baud = match args.next() {
        Some(baud) => baud.parse()?,
        None => SerialConfig::DEFAULT_BAUD_RATE,
    };

    let mut link = open(&device, &SerialConfig::with_baud_rate(baud), LinkConfig::default())?;
    eprintln!("Echoing frames on {device} at {baud} baud");

    loop {
        match link.recv()? {
            LinkEvent::Frame(frame) => {
                eprintln!(
                    "Received {} bytes with opcode {:#06x}",
                    frame.payload().len(),
                    frame.opcode()
                );
                link.send_frame(&frame)?;
            }
            LinkEvent::Noise(reason) => eprintln!("Discarded noise: {reason}"),
            LinkEvent::Closed(reason) => {
                eprintln!("Device closed: {reason}");
                break;
            }
        }
    }

    Ok(())
}

#[cfg(not(unix))]
fn main() {
    eprintln!("serial-echo requires a unix serial device");
}
