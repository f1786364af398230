//! Decode a raw byte capture and print every frame and noise event.
//!
//! Run with:
//!   cargo run --example decode-capture -- capture.bin
//!
//! Without an argument a small built-in capture is decoded, which includes
//! a corrupted frame between two good ones.

use std::fs::File;
use std::io::{Cursor, Read};

use uartframe::frame::{encode, DecodeEvent, FrameError, FrameReader};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let input: Box<dyn Read> = match std::env::args().nth(1) {
        Some(path) => Box::new(File::open(path)?),
        None => Box::new(Cursor::new(sample_capture()?)),
    };

    let mut reader = FrameReader::new(input);
    loop {
        match reader.read_event() {
            Ok(DecodeEvent::Frame(frame)) => println!(
                "frame opcode={:#06x} payload={:?}",
                frame.opcode(),
                String::from_utf8_lossy(frame.payload())
            ),
            Ok(DecodeEvent::Noise(reason)) => println!("noise: {reason}"),
            Err(FrameError::ConnectionClosed) => break,
            Err(err) => return Err(err.into()),
        }
    }

    let stats = reader.stats();
    eprintln!(
        "{} bytes, {} frames, {} noise events",
        stats.bytes_fed,
        stats.frames,
        stats.noise_total()
    );
    Ok(())
}

fn sample_capture() -> Result<Vec<u8>, FrameError> {
    let mut capture = encode(0x0010, b"temperature=21.5")?;
    let mut damaged = encode(0x0011, b"humidity=40")?;
    damaged[6] ^= 0x04;
    capture.extend(damaged);
    capture.extend(encode(0x0012, b"pressure=1013")?);
    Ok(capture)
}
