use std::fs::File;
use std::io::{self, Cursor, Read};

use tracing::debug;
use uartframe_frame::{DecodeEvent, DecoderStats, FrameConfig, FrameError, FrameReader};

use crate::cmd::{parse_hex, DecodeArgs};
use crate::exit::{frame_error, io_error, CliResult, SUCCESS};
use crate::output::{events_table, print_event, print_stats, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let input: Box<dyn Read> = match &args.file {
        Some(path) => Box::new(
            File::open(path)
                .map_err(|err| io_error(&format!("failed opening {}", path.display()), err))?,
        ),
        None => Box::new(io::stdin().lock()),
    };

    let input: Box<dyn Read> = if args.hex {
        let mut text = String::new();
        let mut input = input;
        input
            .read_to_string(&mut text)
            .map_err(|err| io_error("failed reading hex input", err))?;
        Box::new(Cursor::new(parse_hex(&text)?))
    } else {
        input
    };

    let config = FrameConfig {
        max_payload_size: args.max_payload.unwrap_or(FrameConfig::default().max_payload_size),
        ..FrameConfig::default()
    };
    let mut reader = FrameReader::with_config(input, config);

    // A table is rendered once the whole capture has been read; other
    // formats stream one line per event.
    let mut table_rows = Vec::new();
    let stats = drain(&mut reader, |event| {
        if format == OutputFormat::Table {
            table_rows.push(event);
        } else {
            print_event(&event, format);
        }
    })?;

    if format == OutputFormat::Table {
        println!("{}", events_table(&table_rows));
    }
    print_stats(&stats, format);
    Ok(SUCCESS)
}

fn drain<R: Read>(
    reader: &mut FrameReader<R>,
    mut on_event: impl FnMut(DecodeEvent),
) -> CliResult<DecoderStats> {
    loop {
        match reader.read_event() {
            Ok(event) => on_event(event),
            Err(FrameError::ConnectionClosed) => {
                debug!("end of capture");
                return Ok(*reader.stats());
            }
            Err(err) => return Err(frame_error("decode failed", err)),
        }
    }
}
