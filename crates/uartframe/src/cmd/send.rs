use std::time::Duration;

use uartframe_link::{open, LinkConfig};
use uartframe_transport::SerialConfig;

use crate::cmd::SendArgs;
use crate::exit::{link_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let payload = args.payload.resolve()?;

    let serial = SerialConfig::with_baud_rate(args.device.baud);
    let mut link = open(&args.device.device, &serial, LinkConfig::default())
        .map_err(|err| link_error("open failed", err))?;

    link.send(args.opcode, &payload)
        .map_err(|err| link_error("send failed", err))?;

    if args.wait {
        let frame = link
            .recv_frame_timeout(wait_timeout, args.reply_opcode)
            .map_err(|err| link_error("receive failed", err))?;
        print_frame(&frame, format);
    }

    link.shutdown()
        .map_err(|err| link_error("shutdown failed", err))?;
    Ok(SUCCESS)
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(match unit {
        "ms" => Duration::from_millis(value),
        _ => Duration::from_secs(value),
    })
}
