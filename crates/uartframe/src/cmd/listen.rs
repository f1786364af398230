use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use uartframe_link::{open, LinkConfig, LinkError, LinkEvent};
use uartframe_transport::SerialConfig;

use crate::cmd::ListenArgs;
use crate::exit::{link_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{print_frame, print_noise, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let serial = SerialConfig::with_baud_rate(args.device.baud);
    let link = open(&args.device.device, &serial, LinkConfig::default())
        .map_err(|err| link_error("open failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        let event = match link.recv_timeout(POLL_INTERVAL) {
            Ok(event) => event,
            Err(LinkError::Timeout(_)) => continue,
            Err(err) => return Err(link_error("receive failed", err)),
        };

        match event {
            LinkEvent::Frame(frame) => {
                if let Some(opcodes) = &args.opcodes {
                    if !opcodes.contains(&frame.opcode()) {
                        continue;
                    }
                }

                print_frame(&frame, format);
                printed = printed.saturating_add(1);

                if args.count.is_some_and(|count| printed >= count) {
                    break;
                }
            }
            LinkEvent::Noise(reason) => {
                if !args.quiet_noise {
                    print_noise(reason, format);
                }
            }
            LinkEvent::Closed(reason) => {
                return Err(CliError::new(FAILURE, format!("device closed: {reason}")));
            }
        }
    }

    let stats = link
        .shutdown()
        .map_err(|err| link_error("shutdown failed", err))?;
    info!(
        frames = stats.frames,
        noise = stats.noise_total(),
        "listener stopped"
    );
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
