use uartframe_frame::encode;

use crate::cmd::EncodeArgs;
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{print_wire, OutputFormat};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = args.payload.resolve()?;
    let wire = encode(args.opcode, &payload).map_err(|err| frame_error("encode failed", err))?;
    print_wire(args.opcode, payload.len(), &wire, format);
    Ok(SUCCESS)
}
