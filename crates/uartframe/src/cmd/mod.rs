use clap::{Args, Subcommand};
use std::fs;
use std::path::PathBuf;

use crate::exit::{io_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod envinfo;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Encode one frame and print its wire bytes.
    Encode(EncodeArgs),
    /// Decode a captured byte stream into frames and noise.
    Decode(DecodeArgs),
    /// Print frames arriving on a serial device.
    Listen(ListenArgs),
    /// Send a single frame over a serial device.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
    /// Print build and environment diagnostics.
    Envinfo(EnvinfoArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
        Command::Envinfo(args) => envinfo::run(args, format),
    }
}

/// Where a frame's payload comes from. At most one source may be given;
/// none means an empty payload.
#[derive(Args, Debug, Default)]
pub struct PayloadArgs {
    /// UTF-8 string payload.
    #[arg(long, conflicts_with_all = ["hex", "file"])]
    pub data: Option<String>,
    /// Hex payload, whitespace ignored (e.g. "aa bb 7e").
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub hex: Option<String>,
    /// Read payload bytes from file.
    #[arg(long, conflicts_with_all = ["data", "hex"])]
    pub file: Option<PathBuf>,
}

impl PayloadArgs {
    pub fn resolve(&self) -> CliResult<Vec<u8>> {
        if let Some(data) = &self.data {
            return Ok(data.as_bytes().to_vec());
        }
        if let Some(text) = &self.hex {
            return parse_hex(text);
        }
        if let Some(path) = &self.file {
            return fs::read(path)
                .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
        }
        Ok(Vec::new())
    }
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Frame opcode (decimal or 0x-prefixed hex).
    #[arg(long, short = 'o', value_parser = parse_opcode)]
    pub opcode: u16,
    #[command(flatten)]
    pub payload: PayloadArgs,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Capture file to decode. Default: stdin.
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// Input is hex text rather than raw bytes.
    #[arg(long)]
    pub hex: bool,
    /// Reject frames declaring a longer payload.
    #[arg(long, value_name = "BYTES")]
    pub max_payload: Option<usize>,
}

/// Serial device selection shared by commands that open a port.
#[derive(Args, Debug)]
pub struct DeviceArgs {
    /// Serial device path (e.g. /dev/ttyUSB0).
    #[arg(env = "UARTFRAME_DEVICE")]
    pub device: PathBuf,
    /// Line speed in baud.
    #[arg(long, short = 'b', env = "UARTFRAME_BAUD", default_value_t = 115_200)]
    pub baud: u32,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Only print frames with these opcodes (comma-separated).
    #[arg(long, value_delimiter = ',', value_parser = parse_opcode)]
    pub opcodes: Option<Vec<u16>>,
    /// Exit after receiving N frames.
    #[arg(long)]
    pub count: Option<usize>,
    /// Do not print noise events.
    #[arg(long)]
    pub quiet_noise: bool,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Frame opcode (decimal or 0x-prefixed hex).
    #[arg(long, short = 'o', value_parser = parse_opcode)]
    pub opcode: u16,
    #[command(flatten)]
    pub payload: PayloadArgs,
    /// Wait for one response frame and print it.
    #[arg(long)]
    pub wait: bool,
    /// Only accept a response with this opcode when --wait is set.
    #[arg(long, value_parser = parse_opcode, requires = "wait")]
    pub reply_opcode: Option<u16>,
    /// Maximum time to wait for response when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Args, Debug, Default)]
pub struct EnvinfoArgs {}

pub fn parse_opcode(input: &str) -> Result<u16, String> {
    let input = input.trim();
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(digits) => u16::from_str_radix(digits, 16),
        None => input.parse::<u16>(),
    };
    parsed.map_err(|_| format!("invalid opcode '{input}': expected 0..=65535 or 0x0000..=0xffff"))
}

pub fn parse_hex(text: &str) -> CliResult<Vec<u8>> {
    let digits: String = text.split_whitespace().collect();
    hex::decode(&digits).map_err(|err| CliError::new(USAGE, format!("invalid hex payload: {err}")))
}
