use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use uartframe_frame::{DecodeEvent, DecoderStats, Frame, NoiseReason};

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum EventOutput<'a> {
    Frame {
        opcode: u16,
        payload_size: usize,
        payload_hex: String,
        payload_text: Option<&'a str>,
        timestamp: String,
    },
    Noise {
        reason: &'static str,
        timestamp: String,
    },
}

#[derive(Serialize)]
struct StatsOutput {
    event: &'static str,
    bytes_fed: u64,
    frames: u64,
    noise: u64,
    multiple_start_tokens: u64,
    double_escapes: u64,
    overflows: u64,
    crc_mismatches: u64,
}

#[derive(Serialize)]
struct WireOutput {
    opcode: u16,
    payload_size: usize,
    wire_size: usize,
    wire_hex: String,
}

fn frame_output(frame: &Frame) -> EventOutput<'_> {
    EventOutput::Frame {
        opcode: frame.opcode(),
        payload_size: frame.payload().len(),
        payload_hex: hex::encode(frame.payload()),
        payload_text: std::str::from_utf8(frame.payload()).ok(),
        timestamp: now_unix_seconds(),
    }
}

fn noise_output(reason: NoiseReason) -> EventOutput<'static> {
    EventOutput::Noise {
        reason: reason.as_str(),
        timestamp: now_unix_seconds(),
    }
}

pub fn print_event(event: &DecodeEvent, format: OutputFormat) {
    match event {
        DecodeEvent::Frame(frame) => print_frame(frame, format),
        DecodeEvent::Noise(reason) => print_noise(*reason, format),
    }
}

pub fn print_frame(frame: &Frame, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&frame_output(frame)),
        OutputFormat::Table => {
            println!("{}", events_table(&[DecodeEvent::Frame(frame.clone())]));
        }
        OutputFormat::Pretty => println!("{}", pretty_frame(frame)),
        OutputFormat::Raw => print_raw(frame.payload()),
    }
}

pub fn print_noise(reason: NoiseReason, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&noise_output(reason)),
        OutputFormat::Table => println!("{}", events_table(&[DecodeEvent::Noise(reason)])),
        OutputFormat::Pretty => println!("noise reason={reason}"),
        // Raw output carries payload bytes only.
        OutputFormat::Raw => {}
    }
}

/// One table for a whole batch of decoded events.
pub fn events_table(events: &[DecodeEvent]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["EVENT", "OPCODE", "SIZE", "PAYLOAD"]);

    for event in events {
        match event {
            DecodeEvent::Frame(frame) => table.add_row(vec![
                "frame".to_string(),
                format!("{:#06x}", frame.opcode()),
                frame.payload().len().to_string(),
                payload_preview(frame.payload()),
            ]),
            DecodeEvent::Noise(reason) => table.add_row(vec![
                "noise".to_string(),
                "-".to_string(),
                "-".to_string(),
                reason.to_string(),
            ]),
        };
    }
    table
}

pub fn print_stats(stats: &DecoderStats, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&StatsOutput {
            event: "summary",
            bytes_fed: stats.bytes_fed,
            frames: stats.frames,
            noise: stats.noise_total(),
            multiple_start_tokens: stats.multiple_start_tokens,
            double_escapes: stats.double_escapes,
            overflows: stats.overflows,
            crc_mismatches: stats.crc_mismatches,
        }),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!(
                "bytes={} frames={} noise={} (multiple_start_tokens={} double_escapes={} overflows={} crc_mismatches={})",
                stats.bytes_fed,
                stats.frames,
                stats.noise_total(),
                stats.multiple_start_tokens,
                stats.double_escapes,
                stats.overflows,
                stats.crc_mismatches
            );
        }
        OutputFormat::Raw => {}
    }
}

/// Print an encoded frame.
pub fn print_wire(opcode: u16, payload_size: usize, wire: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&WireOutput {
            opcode,
            payload_size,
            wire_size: wire.len(),
            wire_hex: hex::encode(wire),
        }),
        OutputFormat::Table | OutputFormat::Pretty => println!("{}", spaced_hex(wire)),
        OutputFormat::Raw => print_raw(wire),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn pretty_frame(frame: &Frame) -> String {
    format!(
        "frame opcode={:#06x} size={} payload={}",
        frame.opcode(),
        frame.payload().len(),
        payload_preview(frame.payload())
    )
}

/// Upper-case hex with a space between bytes, the way captures are usually written.
pub fn spaced_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) if !text.chars().any(char::is_control) => text.to_string(),
        _ => hex::encode(payload),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
