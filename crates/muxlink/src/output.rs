use std::io::IsTerminal;

use clap::ValueEnum;
use muxlink_cmux::CmuxFrame;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    dlci: u8,
    frame_type: &'a str,
    cr: bool,
    poll_final: bool,
    fcs_ok: bool,
    payload_size: usize,
    payload_hex: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    ppp: Vec<PppOutput>,
}

#[derive(Serialize)]
pub struct PppOutput {
    pub protocol: u16,
    pub protocol_name: String,
    pub fcs_ok: bool,
    pub detail: String,
}

pub fn frame_type_name(frame: &CmuxFrame) -> &'static str {
    match frame.frame_type {
        muxlink_cmux::FrameType::Sabm => "SABM",
        muxlink_cmux::FrameType::Ua => "UA",
        muxlink_cmux::FrameType::Dm => "DM",
        muxlink_cmux::FrameType::Uih => "UIH",
    }
}

pub fn print_frame(frame: &CmuxFrame, ppp: Vec<PppOutput>, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                dlci: frame.dlci,
                frame_type: frame_type_name(frame),
                cr: frame.cr,
                poll_final: frame.poll_final,
                fcs_ok: frame.fcs_ok,
                payload_size: frame.payload.len(),
                payload_hex: hex_string(&frame.payload),
                ppp,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Pretty => {
            println!(
                "{} dlci={} cr={} pf={} fcs_ok={} payload[{}]={}",
                frame_type_name(frame),
                frame.dlci,
                frame.cr,
                frame.poll_final,
                frame.fcs_ok,
                frame.payload.len(),
                hex_string(&frame.payload),
            );
            for entry in ppp {
                println!(
                    "  ppp {:#06x} ({}) fcs_ok={} {}",
                    entry.protocol, entry.protocol_name, entry.fcs_ok, entry.detail
                );
            }
        }
    }
}

pub fn hex_string(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join("")
}

/// Parse a hex dump, tolerating whitespace and `0x` prefixes.
pub fn parse_hex(text: &str) -> Option<Vec<u8>> {
    let cleaned: String = text
        .split_whitespace()
        .map(|tok| tok.trim_start_matches("0x"))
        .collect();
    if cleaned.len() % 2 != 0 {
        return None;
    }
    (0..cleaned.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&cleaned[i..i + 2], 16).ok())
        .collect()
}
