use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod attach;
pub mod decode;
pub mod listen;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect to a TCP serial endpoint and emulate the modem.
    Attach(AttachArgs),
    /// Wait for the device under test to connect, then emulate the modem.
    Listen(ListenArgs),
    /// Decode hex-dumped CMUX (and nested PPP) frames.
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Attach(args) => attach::run(args),
        Command::Listen(args) => listen::run(args),
        Command::Decode(args) => decode::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct AttachArgs {
    /// Endpoint to connect to, e.g. localhost:1235 (a QEMU
    /// `-serial tcp::1235,server` port).
    pub endpoint: String,
    /// Read timeout driving the timer tick, in milliseconds.
    #[arg(long, default_value_t = 100)]
    pub poll_ms: u64,
    /// JSON chat script replacing the built-in dialog.
    #[arg(long, value_name = "FILE")]
    pub chat_script: Option<PathBuf>,
    /// Disable IPv6CP negotiation.
    #[arg(long)]
    pub no_ipv6: bool,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Address to bind, e.g. 127.0.0.1:1235.
    pub addr: String,
    /// Read timeout driving the timer tick, in milliseconds.
    #[arg(long, default_value_t = 100)]
    pub poll_ms: u64,
    /// JSON chat script replacing the built-in dialog.
    #[arg(long, value_name = "FILE")]
    pub chat_script: Option<PathBuf>,
    /// Disable IPv6CP negotiation.
    #[arg(long)]
    pub no_ipv6: bool,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Hex bytes to decode; read from stdin when omitted.
    pub hex: Option<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
