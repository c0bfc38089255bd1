use std::net::TcpStream;

use tracing::info;

use crate::cmd::AttachArgs;
use crate::exit::{io_error, CliResult};
use crate::link::{build_emulator, pump};

pub fn run(args: AttachArgs) -> CliResult<i32> {
    let emulator = build_emulator(args.chat_script.as_deref(), args.no_ipv6)?;

    info!(endpoint = %args.endpoint, "connecting");
    let stream = TcpStream::connect(&args.endpoint)
        .map_err(|err| io_error("connect failed", err))?;

    pump(stream, emulator, args.poll_ms)
}
