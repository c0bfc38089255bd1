use std::net::TcpListener;

use tracing::info;

use crate::cmd::ListenArgs;
use crate::exit::{io_error, CliResult};
use crate::link::{build_emulator, pump};

pub fn run(args: ListenArgs) -> CliResult<i32> {
    let emulator = build_emulator(args.chat_script.as_deref(), args.no_ipv6)?;

    let listener =
        TcpListener::bind(&args.addr).map_err(|err| io_error("bind failed", err))?;
    info!(addr = %args.addr, "waiting for device");

    let (stream, peer) = listener
        .accept()
        .map_err(|err| io_error("accept failed", err))?;
    info!(%peer, "device connected");

    pump(stream, emulator, args.poll_ms)
}
