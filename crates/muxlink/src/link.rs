//! Shared TCP-serial plumbing for the attach/listen commands.
//!
//! The device under test exposes its UART as a TCP socket (QEMU's
//! `-serial tcp::PORT,server`); either side may be the connecting one.

use std::net::TcpStream;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use muxlink_session::{run_link, ChatScript, Emulator, SessionConfig};
use tracing::info;

use crate::exit::{io_error, session_error, CliError, CliResult, INTERNAL, SUCCESS};

/// Build an emulator from the CLI's script/negotiation flags.
pub fn build_emulator(chat_script: Option<&Path>, no_ipv6: bool) -> CliResult<Emulator> {
    let script = match chat_script {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|err| io_error("reading chat script", err))?;
            ChatScript::from_json(&text)
                .map_err(|err| session_error("parsing chat script", err))?
        }
        None => ChatScript::quectel_bringup(),
    };

    let mut config = SessionConfig::default();
    config.negotiation.enable_ipv6cp = !no_ipv6;
    Ok(Emulator::new(config, script))
}

/// Pump one connected stream until it closes or Ctrl-C.
pub fn pump(mut stream: TcpStream, mut emulator: Emulator, poll_ms: u64) -> CliResult<i32> {
    stream
        .set_read_timeout(Some(Duration::from_millis(poll_ms.max(1))))
        .map_err(|err| io_error("setting read timeout", err))?;
    stream
        .set_nodelay(true)
        .map_err(|err| io_error("setting nodelay", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    info!("link up");
    run_link(&mut stream, &mut emulator, &running)
        .map_err(|err| session_error("link pump", err))?;
    info!("link down");
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
