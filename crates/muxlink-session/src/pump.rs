//! The cooperative read loop binding an emulator to a byte stream.
//!
//! One logical thread of control per device connection: a bounded
//! blocking read, a synchronous reaction, a timer tick. The stream must
//! be configured with a read timeout (or be non-blocking) so that
//! `WouldBlock`/`TimedOut` reads double as the timer heartbeat; there
//! is no unbounded blocking call anywhere in the loop.

use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tracing::{debug, trace};

use crate::emulator::Emulator;
use crate::error::{Result, SessionError};

const READ_CHUNK_SIZE: usize = 2048;

/// Pump `stream` through `emulator` until EOF, an I/O error, or
/// `running` is cleared.
///
/// Returns `Ok(())` on a clean peer close and on a requested stop.
pub fn run_link<S: Read + Write>(
    stream: &mut S,
    emulator: &mut Emulator,
    running: &AtomicBool,
) -> Result<()> {
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    while running.load(Ordering::Relaxed) {
        let now = Instant::now();

        match stream.read(&mut chunk) {
            Ok(0) => {
                debug!("peer closed the link");
                return Ok(());
            }
            Ok(n) => {
                trace!(bytes = n, "link read");
                let out = emulator.advance(&chunk[..n], now)?;
                write_all(stream, &out)?;
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err)
                if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
            {
                // Quiet interval; fall through to the timer tick.
            }
            Err(err) => return Err(SessionError::Io(err)),
        }

        let out = emulator.tick(Instant::now())?;
        write_all(stream, &out)?;

        for event in emulator.take_events() {
            debug!(?event, "session event");
        }
    }
    Ok(())
}

fn write_all<W: Write>(stream: &mut W, mut data: &[u8]) -> Result<()> {
    while !data.is_empty() {
        match stream.write(data) {
            Ok(0) => return Err(SessionError::LinkClosed),
            Ok(n) => data = &data[n..],
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
            Err(err) => return Err(SessionError::Io(err)),
        }
    }
    match stream.flush() {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(()),
        Err(err) => Err(SessionError::Io(err)),
    }
}
