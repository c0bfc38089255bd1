//! The full modem emulation: plain-text AT dialog first, CMUX after.
//!
//! A cellular driver talks to the bare UART until it has configured the
//! modem, then issues `AT+CMUX=...` and switches the byte stream into
//! multiplexed mode. [`Emulator`] mirrors that: it answers the chat
//! script directly on the stream, and on the CMUX command hands every
//! subsequent byte to the [`Session`] orchestrator.

use std::time::Instant;

use bytes::{Bytes, BytesMut};
use tracing::{debug, info};

use crate::chat::{ChatResponder, ChatScript};
use crate::error::Result;
use crate::session::{Session, SessionConfig, SessionEvent};

/// Which layer currently owns the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPhase {
    /// Plain-text AT command mode.
    Command,
    /// Multiplexed mode; the session orchestrator owns the stream.
    Cmux,
}

/// The emulated modem: chat responder plus CMUX session behind it.
pub struct Emulator {
    chat: ChatResponder,
    session: Session,
    phase: LinkPhase,
    // Byte buffer, not a string: the first mux frame can arrive glued to
    // the AT+CMUX line and must survive un-mangled.
    line_buf: Vec<u8>,
}

impl Emulator {
    /// Create an emulator with the given configuration and chat script.
    pub fn new(config: SessionConfig, script: ChatScript) -> Self {
        Self {
            chat: ChatResponder::new(script.clone()),
            session: Session::new(config, script),
            phase: LinkPhase::Command,
            line_buf: Vec::new(),
        }
    }

    /// Emulator with the built-in Quectel bring-up personality.
    pub fn quectel() -> Self {
        Self::new(SessionConfig::default(), ChatScript::quectel_bringup())
    }

    /// Current link phase.
    pub fn phase(&self) -> LinkPhase {
        self.phase
    }

    /// The CMUX session behind the command phase.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Feed raw link bytes; returns the bytes to send back.
    pub fn advance(&mut self, input: &[u8], now: Instant) -> Result<Bytes> {
        match self.phase {
            LinkPhase::Cmux => self.session.advance(input, now),
            LinkPhase::Command => {
                let mut out = BytesMut::new();
                let mut mux_tail: Option<Vec<u8>> = None;

                self.line_buf.extend_from_slice(input);
                while let Some(pos) = self
                    .line_buf
                    .iter()
                    .position(|&b| b == b'\r' || b == b'\n')
                {
                    let line_bytes: Vec<u8> = self.line_buf.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line_bytes);
                    let line = ChatResponder::clean(&line);
                    if line.is_empty() {
                        continue;
                    }
                    debug!(command = %line, "AT command");
                    out.extend_from_slice(&self.chat.respond(line));

                    if ChatResponder::is_cmux_command(line) {
                        info!("entering CMUX mode");
                        self.phase = LinkPhase::Cmux;
                        // Anything already buffered belongs to the mux.
                        mux_tail = Some(std::mem::take(&mut self.line_buf));
                        break;
                    }
                }

                if let Some(tail) = mux_tail {
                    out.extend_from_slice(&self.session.advance(&tail, now)?);
                }
                Ok(out.freeze())
            }
        }
    }

    /// Advance retransmission timers.
    pub fn tick(&mut self, now: Instant) -> Result<Bytes> {
        match self.phase {
            LinkPhase::Command => Ok(Bytes::new()),
            LinkPhase::Cmux => self.session.tick(now),
        }
    }

    /// Drain queued session events.
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        self.session.take_events()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_phase_walks_the_bringup_dialog() {
        let mut emulator = Emulator::quectel();
        let now = Instant::now();

        let out = emulator.advance(b"ATE0\r\n", now).unwrap();
        assert_eq!(out.as_ref(), b"OK\r\n");

        let out = emulator.advance(b"AT+CGSN\r\n", now).unwrap();
        assert_eq!(out.as_ref(), b"+CGSN 80008000800\r\nOK\r\n");

        assert_eq!(emulator.phase(), LinkPhase::Command);
    }

    #[test]
    fn cmux_command_switches_phase_silently() {
        let mut emulator = Emulator::quectel();
        let out = emulator
            .advance(b"AT+CMUX=0,0,5,127,10,3,30,10,2\r\n", Instant::now())
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(emulator.phase(), LinkPhase::Cmux);
    }

    #[test]
    fn bytes_after_cmux_command_reach_the_mux() {
        let mut emulator = Emulator::quectel();
        let now = Instant::now();

        // The SABM arrives glued to the mode-switch command.
        let mut input = b"AT+CMUX=0,0,5,127,10,3,30,10,2\r".to_vec();
        let mut sabm = BytesMut::new();
        muxlink_cmux::encode_frame(
            &mut sabm,
            0,
            true,
            muxlink_cmux::FrameType::Sabm,
            true,
            &[],
        )
        .unwrap();
        input.extend_from_slice(&sabm);

        let out = emulator.advance(&input, now).unwrap();
        let frames: Vec<_> = muxlink_cmux::Deframer::new()
            .feed(&out)
            .iter()
            .map(|raw| muxlink_cmux::decode_frame(raw).unwrap())
            .collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].frame_type, muxlink_cmux::FrameType::Ua);
        assert_eq!(frames[0].dlci, 0);
    }

    #[test]
    fn partial_lines_buffered_across_reads() {
        let mut emulator = Emulator::quectel();
        let now = Instant::now();

        assert!(emulator.advance(b"AT+CR", now).unwrap().is_empty());
        let out = emulator.advance(b"EG?\r", now).unwrap();
        assert_eq!(out.as_ref(), b"+CREG: 0,5\r\nOK\r\n");
    }
}
