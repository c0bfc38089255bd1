//! The per-connection session orchestrator.
//!
//! Owns one CMUX deframer for the raw byte stream plus per-DLCI state:
//! an AT line buffer for chat DLCIs, a PPP deframer and negotiation
//! engine for PPP DLCIs. All routing decisions happen here; the codec
//! layers stay pure.

use std::collections::{BTreeMap, VecDeque};
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use muxlink_cmux as cmux;
use muxlink_cmux::{CmuxFrame, FrameType};
use muxlink_ppp as ppp;
use muxlink_ppp::negotiate::{Engine, NegotiationConfig, Outbound};
use muxlink_ppp::{ControlProtocol, PppPacket, SessionPhase};
use tracing::{debug, trace, warn};

use crate::chat::{ChatResponder, ChatScript};
use crate::error::Result;

/// What a DLCI carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DlciRole {
    /// Plain-text AT command dialog.
    AtChat,
    /// A PPP link.
    Ppp,
}

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Pre-assigned DLCI roles; DLCIs not listed are classified by
    /// sniffing their first payload.
    pub roles: BTreeMap<u8, DlciRole>,
    /// C/R bit used on outbound UIH frames.
    pub uih_cr: bool,
    /// Negotiation engine settings, shared by every PPP DLCI.
    pub negotiation: NegotiationConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        // The reference cellular driver opens DLCI 1 for PPP and DLCI 2
        // for chat scripts.
        let mut roles = BTreeMap::new();
        roles.insert(1, DlciRole::Ppp);
        roles.insert(2, DlciRole::AtChat);
        Self {
            roles,
            uih_cr: false,
            negotiation: NegotiationConfig::default(),
        }
    }
}

/// Observable milestones, queued until the caller drains them.
///
/// Frames that arrive while a test is waiting on something else surface
/// here instead of being dropped, so interleavings are never lost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A DLCI finished its SABM/UA handshake.
    DlciOpened { dlci: u8 },
    /// A complete AT command line arrived on a chat DLCI.
    AtCommand { dlci: u8, line: String },
    /// A PPP DLCI moved to a new negotiation phase.
    PhaseChanged { dlci: u8, phase: SessionPhase },
    /// A protocol exhausted its retransmission budget.
    NegotiationFailed { dlci: u8, protocol: ControlProtocol },
}

#[derive(Debug)]
struct PppLink {
    deframer: ppp::Deframer,
    engine: Engine,
}

#[derive(Debug, Default)]
struct DlciState {
    role: Option<DlciRole>,
    established: bool,
    line_buf: String,
    ppp: Option<PppLink>,
    last_phase: Option<SessionPhase>,
}

/// One emulated modem session in CMUX mode.
pub struct Session {
    config: SessionConfig,
    chat: ChatResponder,
    deframer: cmux::Deframer,
    dlcis: BTreeMap<u8, DlciState>,
    events: VecDeque<SessionEvent>,
}

impl Session {
    /// Create a session over the given chat script.
    pub fn new(config: SessionConfig, script: ChatScript) -> Self {
        Self {
            config,
            chat: ChatResponder::new(script),
            deframer: cmux::Deframer::new(),
            dlcis: BTreeMap::new(),
            events: VecDeque::new(),
        }
    }

    /// Feed raw link bytes; returns the raw bytes to send back.
    ///
    /// Malformed frames are dropped with a warning and processing
    /// continues on the stream; nothing here aborts the session.
    pub fn advance(&mut self, input: &[u8], now: Instant) -> Result<Bytes> {
        let mut out = BytesMut::new();
        for raw in self.deframer.feed(input) {
            let frame = match cmux::decode_frame(&raw) {
                Ok(frame) => frame,
                Err(err) => {
                    warn!(%err, "dropping malformed CMUX frame");
                    continue;
                }
            };
            self.handle_frame(frame, now, &mut out)?;
        }
        Ok(out.freeze())
    }

    /// Advance retransmission timers; returns retransmitted frames.
    pub fn tick(&mut self, now: Instant) -> Result<Bytes> {
        let mut out = BytesMut::new();
        let uih_cr = self.config.uih_cr;
        for (&dlci, state) in &mut self.dlcis {
            let Some(link) = state.ppp.as_mut() else {
                continue;
            };
            let outcome = link.engine.tick(now);
            for outbound in &outcome.outbound {
                send_control(&mut out, dlci, uih_cr, outbound)?;
            }
            for &protocol in &outcome.failures {
                self.events
                    .push_back(SessionEvent::NegotiationFailed { dlci, protocol });
            }
            Self::note_phase(&mut self.events, dlci, state.last_phase.as_mut(), &link.engine);
        }
        Ok(out.freeze())
    }

    /// Drain queued events in arrival order.
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        self.events.drain(..).collect()
    }

    /// Negotiation phase of a PPP DLCI, if it has one.
    pub fn phase(&self, dlci: u8) -> Option<SessionPhase> {
        self.dlcis
            .get(&dlci)?
            .ppp
            .as_ref()
            .map(|link| link.engine.phase())
    }

    fn handle_frame(&mut self, frame: CmuxFrame, now: Instant, out: &mut BytesMut) -> Result<()> {
        match frame.frame_type {
            FrameType::Sabm => {
                if !frame.fcs_ok {
                    warn!(dlci = frame.dlci, "dropping SABM with bad FCS");
                    return Ok(());
                }
                debug!(dlci = frame.dlci, "SABM, replying UA");
                cmux::encode_frame(out, frame.dlci, !frame.cr, FrameType::Ua, true, &[])?;

                let state = self.dlcis.entry(frame.dlci).or_default();
                state.established = true;
                if state.role.is_none() {
                    state.role = self.config.roles.get(&frame.dlci).copied();
                }
                self.events
                    .push_back(SessionEvent::DlciOpened { dlci: frame.dlci });
            }
            FrameType::Ua | FrameType::Dm => {
                if !frame.fcs_ok {
                    warn!(dlci = frame.dlci, kind = ?frame.frame_type, "dropping frame with bad FCS");
                    return Ok(());
                }
                trace!(dlci = frame.dlci, kind = ?frame.frame_type, "control frame");
            }
            FrameType::Uih => {
                // The UIH FCS only covers the header; a mismatch is logged
                // and the frame still processed, matching the mux peer.
                if !frame.fcs_ok {
                    warn!(dlci = frame.dlci, "UIH header FCS mismatch, processing anyway");
                }
                self.handle_uih(frame, now, out)?;
            }
        }
        Ok(())
    }

    fn handle_uih(&mut self, frame: CmuxFrame, now: Instant, out: &mut BytesMut) -> Result<()> {
        let dlci = frame.dlci;
        let state = self.dlcis.entry(dlci).or_default();
        if !state.established {
            warn!(dlci, "UIH on a DLCI that never completed SABM/UA");
            state.established = true;
        }

        let role = *state.role.get_or_insert_with(|| {
            let role = sniff_role(&frame.payload);
            debug!(dlci, ?role, "classified DLCI by payload");
            role
        });

        match role {
            DlciRole::AtChat => {
                state.line_buf.push_str(&String::from_utf8_lossy(&frame.payload));
                let mut lines = Vec::new();
                while let Some(pos) = state.line_buf.find(|c| c == '\r' || c == '\n') {
                    let line: String = state.line_buf.drain(..=pos).collect();
                    let line = ChatResponder::clean(&line).to_string();
                    if !line.is_empty() {
                        lines.push(line);
                    }
                }
                for line in lines {
                    debug!(dlci, command = %line, "AT command");
                    self.events.push_back(SessionEvent::AtCommand {
                        dlci,
                        line: line.clone(),
                    });
                    let response = self.chat.respond(&line);
                    send_uih_chunks(out, dlci, self.config.uih_cr, &response)?;
                }
            }
            DlciRole::Ppp => {
                let link = state.ppp.get_or_insert_with(|| PppLink {
                    deframer: ppp::Deframer::new(),
                    engine: Engine::new(self.config.negotiation.clone()),
                });

                let mut replies: Vec<Outbound> = Vec::new();
                for segment in link.deframer.feed(&frame.payload) {
                    let decoded = match ppp::decode_segment(&segment) {
                        Ok(decoded) => decoded,
                        Err(err) => {
                            warn!(dlci, %err, "dropping malformed PPP segment");
                            continue;
                        }
                    };
                    if !decoded.fcs_ok {
                        warn!(dlci, "dropping PPP frame with bad FCS");
                        continue;
                    }
                    let packet = match PppPacket::from_frame(&decoded) {
                        Ok(packet) => packet,
                        Err(err) => {
                            warn!(dlci, %err, "dropping unparseable control frame");
                            continue;
                        }
                    };
                    replies.extend(link.engine.handle(&packet, now)?);
                }
                for outbound in &replies {
                    send_control(out, dlci, self.config.uih_cr, outbound)?;
                }
                Self::note_phase(&mut self.events, dlci, state.last_phase.as_mut(), &link.engine);
                if state.last_phase.is_none() {
                    state.last_phase = Some(link.engine.phase());
                }
            }
        }
        Ok(())
    }

    fn note_phase(
        events: &mut VecDeque<SessionEvent>,
        dlci: u8,
        last: Option<&mut SessionPhase>,
        engine: &Engine,
    ) {
        let phase = engine.phase();
        match last {
            Some(last) if *last != phase => {
                debug!(dlci, ?phase, "negotiation phase change");
                events.push_back(SessionEvent::PhaseChanged { dlci, phase });
                *last = phase;
            }
            _ => {}
        }
    }
}

/// Guess a DLCI's role from its first payload: PPP traffic leads with a
/// 0x7E flag (or an already-deframed FF 03 header), AT chat never does.
fn sniff_role(payload: &[u8]) -> DlciRole {
    if payload.contains(&ppp::FLAG) || payload.starts_with(&[0xFF, 0x03]) {
        DlciRole::Ppp
    } else {
        DlciRole::AtChat
    }
}

/// Encode one negotiation reply as PPP-in-UIH.
fn send_control(out: &mut BytesMut, dlci: u8, cr: bool, outbound: &Outbound) -> Result<()> {
    let mut ppp_wire = BytesMut::new();
    ppp::encode_frame(
        &mut ppp_wire,
        outbound.protocol.number(),
        &outbound.message.encode(),
    );
    send_uih_chunks(out, dlci, cr, &ppp_wire)
}

/// Split an arbitrary byte run into UIH frames within the single-octet
/// length limit. The peer reassembles from the byte stream, so chunk
/// boundaries are invisible to it.
fn send_uih_chunks(out: &mut BytesMut, dlci: u8, cr: bool, data: &[u8]) -> Result<()> {
    for chunk in data.chunks(cmux::MAX_PAYLOAD) {
        cmux::encode_frame(out, dlci, cr, FrameType::Uih, false, chunk)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use bytes::{Bytes, BytesMut};
    use muxlink_ppp::{ControlCode, ControlMessage};

    use super::*;
    use crate::chat::ChatScript;

    fn session() -> Session {
        Session::new(SessionConfig::default(), ChatScript::quectel_bringup())
    }

    fn sabm(dlci: u8) -> BytesMut {
        let mut buf = BytesMut::new();
        cmux::encode_frame(&mut buf, dlci, true, FrameType::Sabm, true, &[]).unwrap();
        buf
    }

    fn uih(dlci: u8, payload: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        cmux::encode_frame(&mut buf, dlci, true, FrameType::Uih, false, payload).unwrap();
        buf
    }

    fn lcp_in_uih(dlci: u8, message: &ControlMessage) -> BytesMut {
        let mut ppp_wire = BytesMut::new();
        ppp::encode_frame(&mut ppp_wire, ppp::frame::protocols::LCP, &message.encode());
        uih(dlci, &ppp_wire)
    }

    /// Decode every CMUX frame in `wire`.
    fn decode_out(wire: &[u8]) -> Vec<CmuxFrame> {
        cmux::Deframer::new()
            .feed(wire)
            .iter()
            .map(|raw| cmux::decode_frame(raw).unwrap())
            .collect()
    }

    /// Decode the PPP control messages inside a run of UIH frames.
    fn decode_ppp_out(frames: &[CmuxFrame]) -> Vec<(u16, ControlMessage)> {
        let mut deframer = ppp::Deframer::new();
        let mut out = Vec::new();
        for frame in frames {
            for segment in deframer.feed(&frame.payload) {
                let decoded = ppp::decode_segment(&segment).unwrap();
                assert!(decoded.fcs_ok);
                let protocol = ControlProtocol::from_number(decoded.protocol).unwrap();
                out.push((
                    decoded.protocol,
                    ControlMessage::parse(protocol, &decoded.payload).unwrap(),
                ));
            }
        }
        out
    }

    #[test]
    fn sabm_answered_with_opposite_cr_ua() {
        let mut session = session();
        let out = session.advance(&sabm(1), Instant::now()).unwrap();
        let frames = decode_out(&out);

        assert_eq!(frames.len(), 1);
        let ua = &frames[0];
        assert_eq!(ua.frame_type, FrameType::Ua);
        assert_eq!(ua.dlci, 1);
        assert!(!ua.cr);
        assert!(ua.poll_final);
        assert!(ua.fcs_ok);

        assert!(session
            .take_events()
            .contains(&SessionEvent::DlciOpened { dlci: 1 }));
    }

    #[test]
    fn at_command_on_chat_dlci_answered() {
        let mut session = session();
        let now = Instant::now();
        session.advance(&sabm(2), now).unwrap();

        let out = session.advance(&uih(2, b"AT+CREG?\r"), now).unwrap();
        let frames = decode_out(&out);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].frame_type, FrameType::Uih);
        assert_eq!(frames[0].dlci, 2);
        assert_eq!(frames[0].payload.as_ref(), b"+CREG: 0,5\r\nOK\r\n");

        let events = session.take_events();
        assert!(events.contains(&SessionEvent::AtCommand {
            dlci: 2,
            line: "AT+CREG?".to_string(),
        }));
    }

    #[test]
    fn at_command_split_across_uih_frames() {
        let mut session = session();
        let now = Instant::now();
        session.advance(&sabm(2), now).unwrap();

        assert!(session.advance(&uih(2, b"AT+CR"), now).unwrap().is_empty());
        let out = session.advance(&uih(2, b"EG?\r"), now).unwrap();
        let frames = decode_out(&out);
        assert_eq!(frames[0].payload.as_ref(), b"+CREG: 0,5\r\nOK\r\n");
    }

    #[test]
    fn lcp_request_gets_ack_and_counter_request() {
        let mut session = session();
        let now = Instant::now();
        session.advance(&sabm(1), now).unwrap();

        let request = ControlMessage::new(
            ControlCode::ConfigureRequest,
            3,
            &[0x01u8, 0x04, 0x05, 0xDC][..],
        );
        let out = session.advance(&lcp_in_uih(1, &request), now).unwrap();
        let frames = decode_out(&out);
        assert!(frames.iter().all(|f| f.dlci == 1));

        let messages = decode_ppp_out(&frames);
        assert_eq!(messages.len(), 2);

        let (protocol, ack) = &messages[0];
        assert_eq!(*protocol, ppp::frame::protocols::LCP);
        assert_eq!(ack.code, ControlCode::ConfigureAck);
        assert_eq!(ack.identifier, 3);
        assert_eq!(ack.data.as_ref(), &[0x01, 0x04, 0x05, 0xDC]);

        let (_, counter) = &messages[1];
        assert_eq!(counter.code, ControlCode::ConfigureRequest);
        assert!(counter.data.is_empty());
    }

    #[test]
    fn lcp_opens_after_peer_ack() {
        let mut session = session();
        let now = Instant::now();
        session.advance(&sabm(1), now).unwrap();

        let request =
            ControlMessage::new(ControlCode::ConfigureRequest, 3, &[0x01u8, 0x04, 0x05, 0xDC][..]);
        let out = session.advance(&lcp_in_uih(1, &request), now).unwrap();
        let local_id = decode_ppp_out(&decode_out(&out))[1].1.identifier;

        let ack = ControlMessage::new(ControlCode::ConfigureAck, local_id, Bytes::new());
        session.advance(&lcp_in_uih(1, &ack), now).unwrap();

        assert_eq!(session.phase(1), Some(SessionPhase::LcpOpen));
        assert!(session
            .take_events()
            .contains(&SessionEvent::PhaseChanged {
                dlci: 1,
                phase: SessionPhase::LcpOpen,
            }));
    }

    #[test]
    fn retransmission_flows_through_tick() {
        let mut session = session();
        let now = Instant::now();
        session.advance(&sabm(1), now).unwrap();

        let request = ControlMessage::new(ControlCode::ConfigureRequest, 1, Bytes::new());
        let out = session.advance(&lcp_in_uih(1, &request), now).unwrap();
        let local_id = decode_ppp_out(&decode_out(&out))[1].1.identifier;

        // No ack: first tick past the deadline retransmits the same id.
        let out = session
            .tick(now + std::time::Duration::from_secs(3))
            .unwrap();
        let messages = decode_ppp_out(&decode_out(&out));
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].1.code, ControlCode::ConfigureRequest);
        assert_eq!(messages[0].1.identifier, local_id);

        // Second expiry surfaces the failure as an event.
        let out = session
            .tick(now + std::time::Duration::from_secs(6))
            .unwrap();
        assert!(out.is_empty());
        assert!(session.take_events().contains(&SessionEvent::NegotiationFailed {
            dlci: 1,
            protocol: ControlProtocol::Lcp,
        }));
    }

    #[test]
    fn unknown_dlci_sniffed_as_ppp() {
        let mut session = session();
        let now = Instant::now();
        session.advance(&sabm(3), now).unwrap();

        let request = ControlMessage::new(ControlCode::ConfigureRequest, 1, Bytes::new());
        let out = session.advance(&lcp_in_uih(3, &request), now).unwrap();
        let messages = decode_ppp_out(&decode_out(&out));
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn unknown_dlci_sniffed_as_chat() {
        let mut session = session();
        let now = Instant::now();
        session.advance(&sabm(4), now).unwrap();

        let out = session.advance(&uih(4, b"ATE0\r"), now).unwrap();
        let frames = decode_out(&out);
        assert_eq!(frames[0].payload.as_ref(), b"OK\r\n");
    }

    #[test]
    fn corrupted_sabm_dropped() {
        let mut session = session();
        let mut wire = sabm(1);
        wire[1] ^= 0x08; // flip a DLCI bit; FCS now fails
        let out = session.advance(&wire, Instant::now()).unwrap();
        assert!(out.is_empty());
        assert!(session.take_events().is_empty());
    }

    #[test]
    fn malformed_frames_do_not_stall_the_stream() {
        let mut session = session();
        let now = Instant::now();

        // Garbage between two flags, then a valid SABM.
        let mut stream = vec![0xF9, 0x01, 0xF9];
        stream.extend_from_slice(&sabm(1));
        let out = session.advance(&stream, now).unwrap();
        let frames = decode_out(&out);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].frame_type, FrameType::Ua);
    }

    #[test]
    fn long_chat_response_chunked_within_length_limit() {
        let long: String = "X".repeat(300);
        let script = ChatScript {
            entries: vec![crate::chat::ChatEntry {
                command: "AT+LONG".to_string(),
                matcher: crate::chat::Matcher::Exact,
                responses: vec![long.clone()],
            }],
        };
        let mut session = Session::new(SessionConfig::default(), script);
        let now = Instant::now();
        session.advance(&sabm(2), now).unwrap();

        let out = session.advance(&uih(2, b"AT+LONG\r"), now).unwrap();
        let frames = decode_out(&out);
        assert!(frames.len() > 1);
        assert!(frames.iter().all(|f| f.payload.len() <= cmux::MAX_PAYLOAD));

        let total: Vec<u8> = frames.iter().flat_map(|f| f.payload.to_vec()).collect();
        assert_eq!(total, format!("{long}\r\n").into_bytes());
    }
}
