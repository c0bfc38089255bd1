//! LCP/IPCP/IPv6CP/PAP negotiation engine.
//!
//! One [`Engine`] per PPP link (i.e. per DLCI). The engine consumes
//! parsed [`PppPacket`]s and produces the control messages the modem
//! side of the link must send: acks for acceptable peer requests,
//! rejects for unsupported options, its own Configure-Requests for the
//! local direction, echo replies, and PAP acks. Retransmission is driven
//! by [`Engine::tick`] from the caller's read loop; there is no timer
//! thread.

use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::control::{
    options, ConfigOption, ControlCode, ControlMessage, ControlProtocol, PppPacket,
};
use crate::error::Result;

/// Default reply timeout for an outbound Configure-Request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Link phase, coarsest first: LCP must open before the network
/// control protocols run; they then negotiate independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    LcpNegotiating,
    LcpOpen,
    NetworkNegotiating,
    NetworkOpen,
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct NegotiationConfig {
    /// Reply timeout before the single retransmission.
    pub timeout: Duration,
    /// Negotiate IPv4 (IPCP).
    pub enable_ipcp: bool,
    /// Negotiate IPv6 (IPv6CP).
    pub enable_ipv6cp: bool,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            enable_ipcp: true,
            enable_ipv6cp: true,
        }
    }
}

/// A control message the engine wants sent, tagged with its protocol.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub protocol: ControlProtocol,
    pub message: ControlMessage,
}

/// Result of a timer tick: retransmissions to send plus protocols whose
/// retry budget is exhausted.
#[derive(Debug, Default)]
pub struct TickOutcome {
    pub outbound: Vec<Outbound>,
    pub failures: Vec<ControlProtocol>,
}

#[derive(Debug)]
struct OutstandingRequest {
    identifier: u8,
    options: Bytes,
    sent_at: Instant,
    retransmitted: bool,
}

/// Per-protocol negotiation direction tracking.
///
/// A protocol is open only when both directions converged: the peer
/// acked our request AND we acked the peer's. Two independent booleans,
/// per the RFC 1661 model.
#[derive(Debug)]
struct Negotiation {
    protocol: ControlProtocol,
    peer_acked_local: bool,
    local_acked_peer: bool,
    outstanding: Option<OutstandingRequest>,
    // Local identifier namespace, disjoint from the peer's; fresh
    // monotonically increasing values, never replayed after a Reject.
    next_identifier: u8,
    failed: bool,
}

impl Negotiation {
    fn new(protocol: ControlProtocol) -> Self {
        Self {
            protocol,
            peer_acked_local: false,
            local_acked_peer: false,
            outstanding: None,
            next_identifier: 1,
            failed: false,
        }
    }

    fn is_open(&self) -> bool {
        self.peer_acked_local && self.local_acked_peer
    }

    fn started(&self) -> bool {
        self.peer_acked_local
            || self.local_acked_peer
            || self.outstanding.is_some()
            || self.failed
    }

    fn take_identifier(&mut self) -> u8 {
        let id = self.next_identifier;
        self.next_identifier = self.next_identifier.wrapping_add(1);
        id
    }

    fn reset(&mut self) {
        self.peer_acked_local = false;
        self.local_acked_peer = false;
        self.outstanding = None;
        self.failed = false;
    }

    fn request(&mut self, options: Bytes, now: Instant) -> ControlMessage {
        let identifier = self.take_identifier();
        self.outstanding = Some(OutstandingRequest {
            identifier,
            options: options.clone(),
            sent_at: now,
            retransmitted: false,
        });
        ControlMessage::new(ControlCode::ConfigureRequest, identifier, options)
    }
}

/// The per-link negotiation state machine.
#[derive(Debug)]
pub struct Engine {
    config: NegotiationConfig,
    lcp: Negotiation,
    ipcp: Negotiation,
    ipv6cp: Negotiation,
}

impl Engine {
    /// Create an engine in the idle phase.
    pub fn new(config: NegotiationConfig) -> Self {
        Self {
            config,
            lcp: Negotiation::new(ControlProtocol::Lcp),
            ipcp: Negotiation::new(ControlProtocol::Ipcp),
            ipv6cp: Negotiation::new(ControlProtocol::Ipv6cp),
        }
    }

    /// Current link phase, derived from per-protocol convergence.
    pub fn phase(&self) -> SessionPhase {
        if !self.lcp.started() {
            return SessionPhase::Idle;
        }
        if !self.lcp.is_open() {
            return SessionPhase::LcpNegotiating;
        }

        let network: Vec<&Negotiation> = [&self.ipcp, &self.ipv6cp]
            .into_iter()
            .filter(|n| n.started())
            .collect();
        if network.is_empty() {
            return SessionPhase::LcpOpen;
        }
        if network.iter().all(|n| n.is_open()) {
            SessionPhase::NetworkOpen
        } else {
            SessionPhase::NetworkNegotiating
        }
    }

    /// Whether the given protocol has converged in both directions.
    pub fn is_open(&self, protocol: ControlProtocol) -> bool {
        match protocol {
            ControlProtocol::Lcp => self.lcp.is_open(),
            ControlProtocol::Ipcp => self.ipcp.is_open(),
            ControlProtocol::Ipv6cp => self.ipv6cp.is_open(),
            ControlProtocol::Pap => false,
        }
    }

    /// Consume one inbound packet and produce the replies to send.
    pub fn handle(&mut self, packet: &PppPacket, now: Instant) -> Result<Vec<Outbound>> {
        match packet {
            PppPacket::Lcp(message) => self.handle_control(ControlProtocol::Lcp, message, now),
            PppPacket::Ipcp(message) => self.handle_network(ControlProtocol::Ipcp, message, now),
            PppPacket::Ipv6cp(message) => {
                self.handle_network(ControlProtocol::Ipv6cp, message, now)
            }
            PppPacket::Pap(message) => self.handle_pap(message),
            PppPacket::Other { protocol, .. } => {
                trace!("ignoring data frame for protocol {protocol:#06x}");
                Ok(Vec::new())
            }
        }
    }

    /// Advance retransmission timers.
    ///
    /// Each outstanding request is resent once, with the identical
    /// identifier and options, after `timeout`; a second expiry reports
    /// the protocol in [`TickOutcome::failures`] and abandons it.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        let timeout = self.config.timeout;
        let mut outcome = TickOutcome::default();

        for negotiation in [&mut self.lcp, &mut self.ipcp, &mut self.ipv6cp] {
            let Some(outstanding) = negotiation.outstanding.as_mut() else {
                continue;
            };
            if now.duration_since(outstanding.sent_at) < timeout {
                continue;
            }
            if !outstanding.retransmitted {
                outstanding.retransmitted = true;
                outstanding.sent_at = now;
                debug!(protocol = %negotiation.protocol, identifier = outstanding.identifier,
                    "retransmitting Configure-Request");
                outcome.outbound.push(Outbound {
                    protocol: negotiation.protocol,
                    message: ControlMessage::new(
                        ControlCode::ConfigureRequest,
                        outstanding.identifier,
                        outstanding.options.clone(),
                    ),
                });
            } else {
                warn!(protocol = %negotiation.protocol, "negotiation timed out");
                negotiation.outstanding = None;
                negotiation.failed = true;
                outcome.failures.push(negotiation.protocol);
            }
        }
        outcome
    }

    fn handle_network(
        &mut self,
        protocol: ControlProtocol,
        message: &ControlMessage,
        now: Instant,
    ) -> Result<Vec<Outbound>> {
        if !self.lcp.is_open() {
            warn!(%protocol, "dropping network control frame before LCP is open");
            return Ok(Vec::new());
        }
        let enabled = match protocol {
            ControlProtocol::Ipcp => self.config.enable_ipcp,
            ControlProtocol::Ipv6cp => self.config.enable_ipv6cp,
            _ => true,
        };
        if !enabled {
            warn!(%protocol, "protocol disabled, ignoring");
            return Ok(Vec::new());
        }
        self.handle_control(protocol, message, now)
    }

    fn handle_control(
        &mut self,
        protocol: ControlProtocol,
        message: &ControlMessage,
        now: Instant,
    ) -> Result<Vec<Outbound>> {
        let negotiation = match protocol {
            ControlProtocol::Lcp => &mut self.lcp,
            ControlProtocol::Ipcp => &mut self.ipcp,
            ControlProtocol::Ipv6cp => &mut self.ipv6cp,
            ControlProtocol::Pap => unreachable!("PAP handled separately"),
        };
        let mut outbound = Vec::new();

        match message.code {
            ControlCode::ConfigureRequest => {
                let requested = ConfigOption::parse_list(&message.data)?;
                let unsupported: Vec<ConfigOption> = requested
                    .iter()
                    .filter(|opt| !option_supported(protocol, opt.kind))
                    .cloned()
                    .collect();

                if unsupported.is_empty() {
                    debug!(%protocol, identifier = message.identifier, "acking peer request");
                    negotiation.local_acked_peer = true;
                    // Echo the options verbatim; content is never
                    // renegotiated from this side.
                    outbound.push(Outbound {
                        protocol,
                        message: ControlMessage::new(
                            ControlCode::ConfigureAck,
                            message.identifier,
                            message.data.clone(),
                        ),
                    });
                    // Open the local direction if that has not happened yet.
                    if !negotiation.peer_acked_local && negotiation.outstanding.is_none() {
                        let request = negotiation.request(Bytes::new(), now);
                        debug!(%protocol, identifier = request.identifier,
                            "sending local Configure-Request");
                        outbound.push(Outbound {
                            protocol,
                            message: request,
                        });
                    }
                } else {
                    debug!(%protocol, identifier = message.identifier,
                        rejected = unsupported.len(), "rejecting unsupported options");
                    outbound.push(Outbound {
                        protocol,
                        message: ControlMessage::new(
                            ControlCode::ConfigureReject,
                            message.identifier,
                            ConfigOption::encode_list(&unsupported),
                        ),
                    });
                }
            }
            ControlCode::ConfigureAck => {
                match negotiation.outstanding.take() {
                    Some(outstanding) if outstanding.identifier == message.identifier => {
                        debug!(%protocol, identifier = message.identifier, "peer acked local request");
                        negotiation.peer_acked_local = true;
                    }
                    Some(outstanding) => {
                        warn!(%protocol, expected = outstanding.identifier,
                            got = message.identifier, "ack identifier mismatch, ignoring");
                        negotiation.outstanding = Some(outstanding);
                    }
                    None => {
                        warn!(%protocol, identifier = message.identifier,
                            "unsolicited Configure-Ack");
                    }
                }
            }
            ControlCode::ConfigureReject | ControlCode::ConfigureNak => {
                match negotiation.outstanding.take() {
                    Some(outstanding) if outstanding.identifier == message.identifier => {
                        // Drop the options the peer refused and resubmit
                        // under a fresh identifier.
                        let refused = ConfigOption::parse_list(&message.data)?;
                        let kept: Vec<ConfigOption> =
                            ConfigOption::parse_list(&outstanding.options)?
                                .into_iter()
                                .filter(|opt| !refused.iter().any(|r| r.kind == opt.kind))
                                .collect();
                        let request =
                            negotiation.request(ConfigOption::encode_list(&kept), now);
                        debug!(%protocol, identifier = request.identifier,
                            "resubmitting request after reject");
                        outbound.push(Outbound {
                            protocol,
                            message: request,
                        });
                    }
                    Some(outstanding) => {
                        warn!(%protocol, expected = outstanding.identifier,
                            got = message.identifier, "reject identifier mismatch, ignoring");
                        negotiation.outstanding = Some(outstanding);
                    }
                    None => {
                        warn!(%protocol, "unsolicited Configure-Reject");
                    }
                }
            }
            ControlCode::EchoRequest => {
                if protocol == ControlProtocol::Lcp && negotiation.is_open() {
                    trace!(identifier = message.identifier, "echo reply");
                    outbound.push(Outbound {
                        protocol,
                        message: ControlMessage::new(
                            ControlCode::EchoReply,
                            message.identifier,
                            message.data.clone(),
                        ),
                    });
                } else {
                    warn!(%protocol, "dropping Echo-Request before protocol open");
                }
            }
            ControlCode::EchoReply => {
                trace!(identifier = message.identifier, "echo reply received");
            }
            ControlCode::TerminateRequest => {
                debug!(%protocol, "peer terminated, acking and resetting");
                negotiation.reset();
                outbound.push(Outbound {
                    protocol,
                    message: ControlMessage::new(
                        ControlCode::TerminateAck,
                        message.identifier,
                        Bytes::new(),
                    ),
                });
            }
            ControlCode::TerminateAck | ControlCode::CodeReject => {
                warn!(%protocol, code = ?message.code, "ignoring");
            }
            ControlCode::AuthRequest | ControlCode::AuthAck | ControlCode::AuthNak => {
                unreachable!("PAP codes never parse under {protocol}")
            }
        }
        Ok(outbound)
    }

    fn handle_pap(&mut self, message: &ControlMessage) -> Result<Vec<Outbound>> {
        match message.code {
            ControlCode::AuthRequest => {
                // Any credentials authenticate; reply with an empty message
                // field (one zero msg-length octet).
                debug!(identifier = message.identifier, "PAP auth request, acking");
                Ok(vec![Outbound {
                    protocol: ControlProtocol::Pap,
                    message: ControlMessage::new(
                        ControlCode::AuthAck,
                        message.identifier,
                        Bytes::from_static(&[0x00]),
                    ),
                }])
            }
            _ => {
                warn!(code = ?message.code, "ignoring PAP message");
                Ok(Vec::new())
            }
        }
    }
}

fn option_supported(protocol: ControlProtocol, kind: u8) -> bool {
    match protocol {
        ControlProtocol::Lcp => matches!(
            kind,
            options::lcp::MRU
                | options::lcp::ACCM
                | options::lcp::MAGIC_NUMBER
                | options::lcp::PFC
                | options::lcp::ACFC
        ),
        ControlProtocol::Ipcp => matches!(
            kind,
            options::ipcp::ADDRESS | options::ipcp::PRIMARY_DNS | options::ipcp::SECONDARY_DNS
        ),
        ControlProtocol::Ipv6cp => kind == options::ipv6cp::INTERFACE_ID,
        ControlProtocol::Pap => false,
    }
}
