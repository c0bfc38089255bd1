//! PPP framing and option negotiation.
//!
//! Implements the HDLC-like framing of RFC 1662 (0x7E flags, byte
//! stuffing, 16-bit FCS) and enough of RFC 1661 to drive a peer through
//! LCP, IPCP, IPv6CP, and PAP convergence: the subset a cellular modem
//! emulator needs to bring a device-under-test's network interface up.
//!
//! The codec in [`frame`] is pure; [`Deframer`] holds per-stream buffer
//! state (one instance per DLCI), and [`negotiate::Engine`] is the
//! per-link negotiation state machine.

pub mod control;
pub mod deframer;
pub mod error;
pub mod fcs;
pub mod frame;
pub mod negotiate;

pub use control::{
    ConfigOption, ControlCode, ControlMessage, ControlProtocol, PppPacket,
};
pub use deframer::Deframer;
pub use error::{PppError, Result};
pub use frame::{decode_segment, encode_frame, PppFrame, FLAG};
pub use negotiate::{Engine, NegotiationConfig, SessionPhase, TickOutcome};
