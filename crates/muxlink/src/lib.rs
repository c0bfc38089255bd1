//! Cellular modem emulation at the protocol level.
//!
//! muxlink speaks the two binary protocols a cellular driver exercises
//! during bring-up, a GSM 07.10-style multiplexer (CMUX) and PPP with
//! LCP/IPCP/IPv6CP/PAP negotiation, well enough to drive a device
//! under test through its full modem bring-up inside an automated test.
//!
//! # Crate Structure
//!
//! - [`cmux`] — CMUX frame codec and stream deframer
//! - [`ppp`] — PPP framing and the negotiation engine
//! - [`session`] — session orchestration, AT chat, and the link pump

/// Re-export CMUX types.
pub mod cmux {
    pub use muxlink_cmux::*;
}

/// Re-export PPP types.
pub mod ppp {
    pub use muxlink_ppp::*;
}

/// Re-export session types.
pub mod session {
    pub use muxlink_session::*;
}
