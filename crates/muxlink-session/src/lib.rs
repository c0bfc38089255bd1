//! Modem-side session orchestration.
//!
//! Binds the CMUX and PPP layers into one emulated cellular modem:
//! answers the scripted AT dialog, performs the SABM/UA DLCI handshake,
//! routes each DLCI's traffic to an AT chat responder or a PPP
//! negotiation engine, and drives retransmission timers from the
//! caller's read loop. Everything is synchronous and single-threaded;
//! per-DLCI state is owned by exactly one [`Session`].

pub mod chat;
pub mod emulator;
pub mod error;
pub mod pump;
pub mod session;

pub use chat::{ChatEntry, ChatResponder, ChatScript, Matcher};
pub use emulator::{Emulator, LinkPhase};
pub use error::{Result, SessionError};
pub use pump::run_link;
pub use session::{DlciRole, Session, SessionConfig, SessionEvent};
