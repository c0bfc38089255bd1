//! GSM 07.10 (CMUX) frame codec and stream deframer.
//!
//! CMUX multiplexes several logical data-link connections (DLCIs) over one
//! serial byte stream. Every frame is delimited by 0xF9 flags and carries:
//! - An address octet (DLCI, C/R bit, EA bit)
//! - A control octet (SABM/UA/DM/UIH with a poll/final bit)
//! - A single-octet length (EA=1; payloads up to 127 bytes)
//! - An 8-bit FCS over the header (and, for non-UIH frames, the payload)
//!
//! The codec is pure; the [`Deframer`] owns the only mutable state and
//! turns an arbitrarily fragmented byte stream into complete raw frames.

pub mod deframer;
pub mod error;
pub mod fcs;
pub mod frame;

pub use deframer::Deframer;
pub use error::{CmuxError, Result};
pub use frame::{decode_frame, encode_frame, CmuxFrame, FrameType, FLAG, MAX_PAYLOAD};
