use crate::control::ControlProtocol;

/// Errors that can occur in PPP framing and negotiation.
#[derive(Debug, thiserror::Error)]
pub enum PppError {
    /// An escape octet (0x7D) ended the segment with nothing to escape.
    #[error("escape octet at end of segment")]
    TruncatedEscape,

    /// The unescaped segment is too short to hold a protocol field and FCS.
    #[error("segment too short ({0} bytes)")]
    SegmentTooShort(usize),

    /// A control message is shorter than its fixed 4-byte header.
    #[error("control message too short ({0} bytes, min 4)")]
    MessageTooShort(usize),

    /// A control message declares a length beyond the enclosing payload.
    #[error("control message length {declared} exceeds available {available} bytes")]
    LengthOutOfRange { declared: usize, available: usize },

    /// The control code octet is not valid for this protocol.
    #[error("unknown {protocol} code {code:#04x}")]
    UnknownCode {
        protocol: ControlProtocol,
        code: u8,
    },

    /// A configuration option's declared length is impossible.
    #[error("malformed configuration option")]
    MalformedOption,

    /// An outbound Configure-Request went unanswered after one retransmit.
    #[error("{protocol} negotiation timed out after retransmission")]
    NegotiationTimeout { protocol: ControlProtocol },
}

pub type Result<T> = std::result::Result<T, PppError>;
