/// Errors that can occur during CMUX frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum CmuxError {
    /// The payload exceeds the single-octet length limit.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The DLCI does not fit in the 6-bit address field.
    #[error("invalid DLCI {0} (max 63)")]
    InvalidDlci(u8),

    /// The frame is shorter than the minimal flag+header+FCS+flag layout.
    #[error("frame too short ({0} bytes, min 6)")]
    Truncated(usize),

    /// The frame does not start and end with the 0xF9 flag.
    #[error("frame missing 0xF9 flag delimiter")]
    MissingFlag,

    /// The length octet declares multi-octet (EA=0) length encoding.
    #[error("extended (multi-octet) length not supported")]
    ExtendedLength,

    /// The declared payload length does not match the frame size.
    #[error("declared payload length {declared} does not match frame size")]
    LengthMismatch { declared: usize },

    /// The control octet is not SABM, UA, DM, or UIH.
    #[error("unknown control octet {0:#04x}")]
    UnknownControl(u8),
}

pub type Result<T> = std::result::Result<T, CmuxError>;
