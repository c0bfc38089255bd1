/// Errors that can occur while orchestrating a modem session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// CMUX encode/decode error.
    #[error("cmux error: {0}")]
    Cmux(#[from] muxlink_cmux::CmuxError),

    /// PPP framing or negotiation error.
    #[error("ppp error: {0}")]
    Ppp(#[from] muxlink_ppp::PppError),

    /// Chat script could not be parsed.
    #[error("chat script error: {0}")]
    ChatScript(#[from] serde_json::Error),

    /// I/O error on the device link.
    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The device link was closed.
    #[error("link closed by peer")]
    LinkClosed,
}

pub type Result<T> = std::result::Result<T, SessionError>;
