use bytes::{Buf, Bytes, BytesMut};

use crate::frame::FLAG;

const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// Incremental CMUX stream deframer.
///
/// Accumulates arbitrarily fragmented input and yields complete raw
/// flag-to-flag frames. One instance per byte stream; never shared
/// across connections.
#[derive(Debug, Default)]
pub struct Deframer {
    buf: BytesMut,
}

impl Deframer {
    /// Create an empty deframer.
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Append `input` and extract every complete frame now available.
    ///
    /// Each returned slice is one candidate frame including both flag
    /// octets, ready for [`crate::decode_frame`]. An opening flag without
    /// a closing flag is retained for the next call; bytes with no flag
    /// at all are discarded, which bounds buffer growth between frames.
    pub fn feed(&mut self, input: &[u8]) -> Vec<Bytes> {
        self.buf.extend_from_slice(input);

        let mut frames = Vec::new();
        loop {
            let Some(start) = self.buf.iter().position(|&b| b == FLAG) else {
                if !self.buf.is_empty() {
                    tracing::trace!(bytes = self.buf.len(), "discarding flagless data");
                }
                self.buf.clear();
                break;
            };
            self.buf.advance(start);

            let Some(end) = self.buf[1..].iter().position(|&b| b == FLAG) else {
                break;
            };
            frames.push(self.buf.split_to(end + 2).freeze());
        }
        frames
    }

    /// Number of bytes currently buffered awaiting a closing flag.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
