use bytes::{Buf, Bytes, BytesMut};

use crate::frame::FLAG;

const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// Incremental PPP stream deframer.
///
/// Splits a byte stream on 0x7E flags and yields the still-escaped
/// inter-flag segments for [`crate::decode_segment`]. A closing flag is
/// kept as the potential opening flag of the next frame, so both
/// dedicated-flag and shared-flag peers deframe correctly. One instance
/// per DLCI; a DLCI boundary is also a PPP-stream boundary.
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

    /// Append `input` and extract every complete segment now available.
    pub fn feed(&mut self, input: &[u8]) -> Vec<Bytes> {
        self.buf.extend_from_slice(input);

        let mut segments = Vec::new();
        loop {
            let Some(start) = self.buf.iter().position(|&b| b == FLAG) else {
                self.buf.clear();
                break;
            };
            self.buf.advance(start);

            let Some(end) = self.buf[1..].iter().position(|&b| b == FLAG) else {
                break;
            };
            // Interior of [0, end+1]; keep the closing flag in the buffer.
            let segment = self.buf.split_to(end + 1).freeze().slice(1..);
            if !segment.is_empty() {
                segments.push(segment);
            }
        }
        segments
    }

    /// Number of bytes currently buffered awaiting a closing flag.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
