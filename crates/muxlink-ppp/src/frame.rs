use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{PppError, Result};
use crate::fcs;

/// Frame delimiter octet.
pub const FLAG: u8 = 0x7E;

/// Escape octet; the following byte is XORed with 0x20.
pub const ESCAPE: u8 = 0x7D;

const ADDRESS: u8 = 0xFF;
const CONTROL: u8 = 0x03;

/// Assigned PPP protocol numbers (the subset this crate speaks).
pub mod protocols {
    /// Internet Protocol version 4.
    pub const IPV4: u16 = 0x0021;
    /// Internet Protocol version 6.
    pub const IPV6: u16 = 0x0057;
    /// IP Control Protocol.
    pub const IPCP: u16 = 0x8021;
    /// IPv6 Control Protocol.
    pub const IPV6CP: u16 = 0x8057;
    /// Link Control Protocol.
    pub const LCP: u16 = 0xC021;
    /// Password Authentication Protocol.
    pub const PAP: u16 = 0xC023;
}

/// A decoded PPP frame: protocol number plus unescaped payload.
#[derive(Debug, Clone)]
pub struct PppFrame {
    /// 16-bit protocol number (expanded if it arrived PFC-compressed).
    pub protocol: u16,
    /// Information field, unescaped, FCS stripped.
    pub payload: Bytes,
    /// Whether the received FCS matched the recomputed one.
    pub fcs_ok: bool,
}

fn escape_into(dst: &mut BytesMut, data: &[u8]) {
    for &b in data {
        if b < 0x20 || b == FLAG || b == ESCAPE {
            dst.put_u8(ESCAPE);
            dst.put_u8(b ^ 0x20);
        } else {
            dst.put_u8(b);
        }
    }
}

fn unescape(segment: &[u8]) -> Result<BytesMut> {
    let mut out = BytesMut::with_capacity(segment.len());
    let mut iter = segment.iter();
    while let Some(&b) = iter.next() {
        if b == ESCAPE {
            let &next = iter.next().ok_or(PppError::TruncatedEscape)?;
            out.put_u8(next ^ 0x20);
        } else {
            out.put_u8(b);
        }
    }
    Ok(out)
}

/// Encode one frame into the wire format, appending to `dst`.
///
/// Layout: `7E | escape(FF 03 protocol payload fcs) | 7E` with the
/// protocol big-endian and the FCS little-endian, computed over the
/// unescaped header + payload.
pub fn encode_frame(dst: &mut BytesMut, protocol: u16, payload: &[u8]) {
    let mut body = BytesMut::with_capacity(4 + payload.len() + 2);
    body.put_u8(ADDRESS);
    body.put_u8(CONTROL);
    body.put_u16(protocol);
    body.put_slice(payload);
    let fcs = fcs::fcs16(&body);
    body.put_u16_le(fcs);

    dst.reserve(body.len() * 2 + 2);
    dst.put_u8(FLAG);
    escape_into(dst, &body);
    dst.put_u8(FLAG);
}

/// Decode one inter-flag segment (still escaped, no flag octets).
///
/// Tolerates Address/Control-Field Compression (missing FF 03) and
/// Protocol-Field Compression (single odd protocol octet). An FCS
/// mismatch only clears [`PppFrame::fcs_ok`]; the caller owns drop
/// policy.
pub fn decode_segment(segment: &[u8]) -> Result<PppFrame> {
    let body = unescape(segment)?;
    // Smallest legal body: one PFC protocol octet + 2 FCS octets.
    if body.len() < 3 {
        return Err(PppError::SegmentTooShort(body.len()));
    }

    let fcs_ok = fcs::check_trailing(&body);
    let body = &body[..body.len() - 2];

    // Address/control may be elided when ACFC was negotiated.
    let rest = match body {
        [ADDRESS, CONTROL, rest @ ..] => rest,
        _ => body,
    };

    // Protocol is one octet when PFC applies (low bit set), else two.
    let (protocol, payload) = match rest {
        [first, rest @ ..] if first & 1 == 1 => (u16::from(*first), rest),
        [first, second, rest @ ..] => (u16::from_be_bytes([*first, *second]), rest),
        _ => return Err(PppError::SegmentTooShort(rest.len())),
    };

    Ok(PppFrame {
        protocol,
        payload: Bytes::copy_from_slice(payload),
        fcs_ok,
    })
}
