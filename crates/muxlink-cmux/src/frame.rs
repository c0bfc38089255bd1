use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{CmuxError, Result};
use crate::fcs;

/// Frame delimiter octet.
pub const FLAG: u8 = 0xF9;

/// Maximum payload length with single-octet (EA=1) length encoding.
pub const MAX_PAYLOAD: usize = 127;

/// Highest DLCI representable in the 6-bit address field.
pub const MAX_DLCI: u8 = 63;

/// Poll/final bit within the control octet.
const PF_BIT: u8 = 0x10;

/// Frame types carried in the control octet (base value, PF bit masked out).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    /// Set Asynchronous Balanced Mode: opens a DLCI.
    Sabm,
    /// Unnumbered Acknowledgement: confirms a SABM.
    Ua,
    /// Disconnected Mode: DLCI refused or not open.
    Dm,
    /// Unnumbered Information with Header check: payload carrier.
    Uih,
}

impl FrameType {
    /// Control octet base value (without the PF bit).
    pub fn base(self) -> u8 {
        match self {
            FrameType::Sabm => 0x2F,
            FrameType::Ua => 0x63,
            FrameType::Dm => 0x0F,
            FrameType::Uih => 0xEF,
        }
    }

    fn from_base(base: u8) -> Option<Self> {
        match base {
            0x2F => Some(FrameType::Sabm),
            0x63 => Some(FrameType::Ua),
            0x0F => Some(FrameType::Dm),
            0xEF => Some(FrameType::Uih),
            _ => None,
        }
    }

    /// Whether the FCS covers the payload in addition to the header.
    ///
    /// UIH frames exclude the payload from the FCS per GSM 07.10, so
    /// payload corruption is not detectable on them. The device under
    /// test computes it the same way.
    pub fn fcs_covers_payload(self) -> bool {
        !matches!(self, FrameType::Uih)
    }
}

/// A decoded CMUX frame.
#[derive(Debug, Clone)]
pub struct CmuxFrame {
    /// Data Link Connection Identifier (0-63).
    pub dlci: u8,
    /// Command/response bit from the address octet.
    pub cr: bool,
    /// Frame type from the control octet.
    pub frame_type: FrameType,
    /// Poll/final bit from the control octet.
    pub poll_final: bool,
    /// Information field (empty for SABM/UA/DM).
    pub payload: Bytes,
    /// Whether the received FCS matched the recomputed one.
    ///
    /// Reported as a flag rather than an error so the caller decides
    /// drop policy per frame type.
    pub fcs_ok: bool,
}

fn address_octet(dlci: u8, cr: bool) -> u8 {
    ((dlci & 0x3F) << 2) | (u8::from(cr) << 1) | 1
}

/// Encode one frame into the wire format, appending to `dst`.
///
/// Wire layout: `F9 | addr | ctrl | len | payload | fcs | F9`, with the
/// single-octet (EA=1) length encoding only.
pub fn encode_frame(
    dst: &mut BytesMut,
    dlci: u8,
    cr: bool,
    frame_type: FrameType,
    poll_final: bool,
    payload: &[u8],
) -> Result<()> {
    if payload.len() > MAX_PAYLOAD {
        return Err(CmuxError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    if dlci > MAX_DLCI {
        return Err(CmuxError::InvalidDlci(dlci));
    }

    let addr = address_octet(dlci, cr);
    let ctrl = frame_type.base() | if poll_final { PF_BIT } else { 0 };
    let len = ((payload.len() as u8) << 1) | 1;

    let mut check = BytesMut::with_capacity(3 + payload.len());
    check.put_slice(&[addr, ctrl, len]);
    if frame_type.fcs_covers_payload() {
        check.put_slice(payload);
    }
    let fcs = fcs::fcs(&check);

    dst.reserve(6 + payload.len());
    dst.put_u8(FLAG);
    dst.put_slice(&[addr, ctrl, len]);
    dst.put_slice(payload);
    dst.put_u8(fcs);
    dst.put_u8(FLAG);
    Ok(())
}

/// Decode one raw flag-to-flag frame.
///
/// Format violations (missing flags, extended length, size mismatch) are
/// errors; an FCS mismatch is not and only clears [`CmuxFrame::fcs_ok`].
pub fn decode_frame(raw: &[u8]) -> Result<CmuxFrame> {
    if raw.len() < 6 {
        return Err(CmuxError::Truncated(raw.len()));
    }
    if raw[0] != FLAG || raw[raw.len() - 1] != FLAG {
        return Err(CmuxError::MissingFlag);
    }

    let addr = raw[1];
    let ctrl = raw[2];
    let len_octet = raw[3];

    if len_octet & 0x01 == 0 {
        return Err(CmuxError::ExtendedLength);
    }
    let declared = (len_octet >> 1) as usize;

    // flag + addr + ctrl + len + payload + fcs + flag
    if raw.len() != declared + 6 {
        return Err(CmuxError::LengthMismatch { declared });
    }

    let frame_type =
        FrameType::from_base(ctrl & !PF_BIT).ok_or(CmuxError::UnknownControl(ctrl))?;

    let payload = &raw[4..4 + declared];
    let received_fcs = raw[4 + declared];

    let fcs_ok = if frame_type.fcs_covers_payload() {
        let mut check = BytesMut::with_capacity(3 + declared);
        check.put_slice(&[addr, ctrl, len_octet]);
        check.put_slice(payload);
        fcs::check(&check, received_fcs)
    } else {
        fcs::check(&[addr, ctrl, len_octet], received_fcs)
    };

    Ok(CmuxFrame {
        dlci: (addr >> 2) & 0x3F,
        cr: addr & 0x02 != 0,
        frame_type,
        poll_final: ctrl & PF_BIT != 0,
        payload: Bytes::copy_from_slice(payload),
        fcs_ok,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(dlci: u8, cr: bool, ft: FrameType, pf: bool, payload: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_frame(&mut buf, dlci, cr, ft, pf, payload).unwrap();
        buf
    }

    #[test]
    fn kernel_doc_reference_vector() {
        let wire = encode(0, true, FrameType::Uih, false, b"\xC3");
        assert_eq!(wire.as_ref(), &[0xF9, 0x03, 0xEF, 0x03, 0xC3, 0x16, 0xF9]);
    }

    #[test]
    fn sabm_reference_vector() {
        let wire = encode(0, true, FrameType::Sabm, true, b"");
        assert_eq!(wire.as_ref(), &[0xF9, 0x03, 0x3F, 0x01, 0x1C, 0xF9]);
    }

    #[test]
    fn uih_roundtrip_recovers_fields() {
        let payload: Vec<u8> = (0..=126).collect();
        let wire = encode(5, true, FrameType::Uih, false, &payload);
        let frame = decode_frame(&wire).unwrap();

        assert_eq!(frame.dlci, 5);
        assert!(frame.cr);
        assert_eq!(frame.frame_type, FrameType::Uih);
        assert!(!frame.poll_final);
        assert_eq!(frame.payload.as_ref(), payload.as_slice());
        assert!(frame.fcs_ok);
    }

    #[test]
    fn empty_payload_roundtrip() {
        let wire = encode(2, false, FrameType::Ua, true, b"");
        let frame = decode_frame(&wire).unwrap();

        assert_eq!(frame.dlci, 2);
        assert!(!frame.cr);
        assert_eq!(frame.frame_type, FrameType::Ua);
        assert!(frame.poll_final);
        assert!(frame.payload.is_empty());
        assert!(frame.fcs_ok);
    }

    #[test]
    fn oversized_payload_rejected() {
        let payload = vec![0u8; MAX_PAYLOAD + 1];
        let mut buf = BytesMut::new();
        let err = encode_frame(&mut buf, 1, true, FrameType::Uih, false, &payload).unwrap_err();
        assert!(matches!(err, CmuxError::PayloadTooLarge { size: 128, .. }));
        assert!(buf.is_empty());
    }

    #[test]
    fn max_payload_accepted() {
        let payload = vec![0xAA; MAX_PAYLOAD];
        let wire = encode(1, true, FrameType::Uih, false, &payload);
        let frame = decode_frame(&wire).unwrap();
        assert_eq!(frame.payload.len(), MAX_PAYLOAD);
    }

    #[test]
    fn invalid_dlci_rejected() {
        let mut buf = BytesMut::new();
        let err = encode_frame(&mut buf, 64, true, FrameType::Sabm, true, b"").unwrap_err();
        assert!(matches!(err, CmuxError::InvalidDlci(64)));
    }

    #[test]
    fn truncated_frame_rejected() {
        let err = decode_frame(&[0xF9, 0x03, 0xEF, 0xF9]).unwrap_err();
        assert!(matches!(err, CmuxError::Truncated(4)));
    }

    #[test]
    fn missing_flags_rejected() {
        let mut wire = encode(0, true, FrameType::Uih, false, b"\xC3");
        wire[0] = 0x00;
        assert!(matches!(
            decode_frame(&wire).unwrap_err(),
            CmuxError::MissingFlag
        ));
    }

    #[test]
    fn extended_length_rejected() {
        // Length octet with EA=0 declares a second length octet.
        let wire = [0xF9, 0x03, 0xEF, 0x02, 0x00, 0x16, 0xF9];
        assert!(matches!(
            decode_frame(&wire).unwrap_err(),
            CmuxError::ExtendedLength
        ));
    }

    #[test]
    fn length_mismatch_rejected() {
        // Declares 2 payload bytes but carries 1.
        let wire = [0xF9, 0x03, 0xEF, 0x05, 0xC3, 0x16, 0xF9];
        assert!(matches!(
            decode_frame(&wire).unwrap_err(),
            CmuxError::LengthMismatch { declared: 2 }
        ));
    }

    #[test]
    fn unknown_control_rejected() {
        let mut wire = encode(0, true, FrameType::Uih, false, b"");
        wire[2] = 0x11;
        assert!(matches!(
            decode_frame(&wire).unwrap_err(),
            CmuxError::UnknownControl(0x11)
        ));
    }

    #[test]
    fn corrupt_header_clears_fcs_ok() {
        let mut wire = encode(1, true, FrameType::Uih, false, b"ok");
        wire[1] ^= 0x04; // flip a DLCI bit, FCS no longer matches
        let frame = decode_frame(&wire).unwrap();
        assert!(!frame.fcs_ok);
    }

    #[test]
    fn uih_payload_corruption_passes_fcs() {
        // UIH FCS excludes the payload; corruption there must go unnoticed.
        let mut wire = encode(1, true, FrameType::Uih, false, b"ok");
        wire[4] ^= 0xFF;
        let frame = decode_frame(&wire).unwrap();
        assert!(frame.fcs_ok);
    }

    #[test]
    fn sabm_payload_corruption_fails_fcs() {
        // Non-UIH frames cover the payload, so the same corruption is caught.
        let mut wire = encode(1, true, FrameType::Sabm, true, b"x");
        wire[4] ^= 0xFF;
        let frame = decode_frame(&wire).unwrap();
        assert!(!frame.fcs_ok);
    }

    #[test]
    fn cr_bit_roundtrip() {
        for cr in [false, true] {
            let wire = encode(3, cr, FrameType::Uih, false, b"z");
            assert_eq!(decode_frame(&wire).unwrap().cr, cr);
        }
    }
}
