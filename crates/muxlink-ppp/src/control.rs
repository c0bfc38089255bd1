use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{PppError, Result};
use crate::frame::{protocols, PppFrame};

/// The four control protocols the negotiation engine speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlProtocol {
    /// Link Control Protocol (0xC021).
    Lcp,
    /// IP Control Protocol (0x8021).
    Ipcp,
    /// IPv6 Control Protocol (0x8057).
    Ipv6cp,
    /// Password Authentication Protocol (0xC023).
    Pap,
}

impl ControlProtocol {
    /// Assigned PPP protocol number.
    pub fn number(self) -> u16 {
        match self {
            ControlProtocol::Lcp => protocols::LCP,
            ControlProtocol::Ipcp => protocols::IPCP,
            ControlProtocol::Ipv6cp => protocols::IPV6CP,
            ControlProtocol::Pap => protocols::PAP,
        }
    }

    /// Map a protocol number back to a control protocol.
    pub fn from_number(number: u16) -> Option<Self> {
        match number {
            protocols::LCP => Some(ControlProtocol::Lcp),
            protocols::IPCP => Some(ControlProtocol::Ipcp),
            protocols::IPV6CP => Some(ControlProtocol::Ipv6cp),
            protocols::PAP => Some(ControlProtocol::Pap),
            _ => None,
        }
    }
}

impl fmt::Display for ControlProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlProtocol::Lcp => "LCP",
            ControlProtocol::Ipcp => "IPCP",
            ControlProtocol::Ipv6cp => "IPv6CP",
            ControlProtocol::Pap => "PAP",
        };
        f.write_str(name)
    }
}

/// Control-message codes.
///
/// LCP/IPCP/IPv6CP share one code space; PAP reuses the numeric values
/// 1-3 with authentication semantics, so the mapping is per-protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCode {
    ConfigureRequest,
    ConfigureAck,
    ConfigureNak,
    ConfigureReject,
    TerminateRequest,
    TerminateAck,
    CodeReject,
    EchoRequest,
    EchoReply,
    AuthRequest,
    AuthAck,
    AuthNak,
}

impl ControlCode {
    /// Decode a code octet in the context of `protocol`.
    pub fn from_wire(protocol: ControlProtocol, code: u8) -> Option<Self> {
        if protocol == ControlProtocol::Pap {
            return match code {
                1 => Some(ControlCode::AuthRequest),
                2 => Some(ControlCode::AuthAck),
                3 => Some(ControlCode::AuthNak),
                _ => None,
            };
        }
        match code {
            1 => Some(ControlCode::ConfigureRequest),
            2 => Some(ControlCode::ConfigureAck),
            3 => Some(ControlCode::ConfigureNak),
            4 => Some(ControlCode::ConfigureReject),
            5 => Some(ControlCode::TerminateRequest),
            6 => Some(ControlCode::TerminateAck),
            7 => Some(ControlCode::CodeReject),
            9 => Some(ControlCode::EchoRequest),
            10 => Some(ControlCode::EchoReply),
            _ => None,
        }
    }

    /// Wire value of this code.
    pub fn to_wire(self) -> u8 {
        match self {
            ControlCode::ConfigureRequest | ControlCode::AuthRequest => 1,
            ControlCode::ConfigureAck | ControlCode::AuthAck => 2,
            ControlCode::ConfigureNak | ControlCode::AuthNak => 3,
            ControlCode::ConfigureReject => 4,
            ControlCode::TerminateRequest => 5,
            ControlCode::TerminateAck => 6,
            ControlCode::CodeReject => 7,
            ControlCode::EchoRequest => 9,
            ControlCode::EchoReply => 10,
        }
    }
}

/// One parsed control message: `code | identifier | length(16 BE) | data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    pub code: ControlCode,
    /// Echoed by the peer to correlate request and response.
    pub identifier: u8,
    /// Message body: configuration options, echo data, or auth fields.
    pub data: Bytes,
}

impl ControlMessage {
    /// Create a message with the given body.
    pub fn new(code: ControlCode, identifier: u8, data: impl Into<Bytes>) -> Self {
        Self {
            code,
            identifier,
            data: data.into(),
        }
    }

    /// Parse a control message out of a PPP information field.
    ///
    /// The declared 16-bit length is validated against the enclosing
    /// payload and never trusted beyond it; trailing padding after the
    /// declared length is ignored.
    pub fn parse(protocol: ControlProtocol, payload: &[u8]) -> Result<Self> {
        if payload.len() < 4 {
            return Err(PppError::MessageTooShort(payload.len()));
        }
        let code = ControlCode::from_wire(protocol, payload[0])
            .ok_or(PppError::UnknownCode {
                protocol,
                code: payload[0],
            })?;
        let identifier = payload[1];
        let declared = u16::from_be_bytes([payload[2], payload[3]]) as usize;
        if declared < 4 || declared > payload.len() {
            return Err(PppError::LengthOutOfRange {
                declared,
                available: payload.len(),
            });
        }

        Ok(Self {
            code,
            identifier,
            data: Bytes::copy_from_slice(&payload[4..declared]),
        })
    }

    /// Serialize to the wire layout.
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(4 + self.data.len());
        out.put_u8(self.code.to_wire());
        out.put_u8(self.identifier);
        out.put_u16((4 + self.data.len()) as u16);
        out.put_slice(&self.data);
        out.freeze()
    }
}

/// Option-kind constants per protocol.
pub mod options {
    /// LCP configuration options.
    pub mod lcp {
        pub const MRU: u8 = 1;
        pub const ACCM: u8 = 2;
        pub const MAGIC_NUMBER: u8 = 5;
        pub const PFC: u8 = 7;
        pub const ACFC: u8 = 8;
    }

    /// IPCP configuration options.
    pub mod ipcp {
        pub const ADDRESS: u8 = 3;
        pub const PRIMARY_DNS: u8 = 129;
        pub const SECONDARY_DNS: u8 = 131;
    }

    /// IPv6CP configuration options.
    pub mod ipv6cp {
        pub const INTERFACE_ID: u8 = 1;
    }
}

/// One configuration option TLV: `kind | length | value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigOption {
    pub kind: u8,
    pub data: Bytes,
}

impl ConfigOption {
    /// Create an option with the given value bytes.
    pub fn new(kind: u8, data: impl Into<Bytes>) -> Self {
        Self {
            kind,
            data: data.into(),
        }
    }

    /// Parse a packed option list; the declared per-option lengths
    /// include the 2-byte TLV header.
    pub fn parse_list(mut raw: &[u8]) -> Result<Vec<Self>> {
        let mut out = Vec::new();
        while !raw.is_empty() {
            if raw.len() < 2 {
                return Err(PppError::MalformedOption);
            }
            let kind = raw[0];
            let len = raw[1] as usize;
            if len < 2 || len > raw.len() {
                return Err(PppError::MalformedOption);
            }
            out.push(Self::new(kind, Bytes::copy_from_slice(&raw[2..len])));
            raw = &raw[len..];
        }
        Ok(out)
    }

    /// Serialize a list of options back into packed TLV form.
    pub fn encode_list(options: &[Self]) -> Bytes {
        let mut out = BytesMut::new();
        for opt in options {
            out.put_u8(opt.kind);
            out.put_u8((2 + opt.data.len()) as u8);
            out.put_slice(&opt.data);
        }
        out.freeze()
    }
}

/// A PPP frame lifted into its protocol layer.
///
/// Built from a decoded [`PppFrame`] so negotiation logic can match
/// exhaustively instead of comparing raw protocol numbers.
#[derive(Debug, Clone)]
pub enum PppPacket {
    Lcp(ControlMessage),
    Ipcp(ControlMessage),
    Ipv6cp(ControlMessage),
    Pap(ControlMessage),
    /// Any non-control protocol (e.g. IPv4/IPv6 data).
    Other { protocol: u16, payload: Bytes },
}

impl PppPacket {
    /// Classify a decoded frame, parsing the control header when the
    /// protocol is one of the four negotiated ones.
    pub fn from_frame(frame: &PppFrame) -> Result<Self> {
        match ControlProtocol::from_number(frame.protocol) {
            Some(protocol) => {
                let message = ControlMessage::parse(protocol, &frame.payload)?;
                Ok(match protocol {
                    ControlProtocol::Lcp => PppPacket::Lcp(message),
                    ControlProtocol::Ipcp => PppPacket::Ipcp(message),
                    ControlProtocol::Ipv6cp => PppPacket::Ipv6cp(message),
                    ControlProtocol::Pap => PppPacket::Pap(message),
                })
            }
            None => Ok(PppPacket::Other {
                protocol: frame.protocol,
                payload: frame.payload.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_reference_configure_request() {
        // ppp_stub.lcp_configure_request(): code=1 id=1 len=8, MRU 1500.
        let payload = [0x01, 0x01, 0x00, 0x08, 0x01, 0x04, 0x05, 0xDC];
        let msg = ControlMessage::parse(ControlProtocol::Lcp, &payload).unwrap();

        assert_eq!(msg.code, ControlCode::ConfigureRequest);
        assert_eq!(msg.identifier, 1);
        assert_eq!(msg.data.as_ref(), &[0x01, 0x04, 0x05, 0xDC]);

        let opts = ConfigOption::parse_list(&msg.data).unwrap();
        assert_eq!(opts.len(), 1);
        assert_eq!(opts[0].kind, options::lcp::MRU);
        assert_eq!(opts[0].data.as_ref(), &[0x05, 0xDC]);
    }

    #[test]
    fn encode_parse_roundtrip() {
        let msg = ControlMessage::new(
            ControlCode::ConfigureAck,
            0x42,
            Bytes::from_static(&[0x03, 0x06, 10, 0, 0, 1]),
        );
        let wire = msg.encode();
        assert_eq!(wire[0], 2);
        assert_eq!(wire[1], 0x42);
        assert_eq!(&wire[2..4], &[0x00, 0x0A]);

        let back = ControlMessage::parse(ControlProtocol::Ipcp, &wire).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn trailing_padding_ignored() {
        // Declared length 4, two junk bytes after it.
        let payload = [0x09, 0x01, 0x00, 0x04, 0xDE, 0xAD];
        let msg = ControlMessage::parse(ControlProtocol::Lcp, &payload).unwrap();
        assert_eq!(msg.code, ControlCode::EchoRequest);
        assert!(msg.data.is_empty());
    }

    #[test]
    fn length_beyond_payload_rejected() {
        let payload = [0x01, 0x01, 0x00, 0x20, 0x01];
        let err = ControlMessage::parse(ControlProtocol::Lcp, &payload).unwrap_err();
        assert!(matches!(
            err,
            PppError::LengthOutOfRange {
                declared: 32,
                available: 5
            }
        ));
    }

    #[test]
    fn undersized_length_rejected() {
        let payload = [0x01, 0x01, 0x00, 0x03, 0x00];
        assert!(ControlMessage::parse(ControlProtocol::Lcp, &payload).is_err());
    }

    #[test]
    fn pap_codes_mapped_separately() {
        let payload = [0x01, 0x07, 0x00, 0x04];
        let msg = ControlMessage::parse(ControlProtocol::Pap, &payload).unwrap();
        assert_eq!(msg.code, ControlCode::AuthRequest);

        let msg = ControlMessage::parse(ControlProtocol::Lcp, &payload).unwrap();
        assert_eq!(msg.code, ControlCode::ConfigureRequest);
    }

    #[test]
    fn unknown_code_rejected() {
        let payload = [0x0E, 0x01, 0x00, 0x04];
        let err = ControlMessage::parse(ControlProtocol::Lcp, &payload).unwrap_err();
        assert!(matches!(err, PppError::UnknownCode { code: 0x0E, .. }));

        // PAP only understands codes 1-3.
        let payload = [0x09, 0x01, 0x00, 0x04];
        assert!(ControlMessage::parse(ControlProtocol::Pap, &payload).is_err());
    }

    #[test]
    fn option_list_roundtrip() {
        let opts = vec![
            ConfigOption::new(options::ipcp::ADDRESS, Bytes::from_static(&[0, 0, 0, 0])),
            ConfigOption::new(
                options::ipcp::PRIMARY_DNS,
                Bytes::from_static(&[8, 8, 8, 8]),
            ),
        ];
        let packed = ConfigOption::encode_list(&opts);
        assert_eq!(ConfigOption::parse_list(&packed).unwrap(), opts);
    }

    #[test]
    fn malformed_option_rejected() {
        // Option length larger than remaining bytes.
        assert!(ConfigOption::parse_list(&[0x03, 0x06, 0x0A]).is_err());
        // Option length below the TLV header size.
        assert!(ConfigOption::parse_list(&[0x03, 0x01]).is_err());
        // Dangling single byte.
        assert!(ConfigOption::parse_list(&[0x03]).is_err());
    }

    #[test]
    fn packet_classification() {
        let frame = PppFrame {
            protocol: protocols::LCP,
            payload: Bytes::from_static(&[0x01, 0x03, 0x00, 0x04]),
            fcs_ok: true,
        };
        assert!(matches!(
            PppPacket::from_frame(&frame).unwrap(),
            PppPacket::Lcp(_)
        ));

        let frame = PppFrame {
            protocol: protocols::IPV4,
            payload: Bytes::from_static(&[0x45, 0x00]),
            fcs_ok: true,
        };
        assert!(matches!(
            PppPacket::from_frame(&frame).unwrap(),
            PppPacket::Other {
                protocol: protocols::IPV4,
                ..
            }
        ));
    }
}
