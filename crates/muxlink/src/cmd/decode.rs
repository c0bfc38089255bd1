use std::collections::BTreeMap;
use std::io::Read;

use muxlink_cmux::FrameType;
use muxlink_ppp::{ControlMessage, ControlProtocol, PppPacket};

use crate::cmd::DecodeArgs;
use crate::exit::{CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::output::{parse_hex, print_frame, OutputFormat, PppOutput};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let text = match args.hex {
        Some(text) => text,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(|err| CliError::new(DATA_INVALID, format!("reading stdin: {err}")))?;
            buf
        }
    };

    let bytes = parse_hex(&text)
        .ok_or_else(|| CliError::new(USAGE, "input is not a hex byte dump"))?;

    let mut cmux_deframer = muxlink_cmux::Deframer::new();
    // PPP reassembly spans UIH frames, so keep one deframer per DLCI.
    let mut ppp_deframers: BTreeMap<u8, muxlink_ppp::Deframer> = BTreeMap::new();
    let mut decoded_any = false;

    for raw in cmux_deframer.feed(&bytes) {
        let frame = match muxlink_cmux::decode_frame(&raw) {
            Ok(frame) => frame,
            Err(err) => {
                eprintln!("skipping malformed frame: {err}");
                continue;
            }
        };
        decoded_any = true;

        let mut ppp_entries = Vec::new();
        if frame.frame_type == FrameType::Uih {
            let deframer = ppp_deframers.entry(frame.dlci).or_default();
            for segment in deframer.feed(&frame.payload) {
                match muxlink_ppp::decode_segment(&segment) {
                    Ok(decoded) => ppp_entries.push(describe_ppp(&decoded)),
                    Err(err) => eprintln!("skipping malformed ppp segment: {err}"),
                }
            }
        }
        print_frame(&frame, ppp_entries, format);
    }

    if !decoded_any {
        return Err(CliError::new(
            DATA_INVALID,
            "no complete CMUX frame in input",
        ));
    }
    Ok(SUCCESS)
}

fn describe_ppp(frame: &muxlink_ppp::PppFrame) -> PppOutput {
    let (protocol_name, detail) = match PppPacket::from_frame(frame) {
        Ok(PppPacket::Lcp(msg)) => ("LCP".to_string(), describe_control(&msg)),
        Ok(PppPacket::Ipcp(msg)) => ("IPCP".to_string(), describe_control(&msg)),
        Ok(PppPacket::Ipv6cp(msg)) => ("IPv6CP".to_string(), describe_control(&msg)),
        Ok(PppPacket::Pap(msg)) => ("PAP".to_string(), describe_control(&msg)),
        Ok(PppPacket::Other { protocol, payload }) => (
            format!("{protocol:#06x}"),
            format!("{} data bytes", payload.len()),
        ),
        Err(err) => (
            ControlProtocol::from_number(frame.protocol)
                .map(|p| p.to_string())
                .unwrap_or_else(|| format!("{:#06x}", frame.protocol)),
            format!("unparseable: {err}"),
        ),
    };

    PppOutput {
        protocol: frame.protocol,
        protocol_name,
        fcs_ok: frame.fcs_ok,
        detail,
    }
}

fn describe_control(message: &ControlMessage) -> String {
    format!(
        "{:?} id={} data[{}]",
        message.code,
        message.identifier,
        message.data.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;

    #[test]
    fn decodes_the_reference_frame() {
        let args = DecodeArgs {
            hex: Some("f903ef03c316f9".to_string()),
        };
        assert_eq!(run(args, OutputFormat::Pretty).unwrap(), SUCCESS);
    }

    #[test]
    fn rejects_non_hex_input() {
        let args = DecodeArgs {
            hex: Some("not hex at all!".to_string()),
        };
        let err = run(args, OutputFormat::Pretty).unwrap_err();
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn rejects_flagless_input() {
        let args = DecodeArgs {
            hex: Some("0102030405060708".to_string()),
        };
        let err = run(args, OutputFormat::Json).unwrap_err();
        assert_eq!(err.code, DATA_INVALID);
    }
}
