use byteorder::{BigEndian, ReadBytesExt};
use bytes::BufMut;
use std::io::Cursor;

use crate::message::*;
use crate::ofp_header::{OfpHeader, Xid, OFP_HEADER_LENGTH, OPENFLOW_0_01_VERSION,
                        OPENFLOW_0_04_VERSION};
use crate::ofp_message::{ensure_remaining, OfpSerializationError, OfpVersionCodec};
use crate::ofp_utils::{read_fixed_size_string, remaining, skip_bytes, write_padding_bytes};
use crate::openflow::MsgCode;
use crate::openflow0x01::Codec0x01;
use crate::openflow0x04::Codec0x04;

const DESC_STR_LENGTH: usize = 256;
const SERIAL_NUM_LENGTH: usize = 32;
const OFPHET_VERSIONBITMAP: u16 = 1;

/// Parse one complete frame (header included).
pub fn parse_frame(frame: &[u8]) -> Result<(OfpHeader, Message), OfpSerializationError> {
    let header = OfpHeader::parse(frame)?;
    if header.length() < OFP_HEADER_LENGTH || frame.len() < header.length() {
        return Err(OfpSerializationError::Truncated {
            message: "message".to_string(),
            expected: header.length(),
            available: frame.len(),
        });
    }
    let message = parse(&header, &frame[OFP_HEADER_LENGTH..header.length()])?;
    Ok((header, message))
}

/// Parse a message body. Versions the controller does not speak can still be read as
/// far as Hello and Error go, which is all version negotiation needs.
pub fn parse(header: &OfpHeader, body: &[u8]) -> Result<Message, OfpSerializationError> {
    match header.version() {
        OPENFLOW_0_01_VERSION => parse_with::<Codec0x01>(header, body),
        OPENFLOW_0_04_VERSION => parse_with::<Codec0x04>(header, body),
        v => {
            match header.type_code()? {
                MsgCode::Hello => Ok(Message::Hello(parse_hello(body)?)),
                MsgCode::Error => Ok(Message::Error(parse_error(body)?)),
                _ => Err(OfpSerializationError::UnsupportedVersion { version: v }),
            }
        }
    }
}

fn parse_with<C: OfpVersionCodec>(header: &OfpHeader, body: &[u8])
    -> Result<Message, OfpSerializationError> {
    let message = match header.type_code()? {
        MsgCode::Hello => Message::Hello(parse_hello(body)?),
        MsgCode::Error => Message::Error(parse_error(body)?),
        MsgCode::EchoReq => Message::EchoRequest(body.to_vec()),
        MsgCode::EchoResp => Message::EchoReply(body.to_vec()),
        MsgCode::FeaturesReq => Message::FeaturesReq,
        MsgCode::FeaturesResp => Message::FeaturesReply(C::parse_features_reply(body)?),
        MsgCode::SetConfig => Message::SetConfig(parse_switch_config(body)?),
        MsgCode::PacketIn => Message::PacketIn(C::parse_packet_in(body)?),
        MsgCode::PortStatus => Message::PortStatus(C::parse_port_status(body)?),
        MsgCode::StatsResp => Message::StatsReply(C::parse_stats_reply(body)?),
        MsgCode::BarrierReq => Message::BarrierRequest,
        MsgCode::BarrierResp => Message::BarrierReply,
        code => Message::Other(code, body.to_vec()),
    };
    Ok(message)
}

/// Parse hello elements, collecting the versions of any version bitmap.
pub fn parse_hello(body: &[u8]) -> Result<Hello, OfpSerializationError> {
    let mut bytes = Cursor::new(body);
    let mut versions = vec![];
    let mut bitmap = false;
    while remaining(&bytes) >= 4 {
        let typ = bytes.read_u16::<BigEndian>()?;
        let length = bytes.read_u16::<BigEndian>()? as usize;
        if length < 4 {
            return Err(OfpSerializationError::UnexpectedValueError {
                value: format!("{}", length),
                field: "element length".to_string(),
                message: "hello".to_string(),
            });
        }
        ensure_remaining(&bytes, length - 4, "hello element")?;
        if typ == OFPHET_VERSIONBITMAP {
            bitmap = true;
            for word in 0..(length - 4) / 4 {
                let bits = bytes.read_u32::<BigEndian>()?;
                for b in 0..32 {
                    let version = word * 32 + b;
                    // the header version field is a single byte
                    if (bits >> b) & 1 == 1 && version <= u8::MAX as usize {
                        versions.push(version as u8);
                    }
                }
            }
            skip_bytes(&mut bytes, (length - 4) % 4)?;
        } else {
            skip_bytes(&mut bytes, length - 4)?;
        }
        // Elements are padded to 8 bytes, the last one sometimes is not.
        let padding = (length + 7) / 8 * 8 - length;
        if remaining(&bytes) < padding {
            break;
        }
        skip_bytes(&mut bytes, padding)?;
    }
    Ok(Hello { versions, bitmap })
}

fn marshal_hello(hello: &Hello, bytes: &mut Vec<u8>) {
    if hello.versions.is_empty() {
        return;
    }
    let words = hello.versions.iter().max().map_or(1, |max| *max as usize / 32 + 1);
    let mut bitmaps = vec![0u32; words];
    for version in &hello.versions {
        bitmaps[*version as usize / 32] |= 1 << (*version as u32 % 32);
    }
    let length = 4 + 4 * words;
    bytes.put_u16(OFPHET_VERSIONBITMAP);
    bytes.put_u16(length as u16);
    for bitmap in bitmaps {
        bytes.put_u32(bitmap);
    }
    write_padding_bytes(bytes, (length + 7) / 8 * 8 - length);
}

fn parse_error(body: &[u8]) -> Result<ErrorMsg, OfpSerializationError> {
    let mut bytes = Cursor::new(body);
    ensure_remaining(&bytes, 4, "error")?;
    let error_type = bytes.read_u16::<BigEndian>()?;
    let code = bytes.read_u16::<BigEndian>()?;
    Ok(ErrorMsg {
        error_type,
        code,
        data: body[4..].to_vec(),
    })
}

fn parse_switch_config(body: &[u8]) -> Result<SwitchConfig, OfpSerializationError> {
    let mut bytes = Cursor::new(body);
    ensure_remaining(&bytes, 4, "switch config")?;
    Ok(SwitchConfig {
        flags: bytes.read_u16::<BigEndian>()?,
        miss_send_len: bytes.read_u16::<BigEndian>()?,
    })
}

fn marshal_body<C: OfpVersionCodec>(message: &Message, bytes: &mut Vec<u8>)
    -> Result<(), OfpSerializationError> {
    match message {
        Message::Hello(hello) => {
            // Version bitmaps only exist from 1.3 on.
            if C::VERSION >= OPENFLOW_0_04_VERSION {
                marshal_hello(hello, bytes);
            }
        },
        Message::Error(err) => {
            bytes.put_u16(err.error_type);
            bytes.put_u16(err.code);
            bytes.extend_from_slice(&err.data);
        },
        Message::EchoRequest(payload) | Message::EchoReply(payload) => {
            bytes.extend_from_slice(payload);
        },
        Message::FeaturesReq | Message::BarrierRequest | Message::BarrierReply => {},
        Message::SetConfig(config) => {
            bytes.put_u16(config.flags);
            bytes.put_u16(config.miss_send_len);
        },
        Message::StatsRequest(req) => C::marshal_stats_request(req, bytes)?,
        other => {
            return Err(OfpSerializationError::UnsupportedMessageCode {
                version: C::VERSION,
                code: other.msg_code(),
            });
        }
    }
    Ok(())
}

fn marshal_with<C: OfpVersionCodec>(version: u8, xid: Xid, message: &Message)
    -> Result<Vec<u8>, OfpSerializationError> {
    let typ = message.msg_code().to_wire(version)?;
    let mut body = vec![];
    marshal_body::<C>(message, &mut body)?;
    let length = OFP_HEADER_LENGTH + body.len();
    if length > u16::MAX as usize {
        return Err(OfpSerializationError::UnexpectedValueError {
            value: format!("{}", length),
            field: "length".to_string(),
            message: format!("{}", message.msg_code()),
        });
    }
    let mut bytes = Vec::with_capacity(length);
    OfpHeader::marshal(&mut bytes, OfpHeader::new(version, typ, length as u16, xid));
    bytes.extend(body);
    Ok(bytes)
}

/// Return a marshaled buffer containing an OpenFlow header and `message`.
pub fn marshal(version: u8, xid: Xid, message: &Message) -> Result<Vec<u8>, OfpSerializationError> {
    match version {
        OPENFLOW_0_01_VERSION => marshal_with::<Codec0x01>(version, xid, message),
        OPENFLOW_0_04_VERSION => marshal_with::<Codec0x04>(version, xid, message),
        v => {
            // A hello-failed error must still reach peers speaking other versions.
            match message {
                Message::Hello(_) | Message::Error(_) =>
                    marshal_with::<Codec0x01>(v, xid, message),
                _ => Err(OfpSerializationError::UnsupportedVersion { version: v }),
            }
        }
    }
}

pub fn parse_flow_stats(version: u8, body: &[u8]) -> Result<Vec<FlowStats>, OfpSerializationError> {
    match version {
        OPENFLOW_0_01_VERSION => Codec0x01::parse_flow_stats(body),
        OPENFLOW_0_04_VERSION => Codec0x04::parse_flow_stats(body),
        v => Err(OfpSerializationError::UnsupportedVersion { version: v }),
    }
}

pub fn parse_port_stats(version: u8, body: &[u8]) -> Result<Vec<PortStats>, OfpSerializationError> {
    match version {
        OPENFLOW_0_01_VERSION => Codec0x01::parse_port_stats(body),
        OPENFLOW_0_04_VERSION => Codec0x04::parse_port_stats(body),
        v => Err(OfpSerializationError::UnsupportedVersion { version: v }),
    }
}

pub fn parse_port_descs(version: u8, body: &[u8]) -> Result<Vec<PortDesc>, OfpSerializationError> {
    match version {
        OPENFLOW_0_01_VERSION => Codec0x01::parse_port_descs(body),
        OPENFLOW_0_04_VERSION => Codec0x04::parse_port_descs(body),
        v => Err(OfpSerializationError::UnsupportedVersion { version: v }),
    }
}

/// Parse a description reply body. The layout is the same in every version.
pub fn parse_description(body: &[u8]) -> Result<SwitchDescription, OfpSerializationError> {
    let mut bytes = Cursor::new(body);
    Ok(SwitchDescription {
        manufacturer_desc: read_fixed_size_string(&mut bytes, DESC_STR_LENGTH)?,
        hardware_desc: read_fixed_size_string(&mut bytes, DESC_STR_LENGTH)?,
        software_desc: read_fixed_size_string(&mut bytes, DESC_STR_LENGTH)?,
        serial_number: read_fixed_size_string(&mut bytes, SERIAL_NUM_LENGTH)?,
        datapath_desc: read_fixed_size_string(&mut bytes, DESC_STR_LENGTH)?,
    })
}
