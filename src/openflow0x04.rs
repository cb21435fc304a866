use byteorder::{BigEndian, ReadBytesExt};
use bytes::{BufMut, Bytes};
use std::io::Cursor;

use crate::message::*;
use crate::ofp_header::OPENFLOW_0_04_VERSION;
use crate::ofp_message::{ensure_remaining, OfpSerializationError, OfpVersionCodec};
use crate::ofp_utils::{read_fixed_size_string, remaining, skip_bytes, write_padding_bytes};
use crate::packet::read_mac;

pub const ALL_TABLES: u8 = 0xff;

const OFP_MAX_PORT_NAME_LEN: usize = 16;
const OFP_PORT_LENGTH: usize = 64;
const OFP_SWITCH_FEATURES_LENGTH: usize = 24;
const OFP_PACKET_IN_LENGTH: usize = 16;
const OFP_MULTIPART_REPLY_LENGTH: usize = 8;
const OFP_FLOW_STATS_LENGTH: usize = 56;
const OFP_PORT_STATS_LENGTH: usize = 112;

const OFPMT_OXM: u16 = 1;
const OFPXMC_OPENFLOW_BASIC: u16 = 0x8000;
const OFPXMT_OFB_IN_PORT: u8 = 0;
const NO_BUFFER: u32 = 0xffff_ffff;

#[repr(u32)]
pub enum OfpPort {
    OFPPMax = 0xffffff00,
    OFPPInPort = 0xfffffff8,
    OFPPTable = 0xfffffff9,
    OFPPNormal = 0xfffffffa,
    OFPPFlood = 0xfffffffb,
    OFPPAll = 0xfffffffc,
    OFPPController = 0xfffffffd,
    OFPPLocal = 0xfffffffe,
    OFPPAny = 0xffffffff,
}

#[repr(u32)]
pub enum OfpGroup {
    OFPGAny = 0xffffffff,
}

/// OpenFlow 1.3 body layouts.
pub struct Codec0x04;

fn read_counter(bytes: &mut Cursor<&[u8]>) -> Result<TransmissionCounter, OfpSerializationError> {
    let rx = bytes.read_u64::<BigEndian>()?;
    let tx = bytes.read_u64::<BigEndian>()?;
    Ok(TransmissionCounter { rx, tx })
}

/// An empty OXM match, matching every packet.
fn marshal_match_all(bytes: &mut Vec<u8>) {
    bytes.put_u16(OFPMT_OXM);
    bytes.put_u16(4);
    write_padding_bytes(bytes, 4);
}

/// Walk an OXM match and return the in-port field, if present. Leaves `bytes`
/// positioned after the match padding.
fn parse_match_in_port(bytes: &mut Cursor<&[u8]>) -> Result<Option<u32>, OfpSerializationError> {
    ensure_remaining(bytes, 4, "match")?;
    let _typ = bytes.read_u16::<BigEndian>()?;
    let length = bytes.read_u16::<BigEndian>()? as usize;
    if length < 4 {
        return Err(OfpSerializationError::UnexpectedValueError {
            value: format!("{}", length),
            field: "length".to_string(),
            message: "match".to_string(),
        });
    }
    let padded = (length + 7) / 8 * 8;
    ensure_remaining(bytes, padded - 4, "match")?;

    let start = bytes.position() as usize;
    let fields = &bytes.get_ref()[start..start + length - 4];
    let mut oxm = Cursor::new(fields);
    let mut in_port = None;
    while remaining(&oxm) >= 4 {
        let class = oxm.read_u16::<BigEndian>()?;
        let field = oxm.read_u8()? >> 1;
        let field_length = oxm.read_u8()? as usize;
        if class == OFPXMC_OPENFLOW_BASIC && field == OFPXMT_OFB_IN_PORT && field_length == 4 {
            in_port = Some(oxm.read_u32::<BigEndian>()?);
        } else {
            skip_bytes(&mut oxm, field_length)?;
        }
    }
    skip_bytes(bytes, padded - 4)?;
    Ok(in_port)
}

impl OfpVersionCodec for Codec0x04 {
    const VERSION: u8 = OPENFLOW_0_04_VERSION;
    const PORT_DESC_LENGTH: usize = OFP_PORT_LENGTH;

    fn parse_features_reply(buf: &[u8]) -> Result<SwitchFeatures, OfpSerializationError> {
        let mut bytes = Cursor::new(buf);
        ensure_remaining(&bytes, OFP_SWITCH_FEATURES_LENGTH, "features reply")?;
        let datapath_id = bytes.read_u64::<BigEndian>()?;
        let num_buffers = bytes.read_u32::<BigEndian>()?;
        let num_tables = bytes.read_u8()?;
        let auxiliary_id = bytes.read_u8()?;
        skip_bytes(&mut bytes, 2)?;
        let capabilities = bytes.read_u32::<BigEndian>()?;
        Ok(SwitchFeatures {
            datapath_id,
            num_buffers,
            num_tables,
            auxiliary_id,
            capabilities,
            ports: vec![],
        })
    }

    fn parse_port_desc(bytes: &mut Cursor<&[u8]>) -> Result<PortDesc, OfpSerializationError> {
        ensure_remaining(bytes, OFP_PORT_LENGTH, "port description")?;
        let port_no = bytes.read_u32::<BigEndian>()?;
        skip_bytes(bytes, 4)?;
        let hw_addr = read_mac(bytes)?;
        skip_bytes(bytes, 2)?;
        let name = read_fixed_size_string(bytes, OFP_MAX_PORT_NAME_LEN)?;
        let config = bytes.read_u32::<BigEndian>()?;
        let state = bytes.read_u32::<BigEndian>()?;
        let curr = bytes.read_u32::<BigEndian>()?;
        // advertised, supported, peer, curr_speed, max_speed
        skip_bytes(bytes, 20)?;
        Ok(PortDesc {
            port_no,
            hw_addr,
            name,
            config,
            state,
            curr,
        })
    }

    fn parse_packet_in(buf: &[u8]) -> Result<PacketIn, OfpSerializationError> {
        let mut bytes = Cursor::new(buf);
        ensure_remaining(&bytes, OFP_PACKET_IN_LENGTH, "packet in")?;
        let buffer_id = match bytes.read_u32::<BigEndian>()? {
            NO_BUFFER => None,
            n => Some(n),
        };
        let total_len = bytes.read_u16::<BigEndian>()?;
        let reason = bytes.read_u8()?;
        let _table_id = bytes.read_u8()?;
        let _cookie = bytes.read_u64::<BigEndian>()?;
        let in_port = parse_match_in_port(&mut bytes)?.ok_or_else(|| {
            OfpSerializationError::UnexpectedValueError {
                value: "none".to_string(),
                field: "in_port".to_string(),
                message: "packet in".to_string(),
            }
        })?;
        skip_bytes(&mut bytes, 2)?;
        let payload = buf[bytes.position() as usize..].to_vec();
        Ok(PacketIn {
            buffer_id,
            total_len,
            in_port,
            reason,
            payload,
        })
    }

    fn parse_stats_reply(buf: &[u8]) -> Result<StatsResp, OfpSerializationError> {
        let mut bytes = Cursor::new(buf);
        ensure_remaining(&bytes, OFP_MULTIPART_REPLY_LENGTH, "multipart reply")?;
        let kind = StatsKind::from_u16(bytes.read_u16::<BigEndian>()?);
        let flags = bytes.read_u16::<BigEndian>()?;
        let body = Bytes::copy_from_slice(&buf[OFP_MULTIPART_REPLY_LENGTH..]);
        Ok(StatsResp { kind, flags, body })
    }

    fn marshal_stats_request(req: &StatsReq, bytes: &mut Vec<u8>)
        -> Result<(), OfpSerializationError> {
        bytes.put_u16(req.kind.to_u16());
        bytes.put_u16(req.flags);
        write_padding_bytes(bytes, 4);
        match req.kind {
            StatsKind::Desc | StatsKind::Table | StatsKind::PortDesc => {},
            StatsKind::Flow | StatsKind::Aggregate => {
                bytes.put_u8(ALL_TABLES);
                write_padding_bytes(bytes, 3);
                bytes.put_u32(OfpPort::OFPPAny as u32);
                bytes.put_u32(OfpGroup::OFPGAny as u32);
                write_padding_bytes(bytes, 4);
                // cookie, cookie mask
                bytes.put_u64(0);
                bytes.put_u64(0);
                marshal_match_all(bytes);
            },
            StatsKind::Port => {
                bytes.put_u32(OfpPort::OFPPAny as u32);
                write_padding_bytes(bytes, 4);
            },
            other => {
                return Err(OfpSerializationError::UnexpectedValueError {
                    value: format!("{:?}", other),
                    field: "type".to_string(),
                    message: "multipart request".to_string(),
                });
            }
        }
        Ok(())
    }

    fn parse_flow_stats(body: &[u8]) -> Result<Vec<FlowStats>, OfpSerializationError> {
        let mut flow_stats = vec![];
        let mut offset = 0;
        while body.len() - offset >= 2 {
            let entry_length = ((body[offset] as usize) << 8) + body[offset + 1] as usize;
            if entry_length < OFP_FLOW_STATS_LENGTH {
                return Err(OfpSerializationError::UnexpectedValueError {
                    value: format!("{}", entry_length),
                    field: "length".to_string(),
                    message: "flow stats".to_string(),
                });
            }
            if body.len() - offset < entry_length {
                return Err(OfpSerializationError::Truncated {
                    message: "flow stats".to_string(),
                    expected: entry_length,
                    available: body.len() - offset,
                });
            }
            let mut flow = Cursor::new(&body[offset..offset + entry_length]);
            skip_bytes(&mut flow, 2)?;
            let table_id = flow.read_u8()?;
            skip_bytes(&mut flow, 1)?;
            let duration_sec = flow.read_u32::<BigEndian>()?;
            let duration_nsec = flow.read_u32::<BigEndian>()?;
            let priority = flow.read_u16::<BigEndian>()?;
            let idle_timeout = flow.read_u16::<BigEndian>()?;
            let hard_timeout = flow.read_u16::<BigEndian>()?;
            let _flags = flow.read_u16::<BigEndian>()?;
            skip_bytes(&mut flow, 4)?;
            let cookie = flow.read_u64::<BigEndian>()?;
            let packet_count = flow.read_u64::<BigEndian>()?;
            let byte_count = flow.read_u64::<BigEndian>()?;

            flow_stats.push(FlowStats {
                table_id,
                duration_sec,
                duration_nsec,
                priority,
                idle_timeout,
                hard_timeout,
                cookie,
                packet_count,
                byte_count,
            });
            offset += entry_length;
        }
        Ok(flow_stats)
    }

    fn parse_port_stats(body: &[u8]) -> Result<Vec<PortStats>, OfpSerializationError> {
        let mut bytes = Cursor::new(body);
        let mut port_stats = vec![];
        while remaining(&bytes) >= OFP_PORT_STATS_LENGTH {
            let port_no = bytes.read_u32::<BigEndian>()?;
            skip_bytes(&mut bytes, 4)?;
            let packets = read_counter(&mut bytes)?;
            let byte_counter = read_counter(&mut bytes)?;
            let dropped = read_counter(&mut bytes)?;
            let errors = read_counter(&mut bytes)?;
            port_stats.push(PortStats {
                port_no,
                packets,
                bytes: byte_counter,
                dropped,
                errors,
                rx_frame_errors: bytes.read_u64::<BigEndian>()?,
                rx_over_errors: bytes.read_u64::<BigEndian>()?,
                rx_crc_errors: bytes.read_u64::<BigEndian>()?,
                collisions: bytes.read_u64::<BigEndian>()?,
            });
            // duration_sec, duration_nsec
            skip_bytes(&mut bytes, 8)?;
        }
        Ok(port_stats)
    }
}
