use byteorder::{BigEndian, ReadBytesExt};
use bytes::{BufMut, Bytes};
use std::io::Cursor;

use crate::message::*;
use crate::ofp_header::OPENFLOW_0_01_VERSION;
use crate::ofp_message::{ensure_remaining, OfpSerializationError, OfpVersionCodec};
use crate::ofp_utils::{read_fixed_size_string, remaining, skip_bytes, write_padding_bytes};
use crate::packet::read_mac;

pub const ALL_TABLES: u8 = 0xff;

const OFP_MAX_PORT_NAME_LEN: usize = 16;
const OFP_MATCH_LENGTH: usize = 40;
const OFP_PHY_PORT_LENGTH: usize = 48;
const OFP_SWITCH_FEATURES_LENGTH: usize = 24;
const OFP_PACKET_IN_LENGTH: usize = 10;
const OFP_STATS_REPLY_LENGTH: usize = 4;
const OFP_FLOW_STATS_LENGTH: usize = 88;
const OFP_PORT_STATS_LENGTH: usize = 104;

/// Every match field wildcarded.
const OFPFW_ALL: u32 = (1 << 22) - 1;
const NO_BUFFER: u32 = 0xffff_ffff;

#[repr(u16)]
pub enum OfpPort {
    OFPPMax = 0xff00,
    OFPPInPort = 0xfff8,
    OFPPTable = 0xfff9,
    OFPPNormal = 0xfffa,
    OFPPFlood = 0xfffb,
    OFPPAll = 0xfffc,
    OFPPController = 0xfffd,
    OFPPLocal = 0xfffe,
    OFPPNone = 0xffff,
}

/// OpenFlow 1.0 body layouts.
pub struct Codec0x01;

fn read_counter(bytes: &mut Cursor<&[u8]>) -> Result<TransmissionCounter, OfpSerializationError> {
    let rx = bytes.read_u64::<BigEndian>()?;
    let tx = bytes.read_u64::<BigEndian>()?;
    Ok(TransmissionCounter { rx, tx })
}

fn marshal_match_all(bytes: &mut Vec<u8>) {
    bytes.put_u32(OFPFW_ALL);
    write_padding_bytes(bytes, OFP_MATCH_LENGTH - 4);
}

impl OfpVersionCodec for Codec0x01 {
    const VERSION: u8 = OPENFLOW_0_01_VERSION;
    const PORT_DESC_LENGTH: usize = OFP_PHY_PORT_LENGTH;

    fn parse_features_reply(buf: &[u8]) -> Result<SwitchFeatures, OfpSerializationError> {
        let mut bytes = Cursor::new(buf);
        ensure_remaining(&bytes, OFP_SWITCH_FEATURES_LENGTH, "features reply")?;
        let datapath_id = bytes.read_u64::<BigEndian>()?;
        let num_buffers = bytes.read_u32::<BigEndian>()?;
        let num_tables = bytes.read_u8()?;
        skip_bytes(&mut bytes, 3)?;
        let capabilities = bytes.read_u32::<BigEndian>()?;
        let _actions = bytes.read_u32::<BigEndian>()?;
        let ports = {
            let mut v = vec![];
            let num_ports = remaining(&bytes) / OFP_PHY_PORT_LENGTH;
            for _ in 0..num_ports {
                v.push(Self::parse_port_desc(&mut bytes)?);
            }
            v
        };
        Ok(SwitchFeatures {
            datapath_id,
            num_buffers,
            num_tables,
            auxiliary_id: 0,
            capabilities,
            ports,
        })
    }

    fn parse_port_desc(bytes: &mut Cursor<&[u8]>) -> Result<PortDesc, OfpSerializationError> {
        ensure_remaining(bytes, OFP_PHY_PORT_LENGTH, "port description")?;
        let port_no = bytes.read_u16::<BigEndian>()? as u32;
        let hw_addr = read_mac(bytes)?;
        let name = read_fixed_size_string(bytes, OFP_MAX_PORT_NAME_LEN)?;
        let config = bytes.read_u32::<BigEndian>()?;
        let state = bytes.read_u32::<BigEndian>()?;
        let curr = bytes.read_u32::<BigEndian>()?;
        // advertised, supported, peer
        skip_bytes(bytes, 12)?;
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
        let in_port = bytes.read_u16::<BigEndian>()? as u32;
        let reason = bytes.read_u8()?;
        skip_bytes(&mut bytes, 1)?;
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
        ensure_remaining(&bytes, OFP_STATS_REPLY_LENGTH, "stats reply")?;
        let kind = StatsKind::from_u16(bytes.read_u16::<BigEndian>()?);
        let flags = bytes.read_u16::<BigEndian>()?;
        let body = Bytes::copy_from_slice(&buf[OFP_STATS_REPLY_LENGTH..]);
        Ok(StatsResp { kind, flags, body })
    }

    fn marshal_stats_request(req: &StatsReq, bytes: &mut Vec<u8>)
        -> Result<(), OfpSerializationError> {
        bytes.put_u16(req.kind.to_u16());
        bytes.put_u16(req.flags);
        match req.kind {
            StatsKind::Desc | StatsKind::Table => {},
            StatsKind::Flow | StatsKind::Aggregate => {
                marshal_match_all(bytes);
                bytes.put_u8(ALL_TABLES);
                write_padding_bytes(bytes, 1);
                bytes.put_u16(OfpPort::OFPPNone as u16);
            },
            StatsKind::Port => {
                bytes.put_u16(OfpPort::OFPPNone as u16);
                write_padding_bytes(bytes, 6);
            },
            other => {
                return Err(OfpSerializationError::UnexpectedValueError {
                    value: format!("{:?}", other),
                    field: "type".to_string(),
                    message: "stats request".to_string(),
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
            skip_bytes(&mut flow, 1 + OFP_MATCH_LENGTH)?;
            let duration_sec = flow.read_u32::<BigEndian>()?;
            let duration_nsec = flow.read_u32::<BigEndian>()?;
            let priority = flow.read_u16::<BigEndian>()?;
            let idle_timeout = flow.read_u16::<BigEndian>()?;
            let hard_timeout = flow.read_u16::<BigEndian>()?;
            skip_bytes(&mut flow, 6)?;
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
            let port_no = bytes.read_u16::<BigEndian>()? as u32;
            skip_bytes(&mut bytes, 6)?;
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
        }
        Ok(port_stats)
    }
}
