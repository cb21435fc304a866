use byteorder::ReadBytesExt;
use bytes::Bytes;
use std::io;
use std::io::Cursor;

use crate::message::{FlowStats, PacketIn, PortDesc, PortReason, PortStats, PortStatus, StatsReq,
                     StatsResp, SwitchFeatures};
use crate::ofp_utils::{remaining, skip_bytes};
use crate::openflow::MsgCode;

#[derive(Debug, Fail)]
pub enum OfpSerializationError {
    #[fail(display = "IO Error: {}", error)]
    IoError {
        #[cause]
        error: io::Error,
    },
    #[fail(display = "Truncated {}: expected {} bytes, {} available", message, expected, available)]
    Truncated {
        message: String,
        expected: usize,
        available: usize,
    },
    #[fail(display = "Unexpected value '{}' at field '{}' of '{}'", value, field, message)]
    UnexpectedValueError {
        value: String,
        field: String,
        message: String,
    },
    #[fail(display = "Unsupported OpenFlow version: {}", version)]
    UnsupportedVersion {
        version: u8
    },
    #[fail(display = "Unsupported OpenFlow message code {} for version: {}", code, version)]
    UnsupportedMessageCode {
        version: u8,
        code: MsgCode
    }
}

impl From<io::Error> for OfpSerializationError {
    fn from(error: io::Error) -> Self {
        OfpSerializationError::IoError { error }
    }
}

pub(crate) fn ensure_remaining(bytes: &Cursor<&[u8]>, expected: usize, message: &str)
    -> Result<(), OfpSerializationError> {
    let available = remaining(bytes);
    if available < expected {
        return Err(OfpSerializationError::Truncated {
            message: message.to_string(),
            expected,
            available,
        });
    }
    Ok(())
}

/// Version-specific body layouts.
///
/// Everything above the codec works with the version-agnostic types of `message`; an
/// implementation of this trait exists for each protocol version the controller speaks.
pub trait OfpVersionCodec {
    const VERSION: u8;
    /// Wire size of one port description.
    const PORT_DESC_LENGTH: usize;

    fn parse_features_reply(buf: &[u8]) -> Result<SwitchFeatures, OfpSerializationError>;

    fn parse_port_desc(bytes: &mut Cursor<&[u8]>) -> Result<PortDesc, OfpSerializationError>;

    fn parse_packet_in(buf: &[u8]) -> Result<PacketIn, OfpSerializationError>;

    /// Parse the fixed part of a stats/multipart reply, keeping its body raw.
    fn parse_stats_reply(buf: &[u8]) -> Result<StatsResp, OfpSerializationError>;

    fn marshal_stats_request(req: &StatsReq, bytes: &mut Vec<u8>)
        -> Result<(), OfpSerializationError>;

    /// Parse the concatenated bodies of a flow stats reply.
    fn parse_flow_stats(body: &[u8]) -> Result<Vec<FlowStats>, OfpSerializationError>;

    /// Parse the concatenated bodies of a port stats reply.
    fn parse_port_stats(body: &[u8]) -> Result<Vec<PortStats>, OfpSerializationError>;

    fn parse_port_status(buf: &[u8]) -> Result<PortStatus, OfpSerializationError> {
        let mut bytes = Cursor::new(buf);
        ensure_remaining(&bytes, 8 + Self::PORT_DESC_LENGTH, "port status")?;
        let reason = match bytes.read_u8()? {
            0 => PortReason::PortAdd,
            1 => PortReason::PortDelete,
            2 => PortReason::PortModify,
            other => {
                return Err(OfpSerializationError::UnexpectedValueError {
                    value: format!("{}", other),
                    field: "reason".to_string(),
                    message: "port status".to_string(),
                });
            }
        };
        skip_bytes(&mut bytes, 7)?;
        let desc = Self::parse_port_desc(&mut bytes)?;
        Ok(PortStatus { reason, desc })
    }

    /// Parse a sequence of port descriptions, as found in a port-desc reply body.
    fn parse_port_descs(body: &[u8]) -> Result<Vec<PortDesc>, OfpSerializationError> {
        let mut bytes = Cursor::new(body);
        let mut ports = vec![];
        while remaining(&bytes) >= Self::PORT_DESC_LENGTH {
            ports.push(Self::parse_port_desc(&mut bytes)?);
        }
        Ok(ports)
    }
}

/// Concatenate reply fragments into one contiguous body.
pub fn join_fragments(fragments: &[Bytes]) -> Vec<u8> {
    let mut body = Vec::with_capacity(fragments.iter().map(|f| f.len()).sum());
    for fragment in fragments {
        body.extend_from_slice(fragment);
    }
    body
}
