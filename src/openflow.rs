use std::fmt::{Display, Error, Formatter};

use crate::ofp_header::{OPENFLOW_0_01_VERSION, OPENFLOW_0_04_VERSION};
use crate::ofp_message::OfpSerializationError;

/// OpenFlow message type codes, used by headers to identify meaning of the rest of a message.
///
/// The numeric value on the wire depends on the protocol version; see `from_wire` and
/// `to_wire`. 1.0 "stats" messages and 1.3 "multipart" messages share `StatsReq`/`StatsResp`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MsgCode {
    Hello,
    Error,
    EchoReq,
    EchoResp,
    Vendor,
    FeaturesReq,
    FeaturesResp,
    GetConfigReq,
    GetConfigResp,
    SetConfig,
    PacketIn,
    FlowRemoved,
    PortStatus,
    PacketOut,
    FlowMod,
    GroupMod,
    PortMod,
    TableMod,
    StatsReq,
    StatsResp,
    BarrierReq,
    BarrierResp,
    QueueGetConfigReq,
    QueueGetConfigResp,
    RoleReq,
    RoleResp,
    GetAsyncReq,
    GetAsyncResp,
    SetAsync,
    MeterMod,
}

const CODES_0X01: [MsgCode; 22] = [
    MsgCode::Hello,
    MsgCode::Error,
    MsgCode::EchoReq,
    MsgCode::EchoResp,
    MsgCode::Vendor,
    MsgCode::FeaturesReq,
    MsgCode::FeaturesResp,
    MsgCode::GetConfigReq,
    MsgCode::GetConfigResp,
    MsgCode::SetConfig,
    MsgCode::PacketIn,
    MsgCode::FlowRemoved,
    MsgCode::PortStatus,
    MsgCode::PacketOut,
    MsgCode::FlowMod,
    MsgCode::PortMod,
    MsgCode::StatsReq,
    MsgCode::StatsResp,
    MsgCode::BarrierReq,
    MsgCode::BarrierResp,
    MsgCode::QueueGetConfigReq,
    MsgCode::QueueGetConfigResp,
];

const CODES_0X04: [MsgCode; 30] = [
    MsgCode::Hello,
    MsgCode::Error,
    MsgCode::EchoReq,
    MsgCode::EchoResp,
    MsgCode::Vendor,
    MsgCode::FeaturesReq,
    MsgCode::FeaturesResp,
    MsgCode::GetConfigReq,
    MsgCode::GetConfigResp,
    MsgCode::SetConfig,
    MsgCode::PacketIn,
    MsgCode::FlowRemoved,
    MsgCode::PortStatus,
    MsgCode::PacketOut,
    MsgCode::FlowMod,
    MsgCode::GroupMod,
    MsgCode::PortMod,
    MsgCode::TableMod,
    MsgCode::StatsReq,
    MsgCode::StatsResp,
    MsgCode::BarrierReq,
    MsgCode::BarrierResp,
    MsgCode::QueueGetConfigReq,
    MsgCode::QueueGetConfigResp,
    MsgCode::RoleReq,
    MsgCode::RoleResp,
    MsgCode::GetAsyncReq,
    MsgCode::GetAsyncResp,
    MsgCode::SetAsync,
    MsgCode::MeterMod,
];

// Hello and Error keep their codes in every protocol version, which is what makes
// version negotiation possible in the first place.
const CODES_ANY_VERSION: [MsgCode; 2] = [MsgCode::Hello, MsgCode::Error];

fn codes_of_version(version: u8) -> &'static [MsgCode] {
    match version {
        OPENFLOW_0_01_VERSION => &CODES_0X01,
        OPENFLOW_0_04_VERSION => &CODES_0X04,
        _ => &CODES_ANY_VERSION,
    }
}

impl MsgCode {
    /// Map the header type field of a message of protocol `version` to a `MsgCode`.
    pub fn from_wire(version: u8, typ: u8) -> Result<MsgCode, OfpSerializationError> {
        codes_of_version(version)
            .get(typ as usize)
            .copied()
            .ok_or_else(|| OfpSerializationError::UnexpectedValueError {
                value: format!("0x{:x}", typ),
                field: "message type".to_string(),
                message: format!("header of version {}", version),
            })
    }

    /// Return the header type field used for this code by protocol `version`.
    pub fn to_wire(self, version: u8) -> Result<u8, OfpSerializationError> {
        codes_of_version(version)
            .iter()
            .position(|code| *code == self)
            .map(|position| position as u8)
            .ok_or(OfpSerializationError::UnsupportedMessageCode {
                version,
                code: self,
            })
    }
}

impl Display for MsgCode {
    fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
        let text = match self {
            MsgCode::Hello => "Hello",
            MsgCode::Error => "Error",
            MsgCode::EchoReq => "EchoReq",
            MsgCode::EchoResp => "EchoResp",
            MsgCode::Vendor => "Vendor",
            MsgCode::FeaturesReq => "FeaturesReq",
            MsgCode::FeaturesResp => "FeaturesResp",
            MsgCode::GetConfigReq => "GetConfigReq",
            MsgCode::GetConfigResp => "GetConfigResp",
            MsgCode::SetConfig => "SetConfig",
            MsgCode::PacketIn => "PacketIn",
            MsgCode::FlowRemoved => "FlowRemoved",
            MsgCode::PortStatus => "PortStatus",
            MsgCode::PacketOut => "PacketOut",
            MsgCode::FlowMod => "FlowMod",
            MsgCode::GroupMod => "GroupMod",
            MsgCode::PortMod => "PortMod",
            MsgCode::TableMod => "TableMod",
            MsgCode::StatsReq => "StatsReq",
            MsgCode::StatsResp => "StatsResp",
            MsgCode::BarrierReq => "BarrierReq",
            MsgCode::BarrierResp => "BarrierResp",
            MsgCode::QueueGetConfigReq => "QueueGetConfigReq",
            MsgCode::QueueGetConfigResp => "QueueGetConfigResp",
            MsgCode::RoleReq => "RoleReq",
            MsgCode::RoleResp => "RoleResp",
            MsgCode::GetAsyncReq => "GetAsyncReq",
            MsgCode::GetAsyncResp => "GetAsyncResp",
            MsgCode::SetAsync => "SetAsync",
            MsgCode::MeterMod => "MeterMod",
        };
        f.write_str(text)
    }
}
