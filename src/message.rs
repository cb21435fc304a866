use bytes::Bytes;

use crate::bits::test_bit;
use crate::openflow::MsgCode;

/// Hello message. `versions` holds the versions advertised through a version-bitmap
/// hello element. `bitmap` tells whether the peer sent such an element at all, since
/// a bitmap may name only versions this side cannot represent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Hello {
    pub versions: Vec<u8>,
    pub bitmap: bool,
}

impl Hello {
    pub fn new(versions: Vec<u8>) -> Hello {
        let bitmap = !versions.is_empty();
        Hello { versions, bitmap }
    }
}

/// High-level type of OpenFlow error, numbered as on the wire.
#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorType {
    HelloFailed = 0,
    BadRequest = 1,
}

/// Reason Hello failed.
#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HelloFailed {
    Incompatible = 0,
    EPerm = 1,
}

/// Error message. Type and code are kept raw so errors from any version can be logged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorMsg {
    pub error_type: u16,
    pub code: u16,
    pub data: Vec<u8>,
}

impl ErrorMsg {
    /// The reply sent to a peer whose hello shares no version with us.
    pub fn hello_failed_incompatible() -> ErrorMsg {
        ErrorMsg {
            error_type: ErrorType::HelloFailed as u16,
            code: HelloFailed::Incompatible as u16,
            data: b"no common OpenFlow version".to_vec(),
        }
    }
}

/// Description of a physical port.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PortDesc {
    pub port_no: u32,
    pub hw_addr: u64,
    pub name: String,
    pub config: u32,
    pub state: u32,
    pub curr: u32,
}

impl PortDesc {
    /// Lowest bit of the port state is the "link down" flag in every version.
    pub fn is_link_down(&self) -> bool {
        test_bit(0, self.state as u64)
    }
}

/// Switch features.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SwitchFeatures {
    pub datapath_id: u64,
    pub num_buffers: u32,
    pub num_tables: u8,
    pub auxiliary_id: u8,
    pub capabilities: u32,
    /// Only 1.0 switches list their ports in the features reply.
    pub ports: Vec<PortDesc>,
}

/// Switch configuration sent once the handshake completes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SwitchConfig {
    pub flags: u16,
    pub miss_send_len: u16,
}

pub const OFPC_FRAG_NORMAL: u16 = 0;
pub const OFPCML_NO_BUFFER: u16 = 0xffff;

impl SwitchConfig {
    /// Normal fragment handling, send whole packets to the controller.
    pub fn normal() -> SwitchConfig {
        SwitchConfig {
            flags: OFPC_FRAG_NORMAL,
            miss_send_len: OFPCML_NO_BUFFER,
        }
    }
}

/// What changed about a physical port.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PortReason {
    PortAdd,
    PortDelete,
    PortModify,
}

/// A physical port has changed in the datapath.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortStatus {
    pub reason: PortReason,
    pub desc: PortDesc,
}

/// Represents packets received by the datapath and sent to the controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PacketIn {
    pub buffer_id: Option<u32>,
    pub total_len: u16,
    pub in_port: u32,
    pub reason: u8,
    pub payload: Vec<u8>,
}

/// Type of stats (1.0) or multipart (1.3) request/reply.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StatsKind {
    Desc,
    Flow,
    Aggregate,
    Table,
    Port,
    Queue,
    PortDesc,
    Vendor,
    Other(u16),
}

impl StatsKind {
    pub fn from_u16(value: u16) -> StatsKind {
        match value {
            0 => StatsKind::Desc,
            1 => StatsKind::Flow,
            2 => StatsKind::Aggregate,
            3 => StatsKind::Table,
            4 => StatsKind::Port,
            5 => StatsKind::Queue,
            13 => StatsKind::PortDesc,
            0xFFFF => StatsKind::Vendor,
            other => StatsKind::Other(other),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            StatsKind::Desc => 0,
            StatsKind::Flow => 1,
            StatsKind::Aggregate => 2,
            StatsKind::Table => 3,
            StatsKind::Port => 4,
            StatsKind::Queue => 5,
            StatsKind::PortDesc => 13,
            StatsKind::Vendor => 0xFFFF,
            StatsKind::Other(other) => other,
        }
    }
}

/// Represents stats request from the controller. The body is implied by the kind:
/// flow and port requests always ask for every flow/port.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StatsReq {
    pub kind: StatsKind,
    pub flags: u16,
}

impl StatsReq {
    pub fn new(kind: StatsKind) -> StatsReq {
        StatsReq { kind, flags: 0 }
    }

    pub fn desc() -> StatsReq {
        StatsReq::new(StatsKind::Desc)
    }

    pub fn flows() -> StatsReq {
        StatsReq::new(StatsKind::Flow)
    }

    pub fn ports() -> StatsReq {
        StatsReq::new(StatsKind::Port)
    }

    pub fn port_desc() -> StatsReq {
        StatsReq::new(StatsKind::PortDesc)
    }
}

pub const OFPSF_REPLY_MORE: u64 = 0;

/// One fragment of a stats/multipart reply. The body is left raw until every fragment
/// of the transaction has arrived.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatsResp {
    pub kind: StatsKind,
    pub flags: u16,
    pub body: Bytes,
}

impl StatsResp {
    /// Whether the switch announced more fragments for the same xid.
    pub fn more_follows(&self) -> bool {
        test_bit(OFPSF_REPLY_MORE, self.flags as u64)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwitchDescription {
    pub manufacturer_desc: String,
    pub hardware_desc: String,
    pub software_desc: String,
    pub serial_number: String,
    pub datapath_desc: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowStats {
    pub table_id: u8,
    pub duration_sec: u32,
    pub duration_nsec: u32,
    pub priority: u16,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub cookie: u64,
    pub packet_count: u64,
    pub byte_count: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransmissionCounter {
    pub rx: u64,
    pub tx: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortStats {
    pub port_no: u32,
    pub packets: TransmissionCounter,
    pub bytes: TransmissionCounter,
    pub dropped: TransmissionCounter,
    pub errors: TransmissionCounter,
    pub rx_frame_errors: u64,
    pub rx_over_errors: u64,
    pub rx_crc_errors: u64,
    pub collisions: u64,
}

/// Abstractions of OpenFlow messages mapping to message codes, independent of the
/// protocol version they travel with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    Hello(Hello),
    Error(ErrorMsg),
    EchoRequest(Vec<u8>),
    EchoReply(Vec<u8>),
    FeaturesReq,
    FeaturesReply(SwitchFeatures),
    SetConfig(SwitchConfig),
    PacketIn(PacketIn),
    PortStatus(PortStatus),
    BarrierRequest,
    BarrierReply,
    StatsRequest(StatsReq),
    StatsReply(StatsResp),
    /// A known message type whose body the control channel has no use for.
    Other(MsgCode, Vec<u8>),
}

impl Message {
    /// Map `Message` to associated OpenFlow message type code `MsgCode`.
    pub fn msg_code(&self) -> MsgCode {
        match *self {
            Message::Hello(_) => MsgCode::Hello,
            Message::Error(_) => MsgCode::Error,
            Message::EchoRequest(_) => MsgCode::EchoReq,
            Message::EchoReply(_) => MsgCode::EchoResp,
            Message::FeaturesReq => MsgCode::FeaturesReq,
            Message::FeaturesReply(_) => MsgCode::FeaturesResp,
            Message::SetConfig(_) => MsgCode::SetConfig,
            Message::PacketIn(_) => MsgCode::PacketIn,
            Message::PortStatus(_) => MsgCode::PortStatus,
            Message::BarrierRequest => MsgCode::BarrierReq,
            Message::BarrierReply => MsgCode::BarrierResp,
            Message::StatsRequest(_) => MsgCode::StatsReq,
            Message::StatsReply(_) => MsgCode::StatsResp,
            Message::Other(code, _) => code,
        }
    }
}
