use byteorder::{BigEndian, ReadBytesExt};
use bytes::BufMut;
use std::io::Cursor;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::ofp_message::OfpSerializationError;
use crate::openflow::MsgCode;

pub const OFP_HEADER_LENGTH: usize = 8;

pub type Xid = u32;

pub const OPENFLOW_0_01_VERSION: u8 = 1; // 1.0
pub const OPENFLOW_0_04_VERSION: u8 = 4; // 1.3

/// OpenFlow Header
///
/// The first fields of every OpenFlow message, no matter the protocol version.
/// This is parsed to determine version and length of the remaining message, so that
/// it can be properly handled.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OfpHeader {
    version: u8,
    typ: u8,
    length: u16,
    xid: u32,
}

impl OfpHeader {
    /// Create an `OfpHeader` out of the arguments.
    pub fn new(version: u8, typ: u8, length: u16, xid: u32) -> OfpHeader {
        OfpHeader {
            version,
            typ,
            length,
            xid,
        }
    }

    /// Return the byte-size of an `OfpHeader`.
    pub fn size() -> usize {
        OFP_HEADER_LENGTH
    }

    /// Fills a message buffer with the header fields of an `OfpHeader`.
    pub fn marshal(bytes: &mut Vec<u8>, header: OfpHeader) {
        bytes.put_u8(header.version());
        bytes.put_u8(header.typ());
        bytes.put_u16(header.length);
        bytes.put_u32(header.xid());
    }

    /// Takes a message buffer (at least `OFP_HEADER_LENGTH` long) and returns an `OfpHeader`.
    pub fn parse(buf: &[u8]) -> Result<Self, OfpSerializationError> {
        if buf.len() < OFP_HEADER_LENGTH {
            return Err(OfpSerializationError::Truncated {
                message: "header".to_string(),
                expected: OFP_HEADER_LENGTH,
                available: buf.len(),
            });
        }
        let mut bytes = Cursor::new(buf);
        OfpHeader::parse_from_cursor(&mut bytes)
    }

    pub fn parse_from_cursor(bytes: &mut Cursor<&[u8]>) -> Result<Self, OfpSerializationError> {
        Ok(OfpHeader {
            version: bytes.read_u8()?,
            typ: bytes.read_u8()?,
            length: bytes.read_u16::<BigEndian>()?,
            xid: bytes.read_u32::<BigEndian>()?,
        })
    }

    /// Read only the total-length field of the header at the front of `buf`.
    pub fn peek_length(buf: &[u8]) -> Option<usize> {
        if buf.len() < OFP_HEADER_LENGTH {
            return None;
        }
        Some(((buf[2] as usize) << 8) + buf[3] as usize)
    }

    /// Return the `version` field of a header.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Return the raw message type field of a header.
    pub fn typ(&self) -> u8 {
        self.typ
    }

    /// Return the OpenFlow message type code of a header. The mapping depends on the
    /// protocol version carried by the header.
    pub fn type_code(&self) -> Result<MsgCode, OfpSerializationError> {
        MsgCode::from_wire(self.version, self.typ)
    }

    /// Return the `length` field of a header. Includes the length of the header itself.
    pub fn length(&self) -> usize {
        self.length as usize
    }

    /// Return the `xid` field of a header, the transaction id associated with this packet.
    ///  Replies use the same id to facilitate pairing.
    pub fn xid(&self) -> u32 {
        self.xid
    }
}

/// Source of transaction ids for controller-originated requests.
#[derive(Debug)]
pub struct XidGenerator {
    next: AtomicU32,
}

impl XidGenerator {
    pub fn new() -> XidGenerator {
        XidGenerator {
            next: AtomicU32::new(1),
        }
    }

    pub fn next(&self) -> Xid {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for XidGenerator {
    fn default() -> Self {
        XidGenerator::new()
    }
}
