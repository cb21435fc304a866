use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;

use crate::ofp_message::{ensure_remaining, OfpSerializationError};

pub const ETHERTYPE_VLAN: u16 = 0x8100;
pub const ETHERTYPE_LLDP: u16 = 0x88cc;
pub const ETHERTYPE_IPV6: u16 = 0x86dd;

/// Pack a 6-byte hardware address into the low 48 bits of a `u64`.
pub fn mac_of_bytes(addr: [u8; 6]) -> u64 {
    addr.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64)
}

pub fn bytes_of_mac(addr: u64) -> [u8; 6] {
    let mut arr = [0; 6];
    for (i, b) in arr.iter_mut().enumerate() {
        *b = (addr >> (8 * (5 - i))) as u8;
    }
    arr
}

pub fn read_mac(bytes: &mut Cursor<&[u8]>) -> Result<u64, OfpSerializationError> {
    ensure_remaining(bytes, 6, "hardware address")?;
    let mut arr = [0; 6];
    for b in arr.iter_mut() {
        *b = bytes.read_u8()?;
    }
    Ok(mac_of_bytes(arr))
}

/// The Ethernet header at the front of a packet-in payload. The ethertype is the one
/// after an optional 802.1Q tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EthernetHeader {
    pub dl_dst: u64,
    pub dl_src: u64,
    pub dl_vlan: Option<u16>,
    pub dl_typ: u16,
}

impl EthernetHeader {
    pub fn parse(buf: &[u8]) -> Result<EthernetHeader, OfpSerializationError> {
        let mut bytes = Cursor::new(buf);
        ensure_remaining(&bytes, 14, "ethernet header")?;
        let dl_dst = read_mac(&mut bytes)?;
        let dl_src = read_mac(&mut bytes)?;
        let mut dl_typ = bytes.read_u16::<BigEndian>()?;
        let mut dl_vlan = None;
        if dl_typ == ETHERTYPE_VLAN {
            ensure_remaining(&bytes, 4, "vlan tag")?;
            dl_vlan = Some(bytes.read_u16::<BigEndian>()? & 0xfff);
            dl_typ = bytes.read_u16::<BigEndian>()?;
        }
        Ok(EthernetHeader {
            dl_dst,
            dl_src,
            dl_vlan,
            dl_typ,
        })
    }

    /// Discovery and IPv6 neighbour traffic says nothing about where hosts live.
    pub fn reveals_host(&self) -> bool {
        self.dl_typ != ETHERTYPE_LLDP && self.dl_typ != ETHERTYPE_IPV6
    }
}
