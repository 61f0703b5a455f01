//! Link-layer framings found in captures of IP traffic

use crate::error::DecodeError;
use std::fmt;

/// Six-byte Ethernet MAC address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EthernetAddress(pub [u8; 6]);

impl fmt::Display for EthernetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// BSD loopback header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopbackHeader {
    /// Address family, host byte order in the file
    pub family: u32,
}

impl LoopbackHeader {
    /// Header length
    pub const LEN: usize = 4;

    /// Parse, accepting either byte order for the family word
    pub fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < Self::LEN {
            return Err(DecodeError::truncated("loopback header", Self::LEN, data.len()));
        }
        let le = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let family = if le > 0xffff { le.swap_bytes() } else { le };
        Ok(Self { family })
    }

    /// True if the family is one of the platform values used for IPv6
    pub fn is_ipv6(&self) -> bool {
        matches!(self.family, 10 | 24 | 28 | 30)
    }
}

/// Ethernet II header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    /// Destination MAC
    pub dst: EthernetAddress,
    /// Source MAC
    pub src: EthernetAddress,
    /// Ethertype of the payload
    pub ethertype: u16,
}

impl EthernetHeader {
    /// Header length
    pub const LEN: usize = 14;

    /// Parse the first 14 bytes of `data`
    pub fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < Self::LEN {
            return Err(DecodeError::truncated("Ethernet header", Self::LEN, data.len()));
        }
        let mut dst = [0u8; 6];
        let mut src = [0u8; 6];
        dst.copy_from_slice(&data[0..6]);
        src.copy_from_slice(&data[6..12]);
        Ok(Self {
            dst: EthernetAddress(dst),
            src: EthernetAddress(src),
            ethertype: u16::from_be_bytes([data[12], data[13]]),
        })
    }

    /// Serialize to wire order
    pub fn emit(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[0..6].copy_from_slice(&self.dst.0);
        out[6..12].copy_from_slice(&self.src.0);
        out[12..14].copy_from_slice(&self.ethertype.to_be_bytes());
        out
    }
}

/// Linux cooked capture (SLL) header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinuxCookedHeader {
    /// 0 to us, 4 sent by us, ...
    pub packet_type: u16,
    /// ARPHRD_ type of the interface
    pub arphrd_type: u16,
    /// Link-layer source address, up to 8 bytes
    pub address: Vec<u8>,
    /// Ethertype of the payload
    pub protocol: u16,
}

impl LinuxCookedHeader {
    /// Header length
    pub const LEN: usize = 16;

    /// Parse the fixed 16-byte header
    pub fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < Self::LEN {
            return Err(DecodeError::truncated("SLL header", Self::LEN, data.len()));
        }
        let addr_len = (u16::from_be_bytes([data[4], data[5]]) as usize).min(8);
        Ok(Self {
            packet_type: u16::from_be_bytes([data[0], data[1]]),
            arphrd_type: u16::from_be_bytes([data[2], data[3]]),
            address: data[6..6 + addr_len].to_vec(),
            protocol: u16::from_be_bytes([data[14], data[15]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ethernet_parse_emit() {
        let hdr = EthernetHeader {
            dst: EthernetAddress([1, 2, 3, 4, 5, 6]),
            src: EthernetAddress([0xa, 0xb, 0xc, 0xd, 0xe, 0xf]),
            ethertype: 0x86dd,
        };
        assert_eq!(EthernetHeader::parse(&hdr.emit()).unwrap(), hdr);
        assert_eq!(hdr.src.to_string(), "0a:0b:0c:0d:0e:0f");
    }

    #[test]
    fn test_loopback_family_either_order() {
        assert!(LoopbackHeader::parse(&[30, 0, 0, 0]).unwrap().is_ipv6());
        assert_eq!(LoopbackHeader::parse(&[0, 0, 0, 2]).unwrap().family, 2);
    }

    #[test]
    fn test_sll_short() {
        assert!(LinuxCookedHeader::parse(&[0; 10]).is_err());
    }
}
