//! IPv4 and IPv6 headers

use crate::error::DecodeError;
use std::net::{Ipv4Addr, Ipv6Addr};

/// IPv4 header; options are skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    /// Header length in bytes
    pub header_len: u8,
    /// Type of service
    pub tos: u8,
    /// Total datagram length
    pub total_len: u16,
    /// Identification
    pub ident: u16,
    /// Flags and fragment offset
    pub flags_fragment: u16,
    /// Time to live
    pub ttl: u8,
    /// Protocol of the payload
    pub protocol: u8,
    /// Header checksum
    pub checksum: u16,
    /// Source address
    pub src: Ipv4Addr,
    /// Destination address
    pub dst: Ipv4Addr,
}

impl Ipv4Header {
    /// Minimum header length
    pub const MIN_LEN: usize = 20;

    /// Parse; returns the header and its length in bytes
    pub fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < Self::MIN_LEN {
            return Err(DecodeError::truncated("IPv4 header", Self::MIN_LEN, data.len()));
        }
        if data[0] >> 4 != 4 {
            return Err(DecodeError::invalid("IPv4 version", format!("{}", data[0] >> 4)));
        }
        let header_len = (data[0] & 0x0f) * 4;
        if (header_len as usize) < Self::MIN_LEN || data.len() < header_len as usize {
            return Err(DecodeError::truncated(
                "IPv4 options",
                header_len as usize,
                data.len(),
            ));
        }
        Ok(Self {
            header_len,
            tos: data[1],
            total_len: u16::from_be_bytes([data[2], data[3]]),
            ident: u16::from_be_bytes([data[4], data[5]]),
            flags_fragment: u16::from_be_bytes([data[6], data[7]]),
            ttl: data[8],
            protocol: data[9],
            checksum: u16::from_be_bytes([data[10], data[11]]),
            src: Ipv4Addr::new(data[12], data[13], data[14], data[15]),
            dst: Ipv4Addr::new(data[16], data[17], data[18], data[19]),
        })
    }

    /// Serialize a 20-byte header (options are not emitted) with a fresh checksum
    pub fn emit(&self) -> [u8; Self::MIN_LEN] {
        let mut out = [0u8; Self::MIN_LEN];
        out[0] = 0x45;
        out[1] = self.tos;
        out[2..4].copy_from_slice(&self.total_len.to_be_bytes());
        out[4..6].copy_from_slice(&self.ident.to_be_bytes());
        out[6..8].copy_from_slice(&self.flags_fragment.to_be_bytes());
        out[8] = self.ttl;
        out[9] = self.protocol;
        out[12..16].copy_from_slice(&self.src.octets());
        out[16..20].copy_from_slice(&self.dst.octets());
        let sum = super::checksum::finish(super::checksum::accumulate(0, &out));
        out[10..12].copy_from_slice(&sum.to_be_bytes());
        out
    }
}

/// Fixed IPv6 header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6Header {
    /// Traffic class (DSCP in the high 6 bits, ECN in the low 2)
    pub traffic_class: u8,
    /// 20-bit flow label
    pub flow_label: u32,
    /// Length of everything after this header
    pub payload_len: u16,
    /// Protocol of the next header
    pub next_header: u8,
    /// Hop limit
    pub hop_limit: u8,
    /// Source address
    pub src: Ipv6Addr,
    /// Destination address
    pub dst: Ipv6Addr,
}

impl Ipv6Header {
    /// Header length
    pub const LEN: usize = 40;

    /// Parse the first 40 bytes of `data`
    pub fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < Self::LEN {
            return Err(DecodeError::truncated("IPv6 header", Self::LEN, data.len()));
        }
        if data[0] >> 4 != 6 {
            return Err(DecodeError::invalid("IPv6 version", format!("{}", data[0] >> 4)));
        }
        let word = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let mut src = [0u8; 16];
        let mut dst = [0u8; 16];
        src.copy_from_slice(&data[8..24]);
        dst.copy_from_slice(&data[24..40]);
        Ok(Self {
            traffic_class: ((word >> 20) & 0xff) as u8,
            flow_label: word & 0x000f_ffff,
            payload_len: u16::from_be_bytes([data[4], data[5]]),
            next_header: data[6],
            hop_limit: data[7],
            src: Ipv6Addr::from(src),
            dst: Ipv6Addr::from(dst),
        })
    }

    /// Serialize to wire order
    pub fn emit(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        let word = (6u32 << 28) | ((self.traffic_class as u32) << 20) | (self.flow_label & 0x000f_ffff);
        out[0..4].copy_from_slice(&word.to_be_bytes());
        out[4..6].copy_from_slice(&self.payload_len.to_be_bytes());
        out[6] = self.next_header;
        out[7] = self.hop_limit;
        out[8..24].copy_from_slice(&self.src.octets());
        out[24..40].copy_from_slice(&self.dst.octets());
        out
    }

    /// DSCP part of the traffic class
    pub fn dscp(&self) -> u8 {
        self.traffic_class >> 2
    }

    /// ECN part of the traffic class
    pub fn ecn(&self) -> u8 {
        self.traffic_class & 0b11
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv6_fields() {
        let hdr = Ipv6Header {
            traffic_class: 0xb9,
            flow_label: 0xabcde,
            payload_len: 12,
            next_header: 17,
            hop_limit: 64,
            src: "fe80::1".parse().unwrap(),
            dst: "ff02::1".parse().unwrap(),
        };
        let bytes = hdr.emit();
        assert_eq!(bytes[0], 0x6b);
        assert_eq!(Ipv6Header::parse(&bytes).unwrap(), hdr);
        assert_eq!(hdr.dscp(), 0x2e);
        assert_eq!(hdr.ecn(), 1);
    }

    #[test]
    fn test_ipv4_checksum_valid() {
        let hdr = Ipv4Header {
            header_len: 20,
            tos: 0,
            total_len: 28,
            ident: 1,
            flags_fragment: 0x4000,
            ttl: 64,
            protocol: 17,
            checksum: 0,
            src: Ipv4Addr::LOCALHOST,
            dst: Ipv4Addr::LOCALHOST,
        };
        let bytes = hdr.emit();
        assert_eq!(super::super::checksum::finish(super::super::checksum::accumulate(0, &bytes)), 0);
        let parsed = Ipv4Header::parse(&bytes).unwrap();
        assert_eq!(parsed.src, Ipv4Addr::LOCALHOST);
        assert_eq!(parsed.protocol, 17);
    }

    #[test]
    fn test_wrong_version() {
        assert!(Ipv6Header::parse(&[0x45; 40]).is_err());
    }
}
