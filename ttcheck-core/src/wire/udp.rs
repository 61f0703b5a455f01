//! UDP header

use super::checksum;
use super::ip::Ipv6Header;
use crate::constants::ipproto;
use crate::error::DecodeError;
use std::net::Ipv6Addr;

/// UDP header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHeader {
    /// Source port
    pub src_port: u16,
    /// Destination port
    pub dst_port: u16,
    /// Header plus payload length
    pub length: u16,
    /// Checksum, 0 if unused
    pub checksum: u16,
}

impl UdpHeader {
    /// Header length
    pub const LEN: usize = 8;

    /// Parse the first 8 bytes of `data`
    pub fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < Self::LEN {
            return Err(DecodeError::truncated("UDP header", Self::LEN, data.len()));
        }
        Ok(Self {
            src_port: u16::from_be_bytes([data[0], data[1]]),
            dst_port: u16::from_be_bytes([data[2], data[3]]),
            length: u16::from_be_bytes([data[4], data[5]]),
            checksum: u16::from_be_bytes([data[6], data[7]]),
        })
    }

    /// Serialize to wire order
    pub fn emit(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[0..2].copy_from_slice(&self.src_port.to_be_bytes());
        out[2..4].copy_from_slice(&self.dst_port.to_be_bytes());
        out[4..6].copy_from_slice(&self.length.to_be_bytes());
        out[6..8].copy_from_slice(&self.checksum.to_be_bytes());
        out
    }

    /// True if either port is `port`
    pub fn uses_port(&self, port: u16) -> bool {
        self.src_port == port || self.dst_port == port
    }
}

/// Build an IPv6/UDP datagram around `payload`, with lengths and checksum
/// filled in
pub fn ipv6_datagram(
    src: Ipv6Addr,
    dst: Ipv6Addr,
    src_port: u16,
    dst_port: u16,
    payload: &[u8],
) -> Vec<u8> {
    let length = (UdpHeader::LEN + payload.len()) as u16;
    let ip = Ipv6Header {
        traffic_class: 0,
        flow_label: 0,
        payload_len: length,
        next_header: ipproto::UDP,
        hop_limit: 64,
        src,
        dst,
    };
    let mut udp = UdpHeader {
        src_port,
        dst_port,
        length,
        checksum: 0,
    };
    let mut segment = udp.emit().to_vec();
    segment.extend_from_slice(payload);
    udp.checksum = checksum::udp_ipv6(&src, &dst, &segment);

    let mut out = ip.emit().to_vec();
    out.extend_from_slice(&udp.emit());
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let hdr = UdpHeader::parse(&[0x16, 0x33, 0xc0, 0x01, 0x00, 0x0c, 0xbe, 0xef]).unwrap();
        assert_eq!(hdr.src_port, 5683);
        assert_eq!(hdr.dst_port, 0xc001);
        assert_eq!(hdr.length, 12);
        assert!(hdr.uses_port(5683));
        assert_eq!(hdr.emit()[6..], [0xbe, 0xef]);
    }

    #[test]
    fn test_ipv6_datagram() {
        let src: Ipv6Addr = "2001:db8::1".parse().unwrap();
        let dst: Ipv6Addr = "2001:db8::2".parse().unwrap();
        let pkt = ipv6_datagram(src, dst, 40000, 5683, b"hi");
        assert_eq!(pkt.len(), Ipv6Header::LEN + UdpHeader::LEN + 2);
        let ip = Ipv6Header::parse(&pkt).unwrap();
        assert_eq!(ip.payload_len, 10);
        let udp = UdpHeader::parse(&pkt[Ipv6Header::LEN..]).unwrap();
        assert_eq!(udp.length, 10);
        let mut segment = pkt[Ipv6Header::LEN..].to_vec();
        segment[6..8].copy_from_slice(&[0, 0]);
        assert_eq!(checksum::udp_ipv6(&src, &dst, &segment), udp.checksum);
    }

    #[test]
    fn test_short() {
        assert!(UdpHeader::parse(&[0; 7]).is_err());
    }
}
