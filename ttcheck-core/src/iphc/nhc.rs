//! Next header compression: UDP and IPv6 encapsulation
//!
//! ```text
//! UDP:      1 1 1 1 0 C P P        ports (4+4, 8+16, 16+8 or 16+16), checksum if C=0
//! IPv6 ext: 1 1 1 0 E E E N        EID 7 = IPv6, followed by another IPHC header
//! ```

use super::context::{ContextTable, IidContext};
use super::IphcHeader;
use crate::bits::{BitReader, BitWriter};
use crate::constants::{
    ipproto, MAX_ENCAPSULATION_DEPTH, NHC_EID_IPV6, NHC_EXT_ID, NHC_EXT_MASK, NHC_UDP_ID, NHC_UDP_MASK,
    UDP_PORT_4BIT_PREFIX, UDP_PORT_8BIT_PREFIX,
};
use crate::error::DecodeError;
use crate::wire::checksum;
use crate::wire::ip::Ipv6Header;
use crate::wire::udp::UdpHeader;
use std::net::Ipv6Addr;

/// A compressed UDP header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpNhc {
    /// Checksum elided (C bit)
    pub checksum_elided: bool,
    /// Port compression mode (P bits)
    pub ports: u8,
    /// Source port, full value
    pub src_port: u16,
    /// Destination port, full value
    pub dst_port: u16,
    /// Inline checksum
    pub checksum: Option<u16>,
}

impl UdpNhc {
    /// Pick the narrowest port encoding; the checksum is always carried
    pub fn compress(udp: &UdpHeader) -> Self {
        let (sp, dp) = (udp.src_port, udp.dst_port);
        let ports = if sp & 0xfff0 == UDP_PORT_4BIT_PREFIX && dp & 0xfff0 == UDP_PORT_4BIT_PREFIX {
            3
        } else if sp & 0xff00 == UDP_PORT_8BIT_PREFIX {
            2
        } else if dp & 0xff00 == UDP_PORT_8BIT_PREFIX {
            1
        } else {
            0
        };
        Self {
            checksum_elided: false,
            ports,
            src_port: sp,
            dst_port: dp,
            checksum: Some(udp.checksum),
        }
    }

    fn write(&self, w: &mut BitWriter) {
        w.write_bits((NHC_UDP_ID >> 3) as u32, 5);
        w.write_flag(self.checksum_elided);
        w.write_bits(self.ports as u32, 2);
        match self.ports {
            0 => {
                w.write_bits(self.src_port as u32, 16);
                w.write_bits(self.dst_port as u32, 16);
            }
            1 => {
                w.write_bits(self.src_port as u32, 16);
                w.write_bits((self.dst_port & 0xff) as u32, 8);
            }
            2 => {
                w.write_bits((self.src_port & 0xff) as u32, 8);
                w.write_bits(self.dst_port as u32, 16);
            }
            _ => {
                w.write_bits((self.src_port & 0xf) as u32, 4);
                w.write_bits((self.dst_port & 0xf) as u32, 4);
            }
        }
        if let Some(c) = self.checksum {
            w.write_bits(c as u32, 16);
        }
    }

    fn read(id: u8, r: &mut BitReader<'_>) -> Result<Self, DecodeError> {
        let checksum_elided = id & 0b100 != 0;
        let ports = id & 0b11;
        let (src_port, dst_port) = match ports {
            0 => (r.read_u16()?, r.read_u16()?),
            1 => (r.read_u16()?, UDP_PORT_8BIT_PREFIX | r.read_u8()? as u16),
            2 => (UDP_PORT_8BIT_PREFIX | r.read_u8()? as u16, r.read_u16()?),
            _ => {
                let s = r.read_bits(4)? as u16;
                let d = r.read_bits(4)? as u16;
                (UDP_PORT_4BIT_PREFIX | s, UDP_PORT_4BIT_PREFIX | d)
            }
        };
        let checksum = if checksum_elided {
            None
        } else {
            Some(r.read_u16()?)
        };
        Ok(Self {
            checksum_elided,
            ports,
            src_port,
            dst_port,
            checksum,
        })
    }
}

/// A compressed next header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NhcHeader {
    /// UDP
    Udp(UdpNhc),
    /// Encapsulated IPv6, itself IPHC-compressed
    Ipv6(Box<IphcHeader>),
}

impl NhcHeader {
    /// Append to `w`
    pub fn write(&self, w: &mut BitWriter) {
        match self {
            NhcHeader::Udp(udp) => udp.write(w),
            NhcHeader::Ipv6(inner) => {
                w.write_bits((NHC_EXT_ID >> 4) as u32, 4);
                w.write_bits(NHC_EID_IPV6 as u32, 3);
                w.write_flag(false);
                inner.write(w);
            }
        }
    }

    /// One-line description for dissections
    pub fn describe(&self) -> String {
        match self {
            NhcHeader::Udp(u) => format!(
                "UDP P={} C={} {} -> {}",
                u.ports, u.checksum_elided as u8, u.src_port, u.dst_port
            ),
            NhcHeader::Ipv6(_) => "IPv6 encapsulation".to_string(),
        }
    }
}

/// Compress the header following `ip`, if it has an NHC encoding
///
/// Returns the NHC header and the number of payload bytes it replaces.
pub(crate) fn compress(
    ip: &Ipv6Header,
    payload: &[u8],
    contexts: &ContextTable,
    depth: usize,
) -> Option<(NhcHeader, usize)> {
    match ip.next_header {
        ipproto::UDP => {
            let udp = UdpHeader::parse(payload).ok()?;
            Some((NhcHeader::Udp(UdpNhc::compress(&udp)), UdpHeader::LEN))
        }
        // past the limit the inner header stays inline
        ipproto::IPV6 if depth < MAX_ENCAPSULATION_DEPTH => {
            let inner = Ipv6Header::parse(payload).ok()?;
            let iids = IidContext::encapsulated(&ip.src, &ip.dst);
            let c = super::compress_at(
                &inner,
                &payload[Ipv6Header::LEN..],
                contexts,
                &iids,
                depth + 1,
            );
            Some((NhcHeader::Ipv6(Box::new(c.header)), c.consumed))
        }
        _ => None,
    }
}

/// Decompress an NHC header
///
/// Returns the header, the IPv6 next header value it stands for, and the
/// rebuilt uncompressed bytes. `src`/`dst` are the enclosing IPv6 addresses.
pub(crate) fn decompress(
    r: &mut BitReader<'_>,
    contexts: &ContextTable,
    src: &Ipv6Addr,
    dst: &Ipv6Addr,
    depth: usize,
) -> Result<(NhcHeader, u8, Vec<u8>), DecodeError> {
    let id = r.read_u8()?;

    if id & NHC_UDP_MASK == NHC_UDP_ID {
        let nhc = UdpNhc::read(id, r)?;
        let rest = r.remaining_bytes()?;
        let length = u16::try_from(rest.len() + UdpHeader::LEN)
            .map_err(|_| DecodeError::invalid("UDP NHC", "datagram too long"))?;
        let mut udp = UdpHeader {
            src_port: nhc.src_port,
            dst_port: nhc.dst_port,
            length,
            checksum: nhc.checksum.unwrap_or(0),
        };
        if nhc.checksum.is_none() {
            let mut segment = udp.emit().to_vec();
            segment.extend_from_slice(rest);
            udp.checksum = checksum::udp_ipv6(src, dst, &segment);
        }
        return Ok((NhcHeader::Udp(nhc), ipproto::UDP, udp.emit().to_vec()));
    }

    if id & NHC_EXT_MASK == NHC_EXT_ID {
        let eid = (id >> 1) & 0b111;
        if eid != NHC_EID_IPV6 {
            return Err(DecodeError::UnsupportedExtensionHeader(eid));
        }
        if depth >= MAX_ENCAPSULATION_DEPTH {
            return Err(DecodeError::EncapsulationTooDeep(MAX_ENCAPSULATION_DEPTH));
        }
        let iids = IidContext::encapsulated(src, dst);
        let (inner, inner_ip, inner_nhc) =
            super::decompress_from(r, contexts, &iids, depth + 1)?;
        let mut bytes = inner_ip.emit().to_vec();
        bytes.extend_from_slice(&inner_nhc);
        return Ok((NhcHeader::Ipv6(Box::new(inner)), ipproto::IPV6, bytes));
    }

    Err(DecodeError::UnknownNhc(id))
}
