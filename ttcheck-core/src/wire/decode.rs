//! Link-type driven decode chain
//!
//! Each step pushes its layer before handing the rest to the next one, so
//! a failure deep in the chain keeps everything decoded so far. Whatever
//! could not be decoded becomes a trailing [`Layer::Raw`].

use super::coap::CoapMessage;
use super::ieee802154::{FrameType, Ieee802154Frame};
use super::ip::{Ipv4Header, Ipv6Header};
use super::link::{EthernetHeader, LinuxCookedHeader, LoopbackHeader};
use super::udp::UdpHeader;
use super::{Layer, Packet};
use crate::constants::{
    ethertype, ipproto, linktype, COAP_PORT, LOWPAN_DISPATCH_IPV6, LOWPAN_IPHC_DISPATCH,
    LOWPAN_IPHC_MASK, MAX_ENCAPSULATION_DEPTH,
};
use crate::error::DecodeError;
use crate::iphc::{self, ContextTable, IidContext};
use bytes::Bytes;

#[cfg(feature = "logging")]
use tracing::trace;

/// ARPHRD value for 802.15.4 in Linux cooked captures
const ARPHRD_IEEE802154: u16 = 804;

/// Decode one captured packet
///
/// Never fails outright: the layers decoded before an error are returned
/// alongside it.
pub fn decode(
    link_type: u32,
    data: &Bytes,
    contexts: &ContextTable,
) -> (Packet, Option<DecodeError>) {
    let mut decoder = Decoder {
        layers: Vec::new(),
        contexts,
        ip_depth: 0,
    };
    let result = decoder.link(link_type, data);

    #[cfg(feature = "logging")]
    if let Err(e) = &result {
        trace!("decode stopped after {} layers: {}", decoder.layers.len(), e);
    }

    (Packet::new(decoder.layers), result.err())
}

struct Decoder<'c> {
    layers: Vec<Layer>,
    contexts: &'c ContextTable,
    // IP headers decoded so far
    ip_depth: usize,
}

impl Decoder<'_> {
    fn raw(&mut self, data: &[u8]) {
        if !data.is_empty() {
            self.layers.push(Layer::Raw(Bytes::copy_from_slice(data)));
        }
    }

    fn link(&mut self, link_type: u32, data: &[u8]) -> Result<(), DecodeError> {
        match link_type {
            linktype::NULL => {
                let h = LoopbackHeader::parse(data)?;
                self.layers.push(Layer::Loopback(h));
                self.ip(&data[LoopbackHeader::LEN..])
            }
            linktype::ETHERNET => {
                let h = EthernetHeader::parse(data)?;
                let et = h.ethertype;
                self.layers.push(Layer::Ethernet(h));
                self.ethertype(et, &data[EthernetHeader::LEN..])
            }
            linktype::RAW => self.ip(data),
            linktype::LINUX_SLL => {
                let h = LinuxCookedHeader::parse(data)?;
                let (arphrd, proto) = (h.arphrd_type, h.protocol);
                self.layers.push(Layer::LinuxCooked(h));
                let rest = &data[LinuxCookedHeader::LEN..];
                if arphrd == ARPHRD_IEEE802154 {
                    self.ieee802154(rest, false)
                } else {
                    self.ethertype(proto, rest)
                }
            }
            linktype::IEEE802_15_4_WITHFCS => self.ieee802154(data, true),
            linktype::IEEE802_15_4_NOFCS => self.ieee802154(data, false),
            other => {
                self.raw(data);
                Err(DecodeError::UnsupportedLinkType(other))
            }
        }
    }

    fn ethertype(&mut self, et: u16, data: &[u8]) -> Result<(), DecodeError> {
        match et {
            ethertype::IPV4 => self.ipv4(data),
            ethertype::IPV6 => self.ipv6(data),
            ethertype::SIXLOWPAN => self.sixlowpan(data, IidContext::default()),
            _ => {
                self.raw(data);
                Ok(())
            }
        }
    }

    fn ip(&mut self, data: &[u8]) -> Result<(), DecodeError> {
        match data.first().map(|b| b >> 4) {
            Some(4) => self.ipv4(data),
            Some(6) => self.ipv6(data),
            _ => {
                self.raw(data);
                Ok(())
            }
        }
    }

    fn enter_ip(&mut self, data: &[u8]) -> Result<(), DecodeError> {
        if self.ip_depth > MAX_ENCAPSULATION_DEPTH {
            self.raw(data);
            return Err(DecodeError::EncapsulationTooDeep(MAX_ENCAPSULATION_DEPTH));
        }
        self.ip_depth += 1;
        Ok(())
    }

    fn ipv4(&mut self, data: &[u8]) -> Result<(), DecodeError> {
        self.enter_ip(data)?;
        let h = Ipv4Header::parse(data)?;
        let start = (h.header_len as usize).min(data.len());
        let end = (h.total_len as usize).clamp(start, data.len());
        let proto = h.protocol;
        self.layers.push(Layer::Ipv4(h));
        self.next_header(proto, &data[start..end])
    }

    fn ipv6(&mut self, data: &[u8]) -> Result<(), DecodeError> {
        self.enter_ip(data)?;
        let h = Ipv6Header::parse(data)?;
        let end = (Ipv6Header::LEN + h.payload_len as usize).min(data.len());
        let nh = h.next_header;
        self.layers.push(Layer::Ipv6(h));
        self.next_header(nh, &data[Ipv6Header::LEN..end])
    }

    fn next_header(&mut self, nh: u8, data: &[u8]) -> Result<(), DecodeError> {
        match nh {
            ipproto::UDP => self.udp(data),
            ipproto::IPV6 => self.ipv6(data),
            _ => {
                self.raw(data);
                Ok(())
            }
        }
    }

    fn udp(&mut self, data: &[u8]) -> Result<(), DecodeError> {
        let h = UdpHeader::parse(data)?;
        let end = (h.length as usize).clamp(UdpHeader::LEN, data.len());
        let payload = &data[UdpHeader::LEN..end];
        let coap = h.uses_port(COAP_PORT);
        self.layers.push(Layer::Udp(h));
        if coap {
            self.coap(payload)
        } else {
            self.raw(payload);
            Ok(())
        }
    }

    fn coap(&mut self, data: &[u8]) -> Result<(), DecodeError> {
        match CoapMessage::parse(data) {
            Ok(m) => {
                self.layers.push(Layer::Coap(m));
                Ok(())
            }
            Err(e) => {
                self.raw(data);
                Err(e)
            }
        }
    }

    fn ieee802154(&mut self, data: &[u8], with_fcs: bool) -> Result<(), DecodeError> {
        let (frame, payload) = Ieee802154Frame::parse(data, with_fcs)?;
        let iids = IidContext::from_link(frame.src.map(Into::into), frame.dst.map(Into::into));
        let carries_ip = frame.frame_type == FrameType::Data && !frame.security;
        self.layers.push(Layer::Ieee802154(frame));
        if carries_ip {
            self.sixlowpan(payload, iids)
        } else {
            self.raw(payload);
            Ok(())
        }
    }

    fn sixlowpan(&mut self, data: &[u8], iids: IidContext) -> Result<(), DecodeError> {
        match data.first() {
            Some(&LOWPAN_DISPATCH_IPV6) => self.ipv6(&data[1..]),
            Some(&b) if b & LOWPAN_IPHC_MASK == LOWPAN_IPHC_DISPATCH => {
                let d = match iphc::decompress(data, self.contexts, &iids) {
                    Ok(d) => d,
                    Err(e) => {
                        self.raw(data);
                        return Err(e);
                    }
                };
                let mut rebuilt = d.headers;
                rebuilt.extend_from_slice(&data[d.consumed_bits / 8..]);
                self.layers.push(Layer::SixLowpan(d.header));
                self.ipv6(&rebuilt)
            }
            _ => {
                self.raw(data);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::ieee802154::MacAddress;
    use crate::wire::{checksum, coap::CoapType, coap::CoapCode, Protocol};
    use std::net::Ipv6Addr;

    fn coap_over_ipv6(src: &str, dst: &str) -> (Ipv6Header, Vec<u8>) {
        let msg = CoapMessage::new(CoapType::Con, CoapCode::GET, 0x1234)
            .with_token(vec![0xab])
            .with_uri_path("/test");
        let coap = msg.emit();
        let ip = Ipv6Header {
            traffic_class: 0,
            flow_label: 0,
            payload_len: (UdpHeader::LEN + coap.len()) as u16,
            next_header: ipproto::UDP,
            hop_limit: 64,
            src: src.parse::<Ipv6Addr>().unwrap(),
            dst: dst.parse::<Ipv6Addr>().unwrap(),
        };
        let mut udp = UdpHeader {
            src_port: 40000,
            dst_port: COAP_PORT,
            length: (UdpHeader::LEN + coap.len()) as u16,
            checksum: 0,
        };
        let mut seg = udp.emit().to_vec();
        seg.extend_from_slice(&coap);
        udp.checksum = checksum::udp_ipv6(&ip.src, &ip.dst, &seg);
        let mut out = ip.emit().to_vec();
        out.extend_from_slice(&udp.emit());
        out.extend_from_slice(&coap);
        (ip, out)
    }

    fn protocols(p: &Packet) -> Vec<Protocol> {
        p.layers().iter().map(Layer::protocol).collect()
    }

    #[test]
    fn test_raw_ipv6_coap() {
        let (_, bytes) = coap_over_ipv6("2001:db8::1", "2001:db8::2");
        let (pkt, err) = decode(linktype::RAW, &Bytes::from(bytes), &ContextTable::new());
        assert!(err.is_none());
        assert_eq!(protocols(&pkt), vec![Protocol::Ipv6, Protocol::Udp, Protocol::Coap]);
        let coap = pkt.find(Protocol::Coap).and_then(Layer::as_coap).unwrap();
        assert_eq!(coap.uri_path(), "/test");
    }

    #[test]
    fn test_802154_iphc_coap() {
        let src = MacAddress::Short([0x00, 0x01]);
        let dst = MacAddress::Short([0x00, 0x02]);
        let (ip, bytes) = coap_over_ipv6("fe80::ff:fe00:1", "fe80::ff:fe00:2");
        let iids = IidContext::from_link(Some(src.into()), Some(dst.into()));
        let lowpan = iphc::compress_packet(&bytes, &ContextTable::new(), &iids).unwrap();
        let mac = Ieee802154Frame::data(0xabcd, src, dst, 7).emit(&lowpan, true);

        let (pkt, err) = decode(
            linktype::IEEE802_15_4_WITHFCS,
            &Bytes::from(mac),
            &ContextTable::new(),
        );
        assert!(err.is_none(), "{:?}", err);
        assert_eq!(
            protocols(&pkt),
            vec![
                Protocol::Ieee802154,
                Protocol::SixLowpan,
                Protocol::Ipv6,
                Protocol::Udp,
                Protocol::Coap
            ]
        );
        assert_eq!(pkt.find(Protocol::Ipv6), Some(&Layer::Ipv6(ip)));
    }

    #[test]
    fn test_partial_layers_kept() {
        let (_, mut bytes) = coap_over_ipv6("2001:db8::1", "2001:db8::2");
        // token length 15 is reserved
        let coap_start = Ipv6Header::LEN + UdpHeader::LEN;
        bytes[coap_start] = 0x4f;
        let (pkt, err) = decode(linktype::RAW, &Bytes::from(bytes), &ContextTable::new());
        assert!(err.is_some());
        assert_eq!(protocols(&pkt), vec![Protocol::Ipv6, Protocol::Udp, Protocol::Raw]);
    }

    #[test]
    fn test_nested_ipv6_depth_limited() {
        let mut pkt: Vec<u8> = Vec::new();
        let mut nh = 59;
        for _ in 0..20 {
            let hdr = Ipv6Header {
                traffic_class: 0,
                flow_label: 0,
                payload_len: pkt.len() as u16,
                next_header: nh,
                hop_limit: 64,
                src: Ipv6Addr::LOCALHOST,
                dst: Ipv6Addr::LOCALHOST,
            };
            let mut outer = hdr.emit().to_vec();
            outer.extend_from_slice(&pkt);
            pkt = outer;
            nh = ipproto::IPV6;
        }

        let (pkt, err) = decode(linktype::RAW, &Bytes::from(pkt), &ContextTable::new());
        assert_eq!(
            err,
            Some(DecodeError::EncapsulationTooDeep(MAX_ENCAPSULATION_DEPTH))
        );
        let ipv6 = protocols(&pkt).iter().filter(|p| **p == Protocol::Ipv6).count();
        assert_eq!(ipv6, MAX_ENCAPSULATION_DEPTH + 1);
        assert_eq!(pkt.layers().last().map(Layer::protocol), Some(Protocol::Raw));
    }

    #[test]
    fn test_unknown_link_type() {
        let (pkt, err) = decode(9999, &Bytes::from_static(b"abc"), &ContextTable::new());
        assert_eq!(err, Some(DecodeError::UnsupportedLinkType(9999)));
        assert_eq!(protocols(&pkt), vec![Protocol::Raw]);
    }
}
