//! Protocol layers and the per-frame decode chain
//!
//! A decoded frame is a [`Packet`]: its layers in order from the link layer
//! inwards. Walking the vector is walking the payload chain. The same
//! protocol may appear twice (IPv6 encapsulated in IPv6).

pub mod checksum;
pub mod coap;
mod decode;
pub mod ieee802154;
pub mod ip;
pub mod link;
pub mod udp;

pub use decode::decode;

use crate::iphc::IphcHeader;
use bytes::Bytes;
use coap::{hex_spaced, CoapMessage};
use ieee802154::Ieee802154Frame;
use ip::{Ipv4Header, Ipv6Header};
use link::{EthernetHeader, LinuxCookedHeader, LoopbackHeader};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use udp::UdpHeader;

/// Protocol tag, one per [`Layer`] variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    /// BSD loopback
    Loopback,
    /// Ethernet II
    Ethernet,
    /// Linux cooked capture
    LinuxCooked,
    /// IEEE 802.15.4 MAC
    Ieee802154,
    /// 6LoWPAN IPHC
    SixLowpan,
    /// IPv4
    Ipv4,
    /// IPv6
    Ipv6,
    /// UDP
    Udp,
    /// CoAP
    Coap,
    /// Undecoded bytes
    Raw,
}

impl Protocol {
    /// Every protocol, link layers first
    pub const ALL: [Protocol; 10] = [
        Protocol::Loopback,
        Protocol::Ethernet,
        Protocol::LinuxCooked,
        Protocol::Ieee802154,
        Protocol::SixLowpan,
        Protocol::Ipv4,
        Protocol::Ipv6,
        Protocol::Udp,
        Protocol::Coap,
        Protocol::Raw,
    ];

    /// Display name
    pub fn name(self) -> &'static str {
        match self {
            Protocol::Loopback => "NullLoopback",
            Protocol::Ethernet => "Ethernet",
            Protocol::LinuxCooked => "LinuxCookedCapture",
            Protocol::Ieee802154 => "Ieee802154",
            Protocol::SixLowpan => "SixLowpanIPHC",
            Protocol::Ipv4 => "IPv4",
            Protocol::Ipv6 => "IPv6",
            Protocol::Udp => "UDP",
            Protocol::Coap => "CoAP",
            Protocol::Raw => "BytesValue",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.to_ascii_lowercase().replace(['-', '_', ' ', '.'], "");
        let proto = match key.as_str() {
            "null" | "loopback" | "nullloopback" => Protocol::Loopback,
            "ethernet" | "eth" => Protocol::Ethernet,
            "sll" | "linuxcooked" | "linuxcookedcapture" => Protocol::LinuxCooked,
            "ieee802154" | "802154" | "wpan" => Protocol::Ieee802154,
            "6lowpan" | "sixlowpan" | "sixlowpaniphc" | "iphc" => Protocol::SixLowpan,
            "ipv4" | "ip" => Protocol::Ipv4,
            "ipv6" => Protocol::Ipv6,
            "udp" => Protocol::Udp,
            "coap" => Protocol::Coap,
            "raw" | "bytes" | "bytesvalue" => Protocol::Raw,
            _ => return Err(format!("unknown protocol: {}", s)),
        };
        Ok(proto)
    }
}

/// One decoded protocol header
#[derive(Debug, Clone, PartialEq)]
pub enum Layer {
    /// BSD loopback
    Loopback(LoopbackHeader),
    /// Ethernet II
    Ethernet(EthernetHeader),
    /// Linux cooked capture
    LinuxCooked(LinuxCookedHeader),
    /// IEEE 802.15.4 MAC
    Ieee802154(Ieee802154Frame),
    /// 6LoWPAN IPHC as found on the wire
    SixLowpan(IphcHeader),
    /// IPv4
    Ipv4(Ipv4Header),
    /// IPv6 (rebuilt when it came from IPHC)
    Ipv6(Ipv6Header),
    /// UDP
    Udp(UdpHeader),
    /// CoAP
    Coap(CoapMessage),
    /// Undecoded remainder
    Raw(Bytes),
}

fn flag(b: bool) -> String {
    (b as u8).to_string()
}

impl Layer {
    /// Protocol tag
    pub fn protocol(&self) -> Protocol {
        match self {
            Layer::Loopback(_) => Protocol::Loopback,
            Layer::Ethernet(_) => Protocol::Ethernet,
            Layer::LinuxCooked(_) => Protocol::LinuxCooked,
            Layer::Ieee802154(_) => Protocol::Ieee802154,
            Layer::SixLowpan(_) => Protocol::SixLowpan,
            Layer::Ipv4(_) => Protocol::Ipv4,
            Layer::Ipv6(_) => Protocol::Ipv6,
            Layer::Udp(_) => Protocol::Udp,
            Layer::Coap(_) => Protocol::Coap,
            Layer::Raw(_) => Protocol::Raw,
        }
    }

    /// The CoAP message, if this is a CoAP layer
    pub fn as_coap(&self) -> Option<&CoapMessage> {
        match self {
            Layer::Coap(m) => Some(m),
            _ => None,
        }
    }

    /// The UDP header, if this is a UDP layer
    pub fn as_udp(&self) -> Option<&UdpHeader> {
        match self {
            Layer::Udp(h) => Some(h),
            _ => None,
        }
    }

    /// One-line description
    pub fn describe(&self) -> String {
        match self {
            Layer::Loopback(h) => format!("Null/Loopback family {}", h.family),
            Layer::Ethernet(h) => format!("Ethernet {} -> {}", h.src, h.dst),
            Layer::LinuxCooked(h) => format!("Linux cooked capture proto {:#06x}", h.protocol),
            Layer::Ieee802154(f) => {
                let addr = |a: &Option<ieee802154::MacAddress>| {
                    a.map_or_else(|| "-".to_string(), |a| a.to_string())
                };
                format!(
                    "IEEE 802.15.4 {:?} seq {} {} -> {}",
                    f.frame_type,
                    f.sequence,
                    addr(&f.src),
                    addr(&f.dst)
                )
            }
            Layer::SixLowpan(h) => match &h.nhc {
                Some(nhc) => format!("6LoWPAN IPHC + NHC {}", nhc.describe()),
                None => "6LoWPAN IPHC".to_string(),
            },
            Layer::Ipv4(h) => format!("IPv4 {} -> {} proto {}", h.src, h.dst, h.protocol),
            Layer::Ipv6(h) => format!("IPv6 {} -> {} nh {}", h.src, h.dst, h.next_header),
            Layer::Udp(h) => format!("UDP {} -> {}", h.src_port, h.dst_port),
            Layer::Coap(m) => m.describe(),
            Layer::Raw(b) => format!("Raw {} bytes", b.len()),
        }
    }

    /// `(field, value)` pairs in wire order
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Layer::Loopback(h) => vec![("Family", h.family.to_string())],
            Layer::Ethernet(h) => vec![
                ("Destination", h.dst.to_string()),
                ("Source", h.src.to_string()),
                ("Type", format!("{:#06x}", h.ethertype)),
            ],
            Layer::LinuxCooked(h) => vec![
                ("PacketType", h.packet_type.to_string()),
                ("ArphrdType", h.arphrd_type.to_string()),
                ("Address", hex_spaced(&h.address)),
                ("Protocol", format!("{:#06x}", h.protocol)),
            ],
            Layer::Ieee802154(f) => {
                let opt = |v: Option<String>| v.unwrap_or_default();
                vec![
                    ("FrameType", format!("{:?}", f.frame_type)),
                    ("SecurityEnabled", flag(f.security)),
                    ("FramePending", flag(f.frame_pending)),
                    ("AckRequest", flag(f.ack_request)),
                    ("PanIdCompression", flag(f.pan_id_compression)),
                    ("FrameVersion", f.version.to_string()),
                    ("SequenceNumber", f.sequence.to_string()),
                    ("DestinationPanId", opt(f.dst_pan.map(|p| format!("{:#06x}", p)))),
                    ("DestinationAddress", opt(f.dst.map(|a| a.to_string()))),
                    ("SourcePanId", opt(f.src_pan.map(|p| format!("{:#06x}", p)))),
                    ("SourceAddress", opt(f.src.map(|a| a.to_string()))),
                    ("FCS", opt(f.fcs.map(|v| format!("{:#06x}", v)))),
                ]
            }
            Layer::SixLowpan(h) => h.fields(),
            Layer::Ipv4(h) => vec![
                ("Version", "4".to_string()),
                ("HeaderLength", h.header_len.to_string()),
                ("TypeOfService", format!("{:#04x}", h.tos)),
                ("TotalLength", h.total_len.to_string()),
                ("Identification", format!("{:#06x}", h.ident)),
                ("FlagsFragment", format!("{:#06x}", h.flags_fragment)),
                ("TimeToLive", h.ttl.to_string()),
                ("Protocol", h.protocol.to_string()),
                ("Checksum", format!("{:#06x}", h.checksum)),
                ("SourceAddress", h.src.to_string()),
                ("DestinationAddress", h.dst.to_string()),
            ],
            Layer::Ipv6(h) => vec![
                ("Version", "6".to_string()),
                ("TrafficClass", format!("{:#04x}", h.traffic_class)),
                ("FlowLabel", format!("{:#07x}", h.flow_label)),
                ("PayloadLength", h.payload_len.to_string()),
                ("NextHeader", h.next_header.to_string()),
                ("HopLimit", h.hop_limit.to_string()),
                ("SourceAddress", h.src.to_string()),
                ("DestinationAddress", h.dst.to_string()),
            ],
            Layer::Udp(h) => vec![
                ("SourcePort", h.src_port.to_string()),
                ("DestinationPort", h.dst_port.to_string()),
                ("Length", h.length.to_string()),
                ("Checksum", format!("{:#06x}", h.checksum)),
            ],
            Layer::Coap(m) => vec![
                ("Version", m.version.to_string()),
                ("Type", m.ty.to_string()),
                ("TokenLength", m.token.len().to_string()),
                ("Code", m.code.to_string()),
                ("MessageID", format!("{:#06x}", m.message_id)),
                ("Token", hex_spaced(&m.token)),
                ("Payload", String::from_utf8_lossy(&m.payload).into_owned()),
            ],
            Layer::Raw(b) => vec![("Length", b.len().to_string()), ("Data", hex_spaced(b))],
        }
    }

    /// CoAP options as `(field, value)` lists; empty for other layers
    pub fn options(&self) -> Vec<Vec<(&'static str, String)>> {
        match self {
            Layer::Coap(m) => m
                .options
                .iter()
                .map(|o| {
                    vec![
                        ("Option", o.kind().name()),
                        ("Number", o.number.to_string()),
                        ("Length", o.value.len().to_string()),
                        ("Value", o.display_value()),
                    ]
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Layers of one frame, outermost first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Packet {
    layers: Vec<Layer>,
}

impl Packet {
    /// Build from layers
    pub fn new(layers: Vec<Layer>) -> Self {
        Self { layers }
    }

    /// All layers
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// First layer of `protocol` walking inwards
    pub fn find(&self, protocol: Protocol) -> Option<&Layer> {
        self.layers.iter().find(|l| l.protocol() == protocol)
    }

    /// Last (innermost) layer of `protocol`
    pub fn find_last(&self, protocol: Protocol) -> Option<&Layer> {
        self.layers.iter().rev().find(|l| l.protocol() == protocol)
    }

    /// True if any layer is `protocol`
    pub fn contains(&self, protocol: Protocol) -> bool {
        self.find(protocol).is_some()
    }

    /// Innermost decoded layer, ignoring a trailing raw payload
    pub fn top(&self) -> Option<&Layer> {
        self.layers
            .iter()
            .rev()
            .find(|l| l.protocol() != Protocol::Raw)
            .or_else(|| self.layers.last())
    }
}
