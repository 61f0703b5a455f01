//! A single capture record and its decoded layers

use crate::error::{AttributeError, DecodeError, ProtocolNotFound};
use crate::iphc::ContextTable;
use crate::wire::{self, Layer, Packet, Protocol};
use bytes::Bytes;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::OnceLock;

/// One captured packet
///
/// Frames are immutable once built; `summary()` and `dict()` are computed
/// on first use and cached.
#[derive(Debug, Clone)]
pub struct Frame {
    id: usize,
    timestamp: f64,
    packet: Packet,
    error: Option<DecodeError>,
    summary: OnceLock<String>,
    dict: OnceLock<Map<String, Value>>,
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.timestamp == other.timestamp
            && self.packet == other.packet
            && self.error == other.error
    }
}

/// Result of indexing a frame by name
#[derive(Debug, Clone, PartialEq)]
pub enum FrameAttr<'a> {
    /// Frame number
    Id(usize),
    /// Capture timestamp in seconds
    Timestamp(f64),
    /// Decode error, if any
    Error(Option<&'a DecodeError>),
    /// The layer stack
    Value(&'a Packet),
    /// A port number
    Port(u16),
    /// Any other attribute, rendered as text
    Text(String),
}

impl fmt::Display for FrameAttr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameAttr::Id(id) => write!(f, "{}", id),
            FrameAttr::Timestamp(ts) => write!(f, "{:.6}", ts),
            FrameAttr::Error(None) => f.write_str("None"),
            FrameAttr::Error(Some(e)) => write!(f, "{}", e),
            FrameAttr::Value(p) => {
                let names: Vec<String> = p.layers().iter().map(|l| l.protocol().to_string()).collect();
                f.write_str(&names.join(" / "))
            }
            FrameAttr::Port(p) => write!(f, "{}", p),
            FrameAttr::Text(s) => f.write_str(s),
        }
    }
}

impl Frame {
    /// Build from already decoded layers
    pub fn new(id: usize, timestamp: f64, packet: Packet, error: Option<DecodeError>) -> Self {
        Self {
            id,
            timestamp,
            packet,
            error,
            summary: OnceLock::new(),
            dict: OnceLock::new(),
        }
    }

    /// Decode `data` captured on `link_type`
    pub fn decode(
        id: usize,
        timestamp: f64,
        link_type: u32,
        data: &Bytes,
        contexts: &ContextTable,
    ) -> Self {
        let (packet, error) = wire::decode(link_type, data, contexts);
        Self::new(id, timestamp, packet, error)
    }

    /// Frame number, 1-based in capture order
    pub fn id(&self) -> usize {
        self.id
    }

    /// Capture timestamp in seconds
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// Decoded layers
    pub fn packet(&self) -> &Packet {
        &self.packet
    }

    /// Decode error, if decoding stopped early
    pub fn error(&self) -> Option<&DecodeError> {
        self.error.as_ref()
    }

    /// First layer of `protocol`, walking inwards
    pub fn layer(&self, protocol: Protocol) -> Result<&Layer, ProtocolNotFound> {
        self.packet.find(protocol).ok_or(ProtocolNotFound(protocol))
    }

    /// True if the frame carries `protocol`
    pub fn contains(&self, protocol: Protocol) -> bool {
        self.packet.contains(protocol)
    }

    /// Innermost IP source and destination
    pub fn ip_addresses(&self) -> Option<(String, String)> {
        self.packet
            .layers()
            .iter()
            .rev()
            .find_map(|l| match l {
                Layer::Ipv6(h) => Some((h.src.to_string(), h.dst.to_string())),
                Layer::Ipv4(h) => Some((h.src.to_string(), h.dst.to_string())),
                _ => None,
            })
    }

    /// Link-layer source and destination
    pub fn hw_addresses(&self) -> Option<(String, String)> {
        self.packet.layers().iter().find_map(|l| match l {
            Layer::Ethernet(h) => Some((h.src.to_string(), h.dst.to_string())),
            Layer::Ieee802154(f) => {
                let show = |a: Option<wire::ieee802154::MacAddress>| {
                    a.map_or_else(|| "-".to_string(), |a| a.to_string())
                };
                Some((show(f.src), show(f.dst)))
            }
            _ => None,
        })
    }

    fn udp_ports(&self) -> Option<(u16, u16)> {
        self.packet
            .find_last(Protocol::Udp)
            .and_then(Layer::as_udp)
            .map(|h| (h.src_port, h.dst_port))
    }

    /// Look up an attribute by name
    ///
    /// Keys: `id`, `ts`, `error`, `value`, `src`, `dst`, `hw_src`, `hw_dst`,
    /// `src_port`, `dst_port`, `protocol`, `info`.
    pub fn get(&self, key: &str) -> Result<FrameAttr<'_>, AttributeError> {
        let missing = || AttributeError::Missing(key.to_string());
        let attr = match key {
            "id" => FrameAttr::Id(self.id),
            "ts" => FrameAttr::Timestamp(self.timestamp),
            "error" => FrameAttr::Error(self.error.as_ref()),
            "value" => FrameAttr::Value(&self.packet),
            "src" | "dst" => {
                let (src, dst) = self.ip_addresses().ok_or_else(missing)?;
                FrameAttr::Text(if key == "src" { src } else { dst })
            }
            "hw_src" | "hw_dst" => {
                let (src, dst) = self.hw_addresses().ok_or_else(missing)?;
                FrameAttr::Text(if key == "hw_src" { src } else { dst })
            }
            "src_port" | "dst_port" => {
                let (sp, dp) = self.udp_ports().ok_or_else(missing)?;
                FrameAttr::Port(if key == "src_port" { sp } else { dp })
            }
            "protocol" => FrameAttr::Text(self.packet.top().ok_or_else(missing)?.protocol().to_string()),
            "info" => FrameAttr::Text(self.packet.top().ok_or_else(missing)?.describe()),
            _ => return Err(AttributeError::Unknown(key.to_string())),
        };
        Ok(attr)
    }

    /// `(id, one-line description)`
    pub fn summary(&self) -> (usize, &str) {
        let line = self.summary.get_or_init(|| {
            let mut out = String::new();
            if let Some((src, dst)) = self.ip_addresses().or_else(|| self.hw_addresses()) {
                out.push_str(&format!("[{} -> {}] ", src, dst));
            }
            match self.packet.top() {
                Some(layer) => out.push_str(&layer.describe()),
                None => out.push_str("Empty frame"),
            }
            if let Some(e) = &self.error {
                out.push_str(&format!(" (malformed: {})", e));
            }
            out
        });
        (self.id, line.as_str())
    }

    /// Ordered mapping of the frame and its protocol stack
    pub fn dict(&self) -> &Map<String, Value> {
        self.dict.get_or_init(|| {
            let stack: Vec<Value> = self.packet.layers().iter().map(layer_dict).collect();
            let mut m = Map::new();
            m.insert("_type".into(), "frame".into());
            m.insert("id".into(), self.id.into());
            m.insert("timestamp".into(), self.timestamp.into());
            m.insert(
                "error".into(),
                self.error.as_ref().map_or(Value::Null, |e| e.to_string().into()),
            );
            m.insert("protocol_stack".into(), Value::Array(stack));
            m
        })
    }
}

fn layer_dict(layer: &Layer) -> Value {
    let mut m = Map::new();
    m.insert("_type".into(), "protocol".into());
    m.insert("_protocol".into(), layer.protocol().to_string().into());
    for (name, value) in layer.fields() {
        m.insert(name.into(), value.into());
    }
    let options = layer.options();
    if !options.is_empty() {
        let list = options
            .into_iter()
            .map(|fields| {
                Value::Object(
                    fields
                        .into_iter()
                        .map(|(k, v)| (k.to_string(), Value::String(v)))
                        .collect(),
                )
            })
            .collect();
        m.insert("Options".into(), Value::Array(list));
    }
    Value::Object(m)
}
