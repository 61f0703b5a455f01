//! CoAP messages (RFC 7252, with the Block and Observe options)

use crate::constants::COAP_PAYLOAD_MARKER;
use crate::error::DecodeError;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Message type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoapType {
    /// Confirmable
    Con,
    /// Non-confirmable
    Non,
    /// Acknowledgement
    Ack,
    /// Reset
    Rst,
}

impl CoapType {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => CoapType::Con,
            1 => CoapType::Non,
            2 => CoapType::Ack,
            _ => CoapType::Rst,
        }
    }

    fn bits(self) -> u8 {
        match self {
            CoapType::Con => 0,
            CoapType::Non => 1,
            CoapType::Ack => 2,
            CoapType::Rst => 3,
        }
    }
}

impl fmt::Display for CoapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CoapType::Con => "CON",
            CoapType::Non => "NON",
            CoapType::Ack => "ACK",
            CoapType::Rst => "RST",
        })
    }
}

/// Method or response code, `class.detail` packed in one byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CoapCode(pub u8);

impl CoapCode {
    /// Empty message
    pub const EMPTY: CoapCode = CoapCode(0);
    /// GET
    pub const GET: CoapCode = CoapCode(1);
    /// POST
    pub const POST: CoapCode = CoapCode(2);
    /// PUT
    pub const PUT: CoapCode = CoapCode(3);
    /// DELETE
    pub const DELETE: CoapCode = CoapCode(4);
    /// 2.01 Created
    pub const CREATED: CoapCode = CoapCode(65);
    /// 2.02 Deleted
    pub const DELETED: CoapCode = CoapCode(66);
    /// 2.03 Valid
    pub const VALID: CoapCode = CoapCode(67);
    /// 2.04 Changed
    pub const CHANGED: CoapCode = CoapCode(68);
    /// 2.05 Content
    pub const CONTENT: CoapCode = CoapCode(69);
    /// 4.04 Not Found
    pub const NOT_FOUND: CoapCode = CoapCode(132);

    /// Build from class and detail
    pub const fn new(class: u8, detail: u8) -> Self {
        CoapCode((class << 5) | (detail & 0x1f))
    }

    /// Class (0 request, 2 success, 4 client error, 5 server error)
    pub fn class(self) -> u8 {
        self.0 >> 5
    }

    /// Detail
    pub fn detail(self) -> u8 {
        self.0 & 0x1f
    }

    /// Code carries a method
    pub fn is_request(self) -> bool {
        (1..32).contains(&self.0)
    }

    /// Code carries a response
    pub fn is_response(self) -> bool {
        self.0 >= 32
    }
}

impl fmt::Display for CoapCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let known = match self.0 {
            0 => "Empty",
            1 => "GET",
            2 => "POST",
            3 => "PUT",
            4 => "DELETE",
            5 => "FETCH",
            6 => "PATCH",
            7 => "iPATCH",
            65 => "2.01 Created",
            66 => "2.02 Deleted",
            67 => "2.03 Valid",
            68 => "2.04 Changed",
            69 => "2.05 Content",
            95 => "2.31 Continue",
            128 => "4.00 Bad Request",
            129 => "4.01 Unauthorized",
            130 => "4.02 Bad Option",
            131 => "4.03 Forbidden",
            132 => "4.04 Not Found",
            133 => "4.05 Method Not Allowed",
            134 => "4.06 Not Acceptable",
            136 => "4.08 Request Entity Incomplete",
            140 => "4.12 Precondition Failed",
            141 => "4.13 Request Entity Too Large",
            143 => "4.15 Unsupported Content-Format",
            160 => "5.00 Internal Server Error",
            161 => "5.01 Not Implemented",
            162 => "5.02 Bad Gateway",
            163 => "5.03 Service Unavailable",
            164 => "5.04 Gateway Timeout",
            165 => "5.05 Proxying Not Supported",
            c if (1..32).contains(&c) => return write!(f, "Request {}", c),
            c if (64..192).contains(&c) => {
                let group = match c >> 5 {
                    2 => "Success",
                    4 => "Client Error",
                    5 => "Server Error",
                    _ => "Reserved",
                };
                return write!(f, "{}.{:02} {}", c >> 5, c & 0x1f, group);
            }
            _ => "Reserved",
        };
        f.write_str(known)
    }
}

/// How an option value is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionFormat {
    /// Zero-length
    Empty,
    /// Raw bytes
    Opaque,
    /// Big-endian unsigned integer, leading zeros stripped
    Uint,
    /// UTF-8 text
    String,
    /// Block number, more flag and size exponent
    Block,
}

/// Registered option numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoapOptionKind {
    /// 1
    IfMatch,
    /// 3
    UriHost,
    /// 4
    ETag,
    /// 5
    IfNoneMatch,
    /// 6
    Observe,
    /// 7
    UriPort,
    /// 8
    LocationPath,
    /// 11
    UriPath,
    /// 12
    ContentFormat,
    /// 14
    MaxAge,
    /// 15
    UriQuery,
    /// 17
    Accept,
    /// 20
    LocationQuery,
    /// 23
    Block2,
    /// 27
    Block1,
    /// 28
    Size2,
    /// 35
    ProxyUri,
    /// 39
    ProxyScheme,
    /// 60
    Size1,
    /// Anything else, kept opaque
    Unknown(u16),
}

impl CoapOptionKind {
    /// Look up an option number
    pub fn from_number(number: u16) -> Self {
        use CoapOptionKind::*;
        match number {
            1 => IfMatch,
            3 => UriHost,
            4 => ETag,
            5 => IfNoneMatch,
            6 => Observe,
            7 => UriPort,
            8 => LocationPath,
            11 => UriPath,
            12 => ContentFormat,
            14 => MaxAge,
            15 => UriQuery,
            17 => Accept,
            20 => LocationQuery,
            23 => Block2,
            27 => Block1,
            28 => Size2,
            35 => ProxyUri,
            39 => ProxyScheme,
            60 => Size1,
            n => Unknown(n),
        }
    }

    /// Option number on the wire
    pub fn number(self) -> u16 {
        use CoapOptionKind::*;
        match self {
            IfMatch => 1,
            UriHost => 3,
            ETag => 4,
            IfNoneMatch => 5,
            Observe => 6,
            UriPort => 7,
            LocationPath => 8,
            UriPath => 11,
            ContentFormat => 12,
            MaxAge => 14,
            UriQuery => 15,
            Accept => 17,
            LocationQuery => 20,
            Block2 => 23,
            Block1 => 27,
            Size2 => 28,
            ProxyUri => 35,
            ProxyScheme => 39,
            Size1 => 60,
            Unknown(n) => n,
        }
    }

    /// Registered name
    pub fn name(self) -> String {
        use CoapOptionKind::*;
        let name = match self {
            IfMatch => "If-Match",
            UriHost => "Uri-Host",
            ETag => "ETag",
            IfNoneMatch => "If-None-Match",
            Observe => "Observe",
            UriPort => "Uri-Port",
            LocationPath => "Location-Path",
            UriPath => "Uri-Path",
            ContentFormat => "Content-Format",
            MaxAge => "Max-Age",
            UriQuery => "Uri-Query",
            Accept => "Accept",
            LocationQuery => "Location-Query",
            Block2 => "Block2",
            Block1 => "Block1",
            Size2 => "Size2",
            ProxyUri => "Proxy-Uri",
            ProxyScheme => "Proxy-Scheme",
            Size1 => "Size1",
            Unknown(n) => return format!("Option {}", n),
        };
        name.to_string()
    }

    /// Value rendering
    pub fn format(self) -> OptionFormat {
        use CoapOptionKind::*;
        match self {
            IfNoneMatch => OptionFormat::Empty,
            UriHost | LocationPath | UriPath | UriQuery | LocationQuery | ProxyUri
            | ProxyScheme => OptionFormat::String,
            Observe | UriPort | ContentFormat | MaxAge | Accept | Size1 | Size2 => {
                OptionFormat::Uint
            }
            Block1 | Block2 => OptionFormat::Block,
            IfMatch | ETag | Unknown(_) => OptionFormat::Opaque,
        }
    }

    /// Allowed value length range
    pub fn length_range(self) -> (usize, usize) {
        use CoapOptionKind::*;
        match self {
            IfMatch => (0, 8),
            UriHost | ProxyScheme => (1, 255),
            ETag => (1, 8),
            IfNoneMatch => (0, 0),
            Observe | Block1 | Block2 => (0, 3),
            UriPort | ContentFormat | Accept => (0, 2),
            MaxAge | Size1 | Size2 => (0, 4),
            LocationPath | UriPath | UriQuery | LocationQuery => (0, 255),
            ProxyUri => (1, 1034),
            Unknown(_) => (0, usize::MAX),
        }
    }
}

impl fmt::Display for CoapOptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Human name of a Content-Format value
pub fn content_format_name(value: u32) -> Option<&'static str> {
    Some(match value {
        0 => "text/plain; charset=utf-8",
        40 => "application/link-format",
        41 => "application/xml",
        42 => "application/octet-stream",
        47 => "application/exi",
        50 => "application/json",
        60 => "application/cbor",
        _ => return None,
    })
}

/// One option instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapOption {
    /// Option number
    pub number: u16,
    /// Raw value
    pub value: Bytes,
}

impl CoapOption {
    /// Option with a raw value
    pub fn new(kind: CoapOptionKind, value: impl Into<Bytes>) -> Self {
        Self {
            number: kind.number(),
            value: value.into(),
        }
    }

    /// Option with a minimal-length unsigned value
    pub fn uint(kind: CoapOptionKind, value: u32) -> Self {
        let be = value.to_be_bytes();
        let skip = be.iter().take_while(|b| **b == 0).count();
        Self::new(kind, Bytes::copy_from_slice(&be[skip..]))
    }

    /// Registered kind
    pub fn kind(&self) -> CoapOptionKind {
        CoapOptionKind::from_number(self.number)
    }

    /// Value as an unsigned integer
    pub fn uint_value(&self) -> u32 {
        self.value
            .iter()
            .take(4)
            .fold(0u32, |acc, b| (acc << 8) | *b as u32)
    }

    /// Value as text (lossy)
    pub fn str_value(&self) -> String {
        String::from_utf8_lossy(&self.value).into_owned()
    }

    /// Rendered value for summaries and dissections
    pub fn display_value(&self) -> String {
        match self.kind().format() {
            OptionFormat::Empty => String::new(),
            OptionFormat::String => self.str_value(),
            OptionFormat::Opaque => hex_spaced(&self.value),
            OptionFormat::Uint => {
                let v = self.uint_value();
                match (self.kind(), content_format_name(v)) {
                    (CoapOptionKind::ContentFormat | CoapOptionKind::Accept, Some(name)) => {
                        format!("{} ({})", v, name)
                    }
                    _ => v.to_string(),
                }
            }
            OptionFormat::Block => {
                let v = self.uint_value();
                let szx = v & 0x7;
                format!(
                    "num {} {} size {}",
                    v >> 4,
                    if v & 0x8 != 0 { "more" } else { "last" },
                    1u32 << (szx + 4)
                )
            }
        }
    }
}

pub(crate) fn hex_spaced(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// A decoded CoAP message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapMessage {
    /// Protocol version, 1
    pub version: u8,
    /// Message type
    pub ty: CoapType,
    /// Method or response code
    pub code: CoapCode,
    /// Message id
    pub message_id: u16,
    /// Token, 0 to 8 bytes
    pub token: Bytes,
    /// Options in wire order
    pub options: Vec<CoapOption>,
    /// Payload after the marker
    pub payload: Bytes,
}

impl CoapMessage {
    /// Start a message with no token, options or payload
    pub fn new(ty: CoapType, code: CoapCode, message_id: u16) -> Self {
        Self {
            version: 1,
            ty,
            code,
            message_id,
            token: Bytes::new(),
            options: Vec::new(),
            payload: Bytes::new(),
        }
    }

    /// Set the token
    pub fn with_token(mut self, token: impl Into<Bytes>) -> Self {
        self.token = token.into();
        self
    }

    /// Append an option
    pub fn with_option(mut self, option: CoapOption) -> Self {
        self.options.push(option);
        self
    }

    /// Append one Uri-Path option per segment of `path`
    pub fn with_uri_path(mut self, path: &str) -> Self {
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            self.options.push(CoapOption::new(
                CoapOptionKind::UriPath,
                Bytes::copy_from_slice(segment.as_bytes()),
            ));
        }
        self
    }

    /// Set the payload
    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Decode a whole UDP payload
    pub fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < 4 {
            return Err(DecodeError::truncated("CoAP header", 4, data.len()));
        }
        let version = data[0] >> 6;
        let tkl = (data[0] & 0x0f) as usize;
        if tkl > 8 {
            return Err(DecodeError::invalid("CoAP token length", tkl.to_string()));
        }
        if data.len() < 4 + tkl {
            return Err(DecodeError::truncated("CoAP token", 4 + tkl, data.len()));
        }

        let mut msg = Self {
            version,
            ty: CoapType::from_bits(data[0] >> 4),
            code: CoapCode(data[1]),
            message_id: u16::from_be_bytes([data[2], data[3]]),
            token: Bytes::copy_from_slice(&data[4..4 + tkl]),
            options: Vec::new(),
            payload: Bytes::new(),
        };

        let mut pos = 4 + tkl;
        let mut number: u16 = 0;
        while pos < data.len() {
            let byte = data[pos];
            if byte == COAP_PAYLOAD_MARKER {
                if pos + 1 == data.len() {
                    return Err(DecodeError::invalid("CoAP payload", "marker followed by empty payload"));
                }
                msg.payload = Bytes::copy_from_slice(&data[pos + 1..]);
                break;
            }
            pos += 1;
            let delta = read_extended(byte >> 4, data, &mut pos)?;
            let len = read_extended(byte & 0x0f, data, &mut pos)? as usize;
            number = number
                .checked_add(delta)
                .ok_or_else(|| DecodeError::invalid("CoAP option", "option number overflow"))?;
            if data.len() < pos + len {
                return Err(DecodeError::truncated("CoAP option value", pos + len, data.len()));
            }
            let option = CoapOption {
                number,
                value: Bytes::copy_from_slice(&data[pos..pos + len]),
            };
            let (min, max) = option.kind().length_range();
            if len < min || len > max {
                return Err(DecodeError::invalid(
                    "CoAP option",
                    format!(
                        "{} has invalid length {} (should be in [{}..{}])",
                        option.kind(),
                        len,
                        min,
                        max
                    ),
                ));
            }
            msg.options.push(option);
            pos += len;
        }

        Ok(msg)
    }

    /// Encode; options are sorted by number first
    pub fn emit(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16 + self.payload.len());
        out.push((self.version << 6) | (self.ty.bits() << 4) | (self.token.len() as u8 & 0x0f));
        out.push(self.code.0);
        out.extend_from_slice(&self.message_id.to_be_bytes());
        out.extend_from_slice(&self.token);

        let mut options: Vec<&CoapOption> = self.options.iter().collect();
        options.sort_by_key(|o| o.number);
        let mut prev = 0u16;
        for opt in options {
            let (dn, dext) = extended(opt.number - prev);
            let (ln, lext) = extended(opt.value.len() as u16);
            out.push((dn << 4) | ln);
            out.extend_from_slice(&dext);
            out.extend_from_slice(&lext);
            out.extend_from_slice(&opt.value);
            prev = opt.number;
        }

        if !self.payload.is_empty() {
            out.push(COAP_PAYLOAD_MARKER);
            out.extend_from_slice(&self.payload);
        }
        out
    }

    /// First option of `kind`
    pub fn option(&self, kind: CoapOptionKind) -> Option<&CoapOption> {
        self.options.iter().find(|o| o.kind() == kind)
    }

    /// All options of `kind`, in order
    pub fn options_of(&self, kind: CoapOptionKind) -> impl Iterator<Item = &CoapOption> {
        self.options.iter().filter(move |o| o.kind() == kind)
    }

    /// Uri-Path segments joined with `/`; `/` if there are none
    pub fn uri_path(&self) -> String {
        self.path_of(CoapOptionKind::UriPath, CoapOptionKind::UriQuery, "/")
    }

    /// Location-Path segments joined with `/`
    pub fn location_path(&self) -> String {
        self.path_of(CoapOptionKind::LocationPath, CoapOptionKind::LocationQuery, "")
    }

    fn path_of(&self, path: CoapOptionKind, query: CoapOptionKind, empty: &str) -> String {
        let mut out: String = self
            .options_of(path)
            .map(|o| format!("/{}", o.str_value()))
            .collect();
        if out.is_empty() {
            out.push_str(empty);
        }
        for (i, q) in self.options_of(query).enumerate() {
            out.push(if i == 0 { '?' } else { '&' });
            out.push_str(&q.str_value());
        }
        out
    }

    /// One-line description, e.g. `CoAP [CON mid 38515] GET /test, tok 00 01`
    pub fn describe(&self) -> String {
        let mut ty = self.ty.to_string();
        if self.message_id != 0 {
            ty.push_str(&format!(" mid {}", self.message_id));
        }
        let uri = if self.code == CoapCode::EMPTY {
            String::new()
        } else if self.code.is_response() {
            self.location_path()
        } else {
            self.uri_path()
        };
        let mut out = format!("CoAP [{}] {}", ty, self.code);
        if !uri.is_empty() {
            out.push(' ');
            out.push_str(&uri);
        }
        if self.code != CoapCode::EMPTY {
            if self.token.is_empty() {
                out.push_str(", tok None");
            } else {
                out.push_str(", tok ");
                out.push_str(&hex_spaced(&self.token));
            }
        }
        out
    }
}

fn read_extended(nibble: u8, data: &[u8], pos: &mut usize) -> Result<u16, DecodeError> {
    match nibble {
        0..=12 => Ok(nibble as u16),
        13 => {
            let b = *data
                .get(*pos)
                .ok_or_else(|| DecodeError::truncated("CoAP option header", *pos + 1, data.len()))?;
            *pos += 1;
            Ok(b as u16 + 13)
        }
        14 => {
            if data.len() < *pos + 2 {
                return Err(DecodeError::truncated("CoAP option header", *pos + 2, data.len()));
            }
            let v = u16::from_be_bytes([data[*pos], data[*pos + 1]]);
            *pos += 2;
            v.checked_add(269)
                .ok_or_else(|| DecodeError::invalid("CoAP option", "extended value overflow"))
        }
        _ => Err(DecodeError::invalid("CoAP option", "reserved nibble 15")),
    }
}

fn extended(value: u16) -> (u8, Vec<u8>) {
    match value {
        0..=12 => (value as u8, Vec::new()),
        13..=268 => (13, vec![(value - 13) as u8]),
        _ => (14, (value - 269).to_be_bytes().to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_test() -> CoapMessage {
        CoapMessage::new(CoapType::Con, CoapCode::GET, 38515)
            .with_token(vec![0x00, 0x01])
            .with_uri_path("/test")
    }

    #[test]
    fn test_describe_request() {
        assert_eq!(get_test().describe(), "CoAP [CON mid 38515] GET /test, tok 00 01");
    }

    #[test]
    fn test_describe_empty_ack() {
        let ack = CoapMessage::new(CoapType::Ack, CoapCode::EMPTY, 7);
        assert_eq!(ack.describe(), "CoAP [ACK mid 7] Empty");
    }

    #[test]
    fn test_parse_emitted_message() {
        let msg = get_test()
            .with_option(CoapOption::uint(CoapOptionKind::Accept, 50))
            .with_option(CoapOption::new(CoapOptionKind::ProxyUri, vec![b'x'; 300]))
            .with_payload(&b"hello"[..]);
        let parsed = CoapMessage::parse(&msg.emit()).unwrap();
        assert_eq!(parsed.uri_path(), "/test");
        assert_eq!(parsed.option(CoapOptionKind::Accept).unwrap().uint_value(), 50);
        assert_eq!(parsed.option(CoapOptionKind::ProxyUri).unwrap().value.len(), 300);
        assert_eq!(parsed.payload.as_ref(), b"hello");
    }

    #[test]
    fn test_known_bytes() {
        // CON GET mid 0x1234 tok 0xab, Uri-Path "a"
        let data = [0x41, 0x01, 0x12, 0x34, 0xab, 0xb1, b'a'];
        let msg = CoapMessage::parse(&data).unwrap();
        assert_eq!(msg.ty, CoapType::Con);
        assert_eq!(msg.message_id, 0x1234);
        assert_eq!(msg.token.as_ref(), &[0xab]);
        assert_eq!(msg.uri_path(), "/a");
        assert_eq!(msg.emit(), data);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(CoapMessage::parse(&[0x40, 0x01, 0x00]).is_err());
        assert!(CoapMessage::parse(&[0x49, 0x01, 0x00, 0x00]).is_err());
        assert!(CoapMessage::parse(&[0x40, 0x01, 0x00, 0x00, 0xff]).is_err());
        // If-None-Match must be empty
        assert!(CoapMessage::parse(&[0x40, 0x01, 0x00, 0x00, 0x51, 0x00]).is_err());
        // nibble 15 outside of the payload marker
        assert!(CoapMessage::parse(&[0x40, 0x01, 0x00, 0x00, 0xf1, 0x00]).is_err());
    }

    #[test]
    fn test_code_display() {
        assert_eq!(CoapCode::CONTENT.to_string(), "2.05 Content");
        assert_eq!(CoapCode::new(2, 6).to_string(), "2.06 Success");
        assert_eq!(CoapCode(9).to_string(), "Request 9");
        assert_eq!(CoapCode::new(4, 4), CoapCode::NOT_FOUND);
    }

    #[test]
    fn test_option_values() {
        let block = CoapOption::uint(CoapOptionKind::Block2, (3 << 4) | 0x8 | 2);
        assert_eq!(block.display_value(), "num 3 more size 64");
        let cf = CoapOption::uint(CoapOptionKind::ContentFormat, 0);
        assert!(cf.value.is_empty());
        assert_eq!(cf.display_value(), "0 (text/plain; charset=utf-8)");
    }
}
