//! IEEE 802.15.4 MAC frames
//!
//! Addresses are little-endian on the air; they are stored here in the
//! big-endian order used when printing them and when deriving IPv6
//! interface identifiers.

use crate::error::DecodeError;
use crate::iphc::LinkAddress;
use std::fmt;

/// MAC frame type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    /// Beacon
    Beacon,
    /// Data
    Data,
    /// Acknowledgement
    Ack,
    /// MAC command
    Command,
    /// Reserved or newer frame types
    Other(u8),
}

impl From<u8> for FrameType {
    fn from(v: u8) -> Self {
        match v & 0b111 {
            0 => FrameType::Beacon,
            1 => FrameType::Data,
            2 => FrameType::Ack,
            3 => FrameType::Command,
            o => FrameType::Other(o),
        }
    }
}

impl FrameType {
    fn bits(self) -> u16 {
        match self {
            FrameType::Beacon => 0,
            FrameType::Data => 1,
            FrameType::Ack => 2,
            FrameType::Command => 3,
            FrameType::Other(o) => (o & 0b111) as u16,
        }
    }
}

/// Short or extended MAC address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MacAddress {
    /// 16-bit short address
    Short([u8; 2]),
    /// 64-bit extended address (EUI-64)
    Extended([u8; 8]),
}

impl MacAddress {
    fn mode(&self) -> u16 {
        match self {
            MacAddress::Short(_) => 2,
            MacAddress::Extended(_) => 3,
        }
    }

    fn emit_le(&self, out: &mut Vec<u8>) {
        match self {
            MacAddress::Short(a) => out.extend(a.iter().rev()),
            MacAddress::Extended(a) => out.extend(a.iter().rev()),
        }
    }
}

impl From<MacAddress> for LinkAddress {
    fn from(addr: MacAddress) -> Self {
        match addr {
            MacAddress::Short(a) => LinkAddress::Short(a),
            MacAddress::Extended(a) => LinkAddress::Extended(a),
        }
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MacAddress::Short(a) => write!(f, "0x{:02x}{:02x}", a[0], a[1]),
            MacAddress::Extended(a) => {
                let parts: Vec<String> = a.iter().map(|b| format!("{:02x}", b)).collect();
                f.write_str(&parts.join(":"))
            }
        }
    }
}

/// Decoded MAC header (and FCS when present)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ieee802154Frame {
    /// Frame type
    pub frame_type: FrameType,
    /// Security enabled
    pub security: bool,
    /// Frame pending
    pub frame_pending: bool,
    /// Acknowledgement requested
    pub ack_request: bool,
    /// PAN id compression
    pub pan_id_compression: bool,
    /// Frame version
    pub version: u8,
    /// Sequence number
    pub sequence: u8,
    /// Destination PAN
    pub dst_pan: Option<u16>,
    /// Destination address
    pub dst: Option<MacAddress>,
    /// Source PAN (elided when compressed)
    pub src_pan: Option<u16>,
    /// Source address
    pub src: Option<MacAddress>,
    /// Trailing FCS as read
    pub fcs: Option<u16>,
    /// FCS matches the computed CRC
    pub fcs_valid: Option<bool>,
}

/// CRC-16/KERMIT as used for the 802.15.4 FCS
pub fn fcs(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0x8408;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], DecodeError> {
        if self.data.len() < self.pos + n {
            return Err(DecodeError::truncated(what, self.pos + n, self.data.len()));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn pan(&mut self) -> Result<u16, DecodeError> {
        let b = self.take(2, "802.15.4 PAN id")?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn address(&mut self, mode: u16) -> Result<Option<MacAddress>, DecodeError> {
        match mode {
            0 => Ok(None),
            2 => {
                let b = self.take(2, "802.15.4 short address")?;
                Ok(Some(MacAddress::Short([b[1], b[0]])))
            }
            3 => {
                let b = self.take(8, "802.15.4 extended address")?;
                let mut a = [0u8; 8];
                for (i, v) in b.iter().rev().enumerate() {
                    a[i] = *v;
                }
                Ok(Some(MacAddress::Extended(a)))
            }
            m => Err(DecodeError::invalid("802.15.4 address mode", m.to_string())),
        }
    }
}

impl Ieee802154Frame {
    /// Parse a MAC frame; returns the header and the MAC payload
    pub fn parse(data: &[u8], with_fcs: bool) -> Result<(Self, &[u8]), DecodeError> {
        let (body, fcs_value) = if with_fcs {
            if data.len() < 5 {
                return Err(DecodeError::truncated("802.15.4 frame", 5, data.len()));
            }
            let split = data.len() - 2;
            (&data[..split], Some(u16::from_le_bytes([data[split], data[split + 1]])))
        } else {
            (data, None)
        };

        let mut cur = Cursor { data: body, pos: 0 };
        let fc_bytes = cur.take(2, "802.15.4 frame control")?;
        let fc = u16::from_le_bytes([fc_bytes[0], fc_bytes[1]]);
        let sequence = cur.take(1, "802.15.4 sequence number")?[0];

        let dst_mode = (fc >> 10) & 0b11;
        let src_mode = (fc >> 14) & 0b11;
        let pan_id_compression = fc & (1 << 6) != 0;

        let dst_pan = if dst_mode != 0 { Some(cur.pan()?) } else { None };
        let dst = cur.address(dst_mode)?;
        let src_pan = if src_mode != 0 && !pan_id_compression {
            Some(cur.pan()?)
        } else {
            None
        };
        let src = cur.address(src_mode)?;

        let frame = Self {
            frame_type: FrameType::from((fc & 0b111) as u8),
            security: fc & (1 << 3) != 0,
            frame_pending: fc & (1 << 4) != 0,
            ack_request: fc & (1 << 5) != 0,
            pan_id_compression,
            version: ((fc >> 12) & 0b11) as u8,
            sequence,
            dst_pan,
            dst,
            src_pan,
            src,
            fcs: fcs_value,
            fcs_valid: fcs_value.map(|v| v == fcs(body)),
        };
        Ok((frame, &body[cur.pos..]))
    }

    /// Serialize the header followed by `payload`, plus an FCS if `with_fcs`
    pub fn emit(&self, payload: &[u8], with_fcs: bool) -> Vec<u8> {
        let dst_mode = self.dst.map_or(0, |a| a.mode());
        let src_mode = self.src.map_or(0, |a| a.mode());
        let fc: u16 = self.frame_type.bits()
            | (self.security as u16) << 3
            | (self.frame_pending as u16) << 4
            | (self.ack_request as u16) << 5
            | (self.pan_id_compression as u16) << 6
            | dst_mode << 10
            | ((self.version & 0b11) as u16) << 12
            | src_mode << 14;

        let mut out = Vec::with_capacity(25 + payload.len());
        out.extend_from_slice(&fc.to_le_bytes());
        out.push(self.sequence);
        if let Some(dst) = &self.dst {
            out.extend_from_slice(&self.dst_pan.unwrap_or(0xffff).to_le_bytes());
            dst.emit_le(&mut out);
        }
        if let Some(src) = &self.src {
            if !self.pan_id_compression {
                out.extend_from_slice(&self.src_pan.unwrap_or(0xffff).to_le_bytes());
            }
            src.emit_le(&mut out);
        }
        out.extend_from_slice(payload);
        if with_fcs {
            let crc = fcs(&out);
            out.extend_from_slice(&crc.to_le_bytes());
        }
        out
    }

    /// Data frame between `src` and `dst` on `pan`, PAN id compressed
    pub fn data(pan: u16, src: MacAddress, dst: MacAddress, sequence: u8) -> Self {
        Self {
            frame_type: FrameType::Data,
            security: false,
            frame_pending: false,
            ack_request: false,
            pan_id_compression: true,
            version: 1,
            sequence,
            dst_pan: Some(pan),
            dst: Some(dst),
            src_pan: None,
            src: Some(src),
            fcs: None,
            fcs_valid: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fcs_check_value() {
        // CRC-16/KERMIT check value
        assert_eq!(fcs(b"123456789"), 0x2189);
    }

    #[test]
    fn test_emit_parse_extended_short() {
        let src = MacAddress::Extended([0x00, 0x12, 0x4b, 0x00, 0x01, 0x02, 0x03, 0x04]);
        let dst = MacAddress::Short([0xff, 0xff]);
        let frame = Ieee802154Frame::data(0xabcd, src, dst, 9);
        let bytes = frame.emit(&[0x41, 0x60], true);

        let (parsed, payload) = Ieee802154Frame::parse(&bytes, true).unwrap();
        assert_eq!(payload, &[0x41, 0x60]);
        assert_eq!(parsed.src, Some(src));
        assert_eq!(parsed.dst, Some(dst));
        assert_eq!(parsed.dst_pan, Some(0xabcd));
        assert_eq!(parsed.src_pan, None);
        assert_eq!(parsed.frame_type, FrameType::Data);
        assert_eq!(parsed.fcs_valid, Some(true));
        assert_eq!(src.to_string(), "00:12:4b:00:01:02:03:04");
    }

    #[test]
    fn test_short_address_byte_order() {
        // fc: data, dst short, src short, pan compressed
        let data = [0x41, 0x88, 0x01, 0xcd, 0xab, 0x34, 0x12, 0x78, 0x56];
        let (frame, payload) = Ieee802154Frame::parse(&data, false).unwrap();
        assert_eq!(frame.dst, Some(MacAddress::Short([0x12, 0x34])));
        assert_eq!(frame.src, Some(MacAddress::Short([0x56, 0x78])));
        assert!(payload.is_empty());
        assert_eq!(frame.emit(&[], false), data);
    }

    #[test]
    fn test_truncated() {
        assert!(Ieee802154Frame::parse(&[0x41, 0x88], false).is_err());
    }
}
