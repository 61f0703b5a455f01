//! 6LoWPAN IPv6 header compression (RFC 6282)
//!
//! ```text
//!   0                                       1
//!   0   1   2   3   4   5   6   7   8   9   0   1   2   3   4   5
//! +---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+
//! | 0 | 1 | 1 |  TF   |NH | HLIM  |CID|SAC|  SAM  | M |DAC|  DAM  |
//! +---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+
//! ```
//!
//! Inline fields follow in a fixed order: CID extension, traffic class and
//! flow label, next header, hop limit, source address, destination address,
//! then the NHC header if NH is set. Widths are only known by walking this
//! sequence, so reading and writing share the same field order.
//!
//! Omitted fields are `None` in [`IphcHeader`]; nothing is ever guessed.

mod address;
pub mod context;
pub mod nhc;

pub use context::{ContextEntry, ContextPrefix, ContextTable, IidContext, LinkAddress};
pub use nhc::{NhcHeader, UdpNhc};

use crate::bits::{BitReader, BitWriter};
use crate::constants::LOWPAN_IPHC_DISPATCH;
use crate::error::DecodeError;
use crate::wire::ip::Ipv6Header;
use address::{AddressEncoding, AddressInput};

#[cfg(feature = "logging")]
use tracing::debug;

/// Decoded (or to-be-written) LOWPAN_IPHC header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IphcHeader {
    /// Traffic class / flow label mode
    pub tf: u8,
    /// Next header is NHC-compressed
    pub nh: bool,
    /// Hop limit mode
    pub hlim: u8,
    /// Context identifier extension present
    pub cid: bool,
    /// Source address is stateful
    pub sac: bool,
    /// Source address mode
    pub sam: u8,
    /// Destination is multicast
    pub m: bool,
    /// Destination address is stateful
    pub dac: bool,
    /// Destination address mode
    pub dam: u8,
    /// Source context index
    pub sci: Option<u8>,
    /// Destination context index
    pub dci: Option<u8>,
    /// Explicit congestion notification
    pub ecn: Option<u8>,
    /// Differentiated services code point
    pub dscp: Option<u8>,
    /// Flow label
    pub flow_label: Option<u32>,
    /// Inline next header
    pub next_header: Option<u8>,
    /// Inline hop limit
    pub hop_limit: Option<u8>,
    /// Inline source address bytes
    pub src_inline: Vec<u8>,
    /// Inline destination address bytes
    pub dst_inline: Vec<u8>,
    /// Compressed next header
    pub nhc: Option<NhcHeader>,
}

/// Output of [`compress`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compressed {
    /// The header that was written
    pub header: IphcHeader,
    /// IPHC (+ NHC) bytes
    pub bytes: Vec<u8>,
    /// Bytes of the uncompressed packet the header replaces
    pub consumed: usize,
}

/// Output of [`decompress`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decompressed {
    /// The compressed header as read
    pub header: IphcHeader,
    /// Rebuilt IPv6 header
    pub ipv6: Ipv6Header,
    /// Rebuilt IPv6 header followed by any NHC-rebuilt headers
    pub headers: Vec<u8>,
    /// Bits read from the input
    pub consumed_bits: usize,
}

fn hop_limit_code(hop_limit: u8) -> u8 {
    match hop_limit {
        1 => 0b01,
        64 => 0b10,
        255 => 0b11,
        _ => 0b00,
    }
}

fn hop_limit_value(code: u8) -> Option<u8> {
    match code {
        0b01 => Some(1),
        0b10 => Some(64),
        0b11 => Some(255),
        _ => None,
    }
}

impl IphcHeader {
    fn read(r: &mut BitReader<'_>) -> Result<Self, DecodeError> {
        let dispatch = r.read_bits(3)? as u8;
        if dispatch != LOWPAN_IPHC_DISPATCH >> 5 {
            return Err(DecodeError::invalid(
                "IPHC dispatch",
                format!("{:#05b}", dispatch),
            ));
        }
        let tf = r.read_bits(2)? as u8;
        let nh = r.read_flag()?;
        let hlim = r.read_bits(2)? as u8;
        let cid = r.read_flag()?;
        let sac = r.read_flag()?;
        let sam = r.read_bits(2)? as u8;
        let m = r.read_flag()?;
        let dac = r.read_flag()?;
        let dam = r.read_bits(2)? as u8;

        let (sci, dci) = if cid {
            (Some(r.read_bits(4)? as u8), Some(r.read_bits(4)? as u8))
        } else {
            (None, None)
        };

        let ecn = if tf != 3 { Some(r.read_bits(2)? as u8) } else { None };
        let dscp = if tf == 0 || tf == 2 {
            Some(r.read_bits(6)? as u8)
        } else {
            None
        };
        match tf {
            0 => {
                r.read_bits(4)?;
            }
            1 => {
                r.read_bits(2)?;
            }
            _ => {}
        }
        let flow_label = if tf < 2 { Some(r.read_bits(20)?) } else { None };

        let next_header = if nh { None } else { Some(r.read_u8()?) };
        let hop_limit = if hlim == 0 { Some(r.read_u8()?) } else { None };

        let src_inline = r.read_bytes(address::inline_len(sac, sam, false))?;
        let dst_inline = r.read_bytes(address::inline_len(dac, dam, m))?;

        Ok(Self {
            tf,
            nh,
            hlim,
            cid,
            sac,
            sam,
            m,
            dac,
            dam,
            sci,
            dci,
            ecn,
            dscp,
            flow_label,
            next_header,
            hop_limit,
            src_inline,
            dst_inline,
            nhc: None,
        })
    }

    /// Append this header (and its NHC) to `w`
    pub fn write(&self, w: &mut BitWriter) {
        w.write_bits((LOWPAN_IPHC_DISPATCH >> 5) as u32, 3);
        w.write_bits(self.tf as u32, 2);
        w.write_flag(self.nh);
        w.write_bits(self.hlim as u32, 2);
        w.write_flag(self.cid);
        w.write_flag(self.sac);
        w.write_bits(self.sam as u32, 2);
        w.write_flag(self.m);
        w.write_flag(self.dac);
        w.write_bits(self.dam as u32, 2);

        if self.cid {
            w.write_bits(self.sci.unwrap_or(0) as u32, 4);
            w.write_bits(self.dci.unwrap_or(0) as u32, 4);
        }

        if let Some(ecn) = self.ecn {
            w.write_bits(ecn as u32, 2);
        }
        if let Some(dscp) = self.dscp {
            w.write_bits(dscp as u32, 6);
        }
        match self.tf {
            0 => w.write_bits(0, 4),
            1 => w.write_bits(0, 2),
            _ => {}
        }
        if let Some(fl) = self.flow_label {
            w.write_bits(fl, 20);
        }

        if let Some(nh) = self.next_header {
            w.write_bits(nh as u32, 8);
        }
        if let Some(hl) = self.hop_limit {
            w.write_bits(hl as u32, 8);
        }

        w.write_bytes(&self.src_inline);
        w.write_bytes(&self.dst_inline);

        if let Some(nhc) = &self.nhc {
            nhc.write(w);
        }
    }

    /// `(name, value)` pairs for dissection output
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let opt = |v: Option<u32>| v.map_or_else(String::new, |v| v.to_string());
        let mut out = vec![
            ("TF", self.tf.to_string()),
            ("NH", (self.nh as u8).to_string()),
            ("HLIM", self.hlim.to_string()),
            ("CID", (self.cid as u8).to_string()),
            ("SAC", (self.sac as u8).to_string()),
            ("SAM", self.sam.to_string()),
            ("M", (self.m as u8).to_string()),
            ("DAC", (self.dac as u8).to_string()),
            ("DAM", self.dam.to_string()),
            ("SCI", opt(self.sci.map(u32::from))),
            ("DCI", opt(self.dci.map(u32::from))),
            ("ECN", opt(self.ecn.map(u32::from))),
            ("DSCP", opt(self.dscp.map(u32::from))),
            ("FlowLabel", opt(self.flow_label)),
            ("NextHeader", opt(self.next_header.map(u32::from))),
            ("HopLimit", opt(self.hop_limit.map(u32::from))),
            ("Source", crate::wire::coap::hex_spaced(&self.src_inline)),
            ("Destination", crate::wire::coap::hex_spaced(&self.dst_inline)),
        ];
        if let Some(nhc) = &self.nhc {
            out.push(("NHC", nhc.describe()));
        }
        out
    }

    /// Compressed header length in bytes, NHC included
    pub fn encoded_len(&self) -> usize {
        let mut w = BitWriter::new();
        self.write(&mut w);
        w.finish().len()
    }
}

/// Compress `ip` and the start of its payload
///
/// `payload` is everything after the IPv6 header; it is inspected for a
/// UDP or encapsulated IPv6 header to compress with NHC. The result's
/// `consumed` counts the bytes of `ip` + `payload` that the compressed
/// header replaces, so the caller appends `payload[consumed - 40..]`.
pub fn compress(
    ip: &Ipv6Header,
    payload: &[u8],
    contexts: &ContextTable,
    iids: &IidContext,
) -> Compressed {
    compress_at(ip, payload, contexts, iids, 0)
}

/// `depth` counts the IPv6 headers enclosing `ip`
pub(crate) fn compress_at(
    ip: &Ipv6Header,
    payload: &[u8],
    contexts: &ContextTable,
    iids: &IidContext,
    depth: usize,
) -> Compressed {
    let (tf, ecn, dscp, flow_label) = if ip.flow_label != 0 {
        if ip.dscp() != 0 {
            (0, Some(ip.ecn()), Some(ip.dscp()), Some(ip.flow_label))
        } else {
            (1, Some(ip.ecn()), None, Some(ip.flow_label))
        }
    } else if ip.traffic_class != 0 {
        (2, Some(ip.ecn()), Some(ip.dscp()), None)
    } else {
        (3, None, None, None)
    };

    let hlim = hop_limit_code(ip.hop_limit);

    let src: AddressEncoding =
        address::compress_unicast(&ip.src, iids.src.as_ref(), contexts, true);
    let multicast = ip.dst.is_multicast();
    let dst: AddressEncoding = if multicast {
        address::compress_multicast(&ip.dst, contexts)
    } else {
        address::compress_unicast(&ip.dst, iids.dst.as_ref(), contexts, false)
    };

    let cid = src.context.is_some() || dst.context.is_some();

    let (nhc, nhc_consumed) = match nhc::compress(ip, payload, contexts, depth) {
        Some((h, n)) => (Some(h), n),
        None => (None, 0),
    };

    let header = IphcHeader {
        tf,
        nh: nhc.is_some(),
        hlim,
        cid,
        sac: src.ac,
        sam: src.am,
        m: multicast,
        dac: dst.ac,
        dam: dst.am,
        sci: cid.then(|| src.context.unwrap_or(0)),
        dci: cid.then(|| dst.context.unwrap_or(0)),
        ecn,
        dscp,
        flow_label,
        next_header: if nhc.is_some() { None } else { Some(ip.next_header) },
        hop_limit: if hlim == 0 { Some(ip.hop_limit) } else { None },
        src_inline: src.inline,
        dst_inline: dst.inline,
        nhc,
    };

    let mut w = BitWriter::new();
    header.write(&mut w);

    #[cfg(feature = "logging")]
    debug!(
        "IPHC compressed {} header bytes into {} bits",
        Ipv6Header::LEN + nhc_consumed,
        w.bit_len()
    );

    Compressed {
        bytes: w.finish(),
        header,
        consumed: Ipv6Header::LEN + nhc_consumed,
    }
}

/// Compress a complete IPv6 packet into its 6LoWPAN form (IPHC + rest)
pub fn compress_packet(
    packet: &[u8],
    contexts: &ContextTable,
    iids: &IidContext,
) -> Result<Vec<u8>, DecodeError> {
    let ip = Ipv6Header::parse(packet)?;
    let payload = &packet[Ipv6Header::LEN..];
    let compressed = compress(&ip, payload, contexts, iids);
    let mut out = compressed.bytes;
    out.extend_from_slice(&packet[compressed.consumed..]);
    Ok(out)
}

/// Decompress an IPHC header starting at the dispatch byte of `data`
///
/// Length and checksum fields are recomputed from what follows the
/// compressed headers in `data`, which must therefore extend to the end
/// of the packet.
pub fn decompress(
    data: &[u8],
    contexts: &ContextTable,
    iids: &IidContext,
) -> Result<Decompressed, DecodeError> {
    let mut r = BitReader::new(data);
    let (header, ipv6, nhc_bytes) = decompress_from(&mut r, contexts, iids, 0)?;
    let mut headers = ipv6.emit().to_vec();
    headers.extend_from_slice(&nhc_bytes);
    Ok(Decompressed {
        header,
        ipv6,
        headers,
        consumed_bits: r.bits_consumed(),
    })
}

/// Decompress a complete 6LoWPAN IPHC packet back into IPv6
pub fn decompress_packet(
    data: &[u8],
    contexts: &ContextTable,
    iids: &IidContext,
) -> Result<Vec<u8>, DecodeError> {
    let d = decompress(data, contexts, iids)?;
    let mut out = d.headers;
    out.extend_from_slice(&data[d.consumed_bits / 8..]);
    Ok(out)
}

/// `depth` counts the IPv6 headers enclosing the one being read
pub(crate) fn decompress_from(
    r: &mut BitReader<'_>,
    contexts: &ContextTable,
    iids: &IidContext,
    depth: usize,
) -> Result<(IphcHeader, Ipv6Header, Vec<u8>), DecodeError> {
    let mut header = IphcHeader::read(r)?;

    let src = address::decompress_unicast(
        &AddressInput {
            ac: header.sac,
            am: header.sam,
            inline: &header.src_inline,
            cid: header.cid,
            context_id: header.sci.unwrap_or(0),
            iid: iids.src.as_ref(),
        },
        contexts,
        true,
    )?;
    let dst_input = AddressInput {
        ac: header.dac,
        am: header.dam,
        inline: &header.dst_inline,
        cid: header.cid,
        context_id: header.dci.unwrap_or(0),
        iid: iids.dst.as_ref(),
    };
    let dst = if header.m {
        address::decompress_multicast(&dst_input, contexts)?
    } else {
        address::decompress_unicast(&dst_input, contexts, false)?
    };

    let (next_header, nhc_bytes) = if header.nh {
        let (nhc, value, bytes) = nhc::decompress(r, contexts, &src, &dst, depth)?;
        header.nhc = Some(nhc);
        (value, bytes)
    } else {
        let value = header
            .next_header
            .ok_or_else(|| DecodeError::invalid("IPHC", "next header missing"))?;
        (value, Vec::new())
    };

    let hop_limit = match hop_limit_value(header.hlim) {
        Some(v) => v,
        None => header
            .hop_limit
            .ok_or_else(|| DecodeError::invalid("IPHC", "hop limit missing"))?,
    };

    let rest = r.bits_remaining() / 8;
    let payload_len = u16::try_from(rest + nhc_bytes.len())
        .map_err(|_| DecodeError::invalid("IPHC", "payload too long"))?;

    let ipv6 = Ipv6Header {
        traffic_class: (header.dscp.unwrap_or(0) << 2) | header.ecn.unwrap_or(0),
        flow_label: header.flow_label.unwrap_or(0),
        payload_len,
        next_header,
        hop_limit,
        src,
        dst,
    };

    Ok((header, ipv6, nhc_bytes))
}
