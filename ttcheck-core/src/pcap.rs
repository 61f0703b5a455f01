//! Classic libpcap file format
//!
//! The reader works over an in-memory buffer so a capture file is read from
//! disk exactly once. Both byte orders and both timestamp resolutions
//! (micro/nano) are accepted. The writer always emits little-endian,
//! microsecond-resolution files.

use crate::constants::{
    PCAP_DEFAULT_SNAPLEN, PCAP_GLOBAL_HEADER_LEN, PCAP_MAGIC_MICROS, PCAP_MAGIC_NANOS,
    PCAP_RECORD_HEADER_LEN,
};
use crate::error::ReaderError;
use bytes::Bytes;
use std::io::{self, Write};

#[cfg(feature = "logging")]
use tracing::warn;

/// Parsed pcap global header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcapHeader {
    /// File stored big-endian
    pub big_endian: bool,
    /// Timestamp fraction is nanoseconds rather than microseconds
    pub nanos: bool,
    /// Major version
    pub version_major: u16,
    /// Minor version
    pub version_minor: u16,
    /// Snapshot length
    pub snaplen: u32,
    /// Link-layer header type of every record
    pub link_type: u32,
}

/// One captured packet
#[derive(Debug, Clone, PartialEq)]
pub struct PcapRecord {
    /// Seconds since the epoch
    pub timestamp: f64,
    /// Captured bytes
    pub data: Bytes,
    /// Length of the packet on the wire
    pub orig_len: u32,
    /// The file ended before the record did
    pub truncated: bool,
}

fn read_u32(buf: &[u8], big_endian: bool) -> u32 {
    let raw = [buf[0], buf[1], buf[2], buf[3]];
    if big_endian {
        u32::from_be_bytes(raw)
    } else {
        u32::from_le_bytes(raw)
    }
}

fn read_u16(buf: &[u8], big_endian: bool) -> u16 {
    let raw = [buf[0], buf[1]];
    if big_endian {
        u16::from_be_bytes(raw)
    } else {
        u16::from_le_bytes(raw)
    }
}

impl PcapHeader {
    /// Parse the 24-byte global header
    pub fn parse(data: &[u8]) -> Result<Self, ReaderError> {
        if data.len() < PCAP_GLOBAL_HEADER_LEN {
            return Err(ReaderError::TruncatedHeader {
                expected: PCAP_GLOBAL_HEADER_LEN,
                actual: data.len(),
            });
        }

        let magic = read_u32(data, true);
        let (big_endian, nanos) = match magic {
            PCAP_MAGIC_MICROS => (true, false),
            PCAP_MAGIC_NANOS => (true, true),
            m if m.swap_bytes() == PCAP_MAGIC_MICROS => (false, false),
            m if m.swap_bytes() == PCAP_MAGIC_NANOS => (false, true),
            other => return Err(ReaderError::BadMagic(other)),
        };

        Ok(Self {
            big_endian,
            nanos,
            version_major: read_u16(&data[4..], big_endian),
            version_minor: read_u16(&data[6..], big_endian),
            snaplen: read_u32(&data[16..], big_endian),
            link_type: read_u32(&data[20..], big_endian),
        })
    }
}

/// Iterates the records of an in-memory pcap file
#[derive(Debug, Clone)]
pub struct PcapReader {
    header: PcapHeader,
    data: Bytes,
    offset: usize,
}

impl PcapReader {
    /// Validate the global header and position on the first record
    pub fn new(data: Bytes) -> Result<Self, ReaderError> {
        let header = PcapHeader::parse(&data)?;
        Ok(Self {
            header,
            data,
            offset: PCAP_GLOBAL_HEADER_LEN,
        })
    }

    /// The global header
    pub fn header(&self) -> &PcapHeader {
        &self.header
    }
}

impl Iterator for PcapReader {
    type Item = PcapRecord;

    fn next(&mut self) -> Option<PcapRecord> {
        let rest = self.data.len().checked_sub(self.offset)?;
        if rest == 0 {
            return None;
        }

        if rest < PCAP_RECORD_HEADER_LEN {
            #[cfg(feature = "logging")]
            warn!("Truncated pcap record header at offset {}", self.offset);
            let data = self.data.slice(self.offset..);
            self.offset = self.data.len();
            // reported against the record header length
            return Some(PcapRecord {
                timestamp: 0.0,
                data,
                orig_len: PCAP_RECORD_HEADER_LEN as u32,
                truncated: true,
            });
        }

        let be = self.header.big_endian;
        let hdr = &self.data[self.offset..self.offset + PCAP_RECORD_HEADER_LEN];
        let ts_sec = read_u32(hdr, be);
        let ts_frac = read_u32(&hdr[4..], be);
        let incl_len = read_u32(&hdr[8..], be) as usize;
        let orig_len = read_u32(&hdr[12..], be);

        let divisor = if self.header.nanos { 1e9 } else { 1e6 };
        let timestamp = ts_sec as f64 + ts_frac as f64 / divisor;

        let start = self.offset + PCAP_RECORD_HEADER_LEN;
        let available = self.data.len() - start;
        let truncated = incl_len > available;
        let end = start + incl_len.min(available);
        self.offset = end;

        #[cfg(feature = "logging")]
        if truncated {
            warn!(
                "Truncated pcap record: {} of {} bytes present",
                available, incl_len
            );
        }

        Some(PcapRecord {
            timestamp,
            data: self.data.slice(start..end),
            orig_len,
            truncated,
        })
    }
}

/// Writes a little-endian, microsecond pcap stream
#[derive(Debug)]
pub struct PcapWriter<W: Write> {
    sink: W,
}

impl<W: Write> PcapWriter<W> {
    /// Write the global header for `link_type`
    pub fn new(mut sink: W, link_type: u32) -> io::Result<Self> {
        sink.write_all(&PCAP_MAGIC_MICROS.to_le_bytes())?;
        sink.write_all(&2u16.to_le_bytes())?; // major version
        sink.write_all(&4u16.to_le_bytes())?; // minor version
        sink.write_all(&0u32.to_le_bytes())?; // timezone (UTC)
        sink.write_all(&0u32.to_le_bytes())?; // sigfigs
        sink.write_all(&PCAP_DEFAULT_SNAPLEN.to_le_bytes())?;
        sink.write_all(&link_type.to_le_bytes())?;
        Ok(Self { sink })
    }

    /// Append one record
    pub fn write_record(&mut self, timestamp: f64, packet: &[u8]) -> io::Result<()> {
        let secs = timestamp.trunc() as u32;
        let micros = ((timestamp.fract() * 1e6).round() as u32).min(999_999);
        let len = packet.len() as u32;
        self.sink.write_all(&secs.to_le_bytes())?;
        self.sink.write_all(&micros.to_le_bytes())?;
        self.sink.write_all(&len.to_le_bytes())?; // captured length
        self.sink.write_all(&len.to_le_bytes())?; // original length
        self.sink.write_all(packet)
    }

    /// Flush and return the underlying sink
    pub fn into_inner(mut self) -> io::Result<W> {
        self.sink.flush()?;
        Ok(self.sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::linktype;

    #[test]
    fn test_writer_reader_records() {
        let mut w = PcapWriter::new(Vec::new(), linktype::RAW).unwrap();
        w.write_record(1.5, &[1, 2, 3]).unwrap();
        w.write_record(2.25, &[4]).unwrap();
        let buf = w.into_inner().unwrap();

        let reader = PcapReader::new(Bytes::from(buf)).unwrap();
        assert_eq!(reader.header().link_type, linktype::RAW);
        assert!(!reader.header().big_endian);
        let records: Vec<_> = reader.collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].data.as_ref(), &[1, 2, 3]);
        assert!((records[0].timestamp - 1.5).abs() < 1e-9);
        assert!((records[1].timestamp - 2.25).abs() < 1e-9);
        assert!(!records[1].truncated);
    }

    #[test]
    fn test_big_endian_header() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&PCAP_MAGIC_NANOS.to_be_bytes());
        buf.extend_from_slice(&2u16.to_be_bytes());
        buf.extend_from_slice(&4u16.to_be_bytes());
        buf.extend_from_slice(&[0; 8]);
        buf.extend_from_slice(&65535u32.to_be_bytes());
        buf.extend_from_slice(&1u32.to_be_bytes());
        let hdr = PcapHeader::parse(&buf).unwrap();
        assert!(hdr.big_endian);
        assert!(hdr.nanos);
        assert_eq!(hdr.link_type, 1);
    }

    #[test]
    fn test_bad_magic_and_short_header() {
        assert!(matches!(
            PcapHeader::parse(&[0u8; 24]),
            Err(ReaderError::BadMagic(0))
        ));
        assert!(matches!(
            PcapHeader::parse(&[]),
            Err(ReaderError::TruncatedHeader { actual: 0, .. })
        ));
    }

    #[test]
    fn test_truncated_trailing_record() {
        let mut w = PcapWriter::new(Vec::new(), linktype::RAW).unwrap();
        w.write_record(0.0, &[0xaa; 10]).unwrap();
        let mut buf = w.into_inner().unwrap();
        buf.truncate(buf.len() - 4);

        let records: Vec<_> = PcapReader::new(Bytes::from(buf)).unwrap().collect();
        assert_eq!(records.len(), 1);
        assert!(records[0].truncated);
        assert_eq!(records[0].data.len(), 6);
    }
}
