//! Bit-addressable reading and writing
//!
//! IPHC and NHC headers pack fields of arbitrary width (2, 4, 20 bits...)
//! back to back. Both types here work MSB-first, which is the order the
//! 6LoWPAN RFCs lay fields out on the wire.
//!
//! - `BitWriter` pads the final partial byte with zeros on `finish`.
//! - `BitReader` tracks its position in bits so callers can report how much
//!   of a buffer a header consumed.

use crate::error::DecodeError;

/// Writes bits MSB-first into a byte buffer
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    /// Partial byte, left-aligned
    acc: u8,
    /// Bits held in `acc`, always < 8
    fill: u8,
}

impl BitWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the low `count` bits of `value`, most significant first
    pub fn write_bits(&mut self, value: u32, count: u8) {
        debug_assert!(count <= 32);
        for i in (0..count).rev() {
            let bit = ((value >> i) & 1) as u8;
            self.acc |= bit << (7 - self.fill);
            self.fill += 1;
            if self.fill == 8 {
                self.bytes.push(self.acc);
                self.acc = 0;
                self.fill = 0;
            }
        }
    }

    /// Append a single flag bit
    pub fn write_flag(&mut self, flag: bool) {
        self.write_bits(flag as u32, 1);
    }

    /// Append whole bytes (need not be aligned)
    pub fn write_bytes(&mut self, data: &[u8]) {
        if self.fill == 0 {
            self.bytes.extend_from_slice(data);
        } else {
            for &b in data {
                self.write_bits(b as u32, 8);
            }
        }
    }

    /// Number of bits written so far
    pub fn bit_len(&self) -> usize {
        self.bytes.len() * 8 + self.fill as usize
    }

    /// Flush the partial byte (zero padded) and return the buffer
    pub fn finish(mut self) -> Vec<u8> {
        if self.fill > 0 {
            self.bytes.push(self.acc);
        }
        self.bytes
    }
}

/// Reads bits MSB-first from a byte slice
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    /// Start reading at the first bit of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bits consumed so far
    pub fn bits_consumed(&self) -> usize {
        self.pos
    }

    /// Bits left to read
    pub fn bits_remaining(&self) -> usize {
        self.data.len() * 8 - self.pos
    }

    /// True when the cursor sits on a byte boundary
    pub fn is_aligned(&self) -> bool {
        self.pos % 8 == 0
    }

    /// Read `count` (≤ 32) bits as an unsigned integer
    pub fn read_bits(&mut self, count: u8) -> Result<u32, DecodeError> {
        debug_assert!(count <= 32);
        if (count as usize) > self.bits_remaining() {
            return Err(DecodeError::truncated(
                "bit field",
                (self.pos + count as usize).div_ceil(8),
                self.data.len(),
            ));
        }
        let mut value = 0u32;
        for _ in 0..count {
            let byte = self.data[self.pos / 8];
            let bit = (byte >> (7 - (self.pos % 8))) & 1;
            value = (value << 1) | bit as u32;
            self.pos += 1;
        }
        Ok(value)
    }

    /// Read a single bit as a flag
    pub fn read_flag(&mut self) -> Result<bool, DecodeError> {
        Ok(self.read_bits(1)? == 1)
    }

    /// Read 8 bits
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.read_bits(8)? as u8)
    }

    /// Read 16 bits, big-endian
    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        Ok(self.read_bits(16)? as u16)
    }

    /// Read `n` whole bytes
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, DecodeError> {
        if n * 8 > self.bits_remaining() {
            return Err(DecodeError::truncated(
                "inline field",
                self.pos.div_ceil(8) + n,
                self.data.len(),
            ));
        }
        if self.is_aligned() {
            let start = self.pos / 8;
            self.pos += n * 8;
            return Ok(self.data[start..start + n].to_vec());
        }
        (0..n).map(|_| self.read_u8()).collect()
    }

    /// Read exactly `N` bytes into an array
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.read_bytes(N)?);
        Ok(out)
    }

    /// The unread tail; the cursor must be byte aligned
    pub fn remaining_bytes(&self) -> Result<&'a [u8], DecodeError> {
        if !self.is_aligned() {
            return Err(DecodeError::invalid(
                "bit stream",
                format!("unaligned position {} bits", self.pos),
            ));
        }
        Ok(&self.data[self.pos / 8..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_mixed_widths() {
        let mut w = BitWriter::new();
        w.write_bits(0b011, 3);
        w.write_bits(0b10, 2);
        w.write_flag(true);
        w.write_bits(0xabcde, 20);
        assert_eq!(w.bit_len(), 26);
        let bytes = w.finish();
        assert_eq!(bytes.len(), 4);

        let mut r = BitReader::new(&bytes);
        assert_eq!(r.read_bits(3).unwrap(), 0b011);
        assert_eq!(r.read_bits(2).unwrap(), 0b10);
        assert!(r.read_flag().unwrap());
        assert_eq!(r.read_bits(20).unwrap(), 0xabcde);
        assert_eq!(r.bits_consumed(), 26);
    }

    #[test]
    fn test_unaligned_bytes() {
        let mut w = BitWriter::new();
        w.write_bits(0xf, 4);
        w.write_bytes(&[0x12, 0x34]);
        w.write_bits(0, 4);
        let bytes = w.finish();
        assert_eq!(bytes, vec![0xf1, 0x23, 0x40]);

        let mut r = BitReader::new(&bytes);
        r.read_bits(4).unwrap();
        assert_eq!(r.read_bytes(2).unwrap(), vec![0x12, 0x34]);
        assert!(r.remaining_bytes().is_err());
        r.read_bits(4).unwrap();
        assert!(r.remaining_bytes().unwrap().is_empty());
    }

    #[test]
    fn test_read_past_end() {
        let mut r = BitReader::new(&[0xff]);
        assert!(r.read_bits(9).is_err());
        assert_eq!(r.read_bits(8).unwrap(), 0xff);
        assert!(matches!(
            r.read_bytes(1),
            Err(DecodeError::Truncated { .. })
        ));
    }
}
