//! Internet checksum (RFC 1071) and the UDP pseudo-headers

use crate::constants::ipproto;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Accumulate 16-bit big-endian words of `data` into `sum`
pub fn accumulate(mut sum: u32, data: &[u8]) -> u32 {
    let mut chunks = data.chunks_exact(2);
    for pair in &mut chunks {
        sum = sum.wrapping_add(u16::from_be_bytes([pair[0], pair[1]]) as u32);
    }
    if let [last] = chunks.remainder() {
        sum = sum.wrapping_add((*last as u32) << 8);
    }
    sum
}

/// Fold carries and complement
pub fn finish(mut sum: u32) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

/// UDP checksum over IPv6; `segment` is header + payload with a zero checksum field
pub fn udp_ipv6(src: &Ipv6Addr, dst: &Ipv6Addr, segment: &[u8]) -> u16 {
    let mut sum = accumulate(0, &src.octets());
    sum = accumulate(sum, &dst.octets());
    sum = accumulate(sum, &(segment.len() as u32).to_be_bytes());
    sum = accumulate(sum, &[0, 0, 0, ipproto::UDP]);
    sum = accumulate(sum, segment);
    match finish(sum) {
        0 => 0xffff,
        c => c,
    }
}

/// UDP checksum over IPv4
pub fn udp_ipv4(src: &Ipv4Addr, dst: &Ipv4Addr, segment: &[u8]) -> u16 {
    let mut sum = accumulate(0, &src.octets());
    sum = accumulate(sum, &dst.octets());
    sum = accumulate(sum, &[0, ipproto::UDP]);
    sum = accumulate(sum, &(segment.len() as u16).to_be_bytes());
    sum = accumulate(sum, segment);
    match finish(sum) {
        0 => 0xffff,
        c => c,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc1071_example() {
        // Example from RFC 1071 section 3
        let data = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
        assert_eq!(finish(accumulate(0, &data)), !0xddf2);
    }

    #[test]
    fn test_odd_length() {
        assert_eq!(accumulate(0, &[0x12]), 0x1200);
    }
}
