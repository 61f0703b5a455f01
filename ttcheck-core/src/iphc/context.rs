//! Compression contexts: the per-link prefix table and interface identifiers
//!
//! A [`ContextTable`] is a plain value. Activating entries produces a new
//! table and leaves the original untouched, so "restoring" the previous
//! contexts is just dropping the derived one. Concurrent decoders each hold
//! their own table; nothing here is global.
//!
//! [`IidContext`] carries the interface identifiers derived from the
//! link-layer source and destination of the frame being (de)compressed.
//! Encapsulated headers get a fresh one built from the outer IPv6 addresses.

use crate::constants::{CONTEXT_SLOTS, SHORT_ADDR_IID_PREFIX};
use crate::error::ContextError;
use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;

fn mask(addr: &[u8; 16], length: u8) -> [u8; 16] {
    let mut out = [0u8; 16];
    let full = (length / 8) as usize;
    out[..full].copy_from_slice(&addr[..full]);
    let rem = length % 8;
    if rem != 0 && full < 16 {
        out[full] = addr[full] & (0xffu8 << (8 - rem));
    }
    out
}

/// A prefix with its length, bits past the length cleared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextPrefix {
    prefix: [u8; 16],
    length: u8,
}

impl ContextPrefix {
    /// Build a prefix, masking `addr` to `length` bits
    pub fn new(addr: Ipv6Addr, length: u8) -> Result<Self, ContextError> {
        if length > 128 {
            return Err(ContextError::BadLength(length));
        }
        Ok(Self {
            prefix: mask(&addr.octets(), length),
            length,
        })
    }

    /// Prefix bytes
    pub fn octets(&self) -> &[u8; 16] {
        &self.prefix
    }

    /// Prefix as an address
    pub fn addr(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.prefix)
    }

    /// Prefix length in bits
    pub fn length(&self) -> u8 {
        self.length
    }

    /// True if `addr` starts with this prefix
    pub fn covers(&self, addr: &[u8; 16]) -> bool {
        mask(addr, self.length) == self.prefix
    }
}

impl fmt::Display for ContextPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr(), self.length)
    }
}

/// One slot assignment, parsed from `<id>=<prefix>/<len>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextEntry {
    /// Slot index, 0..=15
    pub id: u8,
    /// Prefix stored in the slot
    pub prefix: ContextPrefix,
}

impl ContextEntry {
    /// Build an entry, validating the slot index
    pub fn new(id: u8, addr: Ipv6Addr, length: u8) -> Result<Self, ContextError> {
        if id as usize >= CONTEXT_SLOTS {
            return Err(ContextError::BadId(id));
        }
        Ok(Self {
            id,
            prefix: ContextPrefix::new(addr, length)?,
        })
    }
}

impl FromStr for ContextEntry {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ContextError::Malformed(s.to_string());
        let (id, rest) = s.split_once('=').ok_or_else(malformed)?;
        let (addr, len) = rest.split_once('/').ok_or_else(malformed)?;
        let id: u8 = id.trim().parse().map_err(|_| malformed())?;
        let addr: Ipv6Addr = addr.trim().parse().map_err(|_| malformed())?;
        let len: u8 = len.trim().parse().map_err(|_| malformed())?;
        ContextEntry::new(id, addr, len)
    }
}

/// The 16-slot prefix table used for stateful address compression
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextTable {
    slots: [Option<ContextPrefix>; CONTEXT_SLOTS],
}

impl ContextTable {
    /// Table with every slot unset
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix in slot `id`
    pub fn get(&self, id: u8) -> Option<&ContextPrefix> {
        self.slots.get(id as usize).and_then(Option::as_ref)
    }

    /// Configured slots in index order
    pub fn iter(&self) -> impl Iterator<Item = (u8, &ContextPrefix)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|p| (i as u8, p)))
    }

    /// A copy of this table with `entries` written over their slots
    pub fn activate(&self, entries: &[ContextEntry]) -> ContextTable {
        let mut next = self.clone();
        for entry in entries {
            next.slots[entry.id as usize % CONTEXT_SLOTS] = Some(entry.prefix);
        }
        next
    }

    /// Run `f` with `entries` active; `self` is unchanged afterwards
    pub fn scoped<R>(&self, entries: &[ContextEntry], f: impl FnOnce(&ContextTable) -> R) -> R {
        let active = self.activate(entries);
        f(&active)
    }

    /// Slot usable to elide the 64-bit prefix of a unicast address
    ///
    /// The slot's prefix must cover the address, and the address bits
    /// between the prefix length and bit 64 must be zero so that the first
    /// 64 bits can be rebuilt from the context alone.
    pub fn find_unicast(&self, addr: &Ipv6Addr) -> Option<u8> {
        let a = addr.octets();
        let upper = mask(&a, 64);
        self.iter()
            .find(|(_, p)| p.covers(&a) && mask(&a, p.length) == upper)
            .map(|(i, _)| i)
    }

    /// Slot holding exactly `prefix` (multicast prefix-based addresses)
    pub fn find_exact(&self, prefix: &ContextPrefix) -> Option<u8> {
        self.iter().find(|(_, p)| *p == prefix).map(|(i, _)| i)
    }
}

/// A link-layer identifier an interface id can be derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAddress {
    /// 802.15.4 short address
    Short([u8; 2]),
    /// EUI-64
    Extended([u8; 8]),
    /// An IPv6 address; its low 64 bits are used as is
    Ipv6(Ipv6Addr),
}

impl LinkAddress {
    /// Interface identifier per RFC 4944 / RFC 6282
    pub fn iid(&self) -> [u8; 8] {
        let mut iid = [0u8; 8];
        match self {
            LinkAddress::Short(a) => {
                iid[..6].copy_from_slice(&SHORT_ADDR_IID_PREFIX);
                iid[6..].copy_from_slice(a);
            }
            LinkAddress::Extended(a) => {
                iid.copy_from_slice(a);
                iid[0] ^= 0x02;
            }
            LinkAddress::Ipv6(addr) => iid.copy_from_slice(&addr.octets()[8..]),
        }
        iid
    }
}

/// Interface identifiers of the current source and destination
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IidContext {
    /// Source IID
    pub src: Option<[u8; 8]>,
    /// Destination IID
    pub dst: Option<[u8; 8]>,
}

impl IidContext {
    /// Derive from link-layer addresses
    pub fn from_link(src: Option<LinkAddress>, dst: Option<LinkAddress>) -> Self {
        Self {
            src: src.map(|a| a.iid()),
            dst: dst.map(|a| a.iid()),
        }
    }

    /// Context for a header encapsulated inside `src` -> `dst`
    pub fn encapsulated(src: &Ipv6Addr, dst: &Ipv6Addr) -> Self {
        Self::from_link(Some(LinkAddress::Ipv6(*src)), Some(LinkAddress::Ipv6(*dst)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(s: &str) -> ContextEntry {
        s.parse().unwrap()
    }

    #[test]
    fn test_prefix_is_masked() {
        let p = ContextPrefix::new("2001:db8:ffff::1".parse().unwrap(), 36).unwrap();
        assert_eq!(p.addr(), "2001:db8:f000::".parse::<Ipv6Addr>().unwrap());
        assert_eq!(p.to_string(), "2001:db8:f000::/36");
        assert!(ContextPrefix::new(Ipv6Addr::UNSPECIFIED, 129).is_err());
    }

    #[test]
    fn test_entry_parse() {
        let e = entry("3=2001:db8::/64");
        assert_eq!(e.id, 3);
        assert_eq!(e.prefix.length(), 64);
        assert!("16=2001:db8::/64".parse::<ContextEntry>().is_err());
        assert!("x".parse::<ContextEntry>().is_err());
    }

    #[test]
    fn test_scoped_activation_restores() {
        let base = ContextTable::new();
        let found = base.scoped(&[entry("1=2001:db8::/64")], |t| {
            t.find_unicast(&"2001:db8::42".parse().unwrap())
        });
        assert_eq!(found, Some(1));
        assert!(base.get(1).is_none());
        assert_eq!(base.find_unicast(&"2001:db8::42".parse().unwrap()), None);
    }

    #[test]
    fn test_find_unicast_requires_zero_gap() {
        let t = ContextTable::new().activate(&[entry("0=2001:db8::/32")]);
        // bits 32..64 are zero: usable
        assert_eq!(t.find_unicast(&"2001:db8::1".parse().unwrap()), Some(0));
        // bits 32..64 non-zero: the context cannot rebuild them
        assert_eq!(t.find_unicast(&"2001:db8:1::1".parse().unwrap()), None);
    }

    #[test]
    fn test_iid_derivation() {
        assert_eq!(
            LinkAddress::Short([0x12, 0x34]).iid(),
            [0, 0, 0, 0xff, 0xfe, 0, 0x12, 0x34]
        );
        assert_eq!(
            LinkAddress::Extended([0x00, 0x12, 0x4b, 0, 1, 2, 3, 4]).iid(),
            [0x02, 0x12, 0x4b, 0, 1, 2, 3, 4]
        );
        let ip: Ipv6Addr = "fe80::1:2:3:4".parse().unwrap();
        assert_eq!(LinkAddress::Ipv6(ip).iid(), [0, 1, 0, 2, 0, 3, 0, 4]);
    }
}
