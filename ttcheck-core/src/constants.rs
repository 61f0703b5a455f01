//! Wire constants: capture magics, link types, dispatch values and well-known ports

/// pcap magic, microsecond timestamps (as read big-endian)
pub const PCAP_MAGIC_MICROS: u32 = 0xa1b2_c3d4;

/// pcap magic, nanosecond timestamps (as read big-endian)
pub const PCAP_MAGIC_NANOS: u32 = 0xa1b2_3c4d;

/// Size of the pcap global header
pub const PCAP_GLOBAL_HEADER_LEN: usize = 24;

/// Size of a pcap record header
pub const PCAP_RECORD_HEADER_LEN: usize = 16;

/// Default snapshot length written by [`crate::pcap::PcapWriter`]
pub const PCAP_DEFAULT_SNAPLEN: u32 = 65535;

/// File extensions handled by the pcap reader
pub const PCAP_EXTENSIONS: &[&str] = &["pcap", "dump"];

/// Link-layer header types found in the pcap global header
pub mod linktype {
    /// BSD loopback: 4-byte address family in host order
    pub const NULL: u32 = 0;
    /// Ethernet II
    pub const ETHERNET: u32 = 1;
    /// Raw IPv4 or IPv6, version nibble decides
    pub const RAW: u32 = 101;
    /// Linux "cooked" capture (SLL)
    pub const LINUX_SLL: u32 = 113;
    /// IEEE 802.15.4 with trailing FCS
    pub const IEEE802_15_4_WITHFCS: u32 = 195;
    /// IEEE 802.15.4 without FCS
    pub const IEEE802_15_4_NOFCS: u32 = 230;
}

/// Ethertypes understood by the Ethernet and SLL decoders
pub mod ethertype {
    /// IPv4
    pub const IPV4: u16 = 0x0800;
    /// IPv6
    pub const IPV6: u16 = 0x86dd;
    /// Raw 6LoWPAN over Ethernet
    pub const SIXLOWPAN: u16 = 0x809a;
}

/// IP protocol numbers used as IPv6 next header values
pub mod ipproto {
    /// Hop-by-hop options
    pub const HOPOPT: u8 = 0;
    /// UDP
    pub const UDP: u8 = 17;
    /// IPv6 encapsulation
    pub const IPV6: u8 = 41;
    /// Routing header
    pub const ROUTING: u8 = 43;
    /// Fragment header
    pub const FRAGMENT: u8 = 44;
    /// Destination options
    pub const DSTOPTS: u8 = 60;
    /// Mobility header
    pub const MOBILITY: u8 = 135;
}

/// 6LoWPAN dispatch: uncompressed IPv6 follows
pub const LOWPAN_DISPATCH_IPV6: u8 = 0x41;

/// 6LoWPAN dispatch mask and value for IPHC (`011xxxxx`)
pub const LOWPAN_IPHC_MASK: u8 = 0xe0;
/// See [`LOWPAN_IPHC_MASK`]
pub const LOWPAN_IPHC_DISPATCH: u8 = 0x60;

/// NHC UDP ids are `11110CPP`
pub const NHC_UDP_MASK: u8 = 0xf8;
/// See [`NHC_UDP_MASK`]
pub const NHC_UDP_ID: u8 = 0xf0;

/// NHC extension header ids are `1110EEEN`
pub const NHC_EXT_MASK: u8 = 0xf0;
/// See [`NHC_EXT_MASK`]
pub const NHC_EXT_ID: u8 = 0xe0;

/// NHC extension id for an encapsulated IPv6 header
pub const NHC_EID_IPV6: u8 = 7;

/// IPv6 headers allowed inside the outermost one
pub const MAX_ENCAPSULATION_DEPTH: usize = 8;

/// UDP port prefix compressible to 4 bits (`0xF0Bx`)
pub const UDP_PORT_4BIT_PREFIX: u16 = 0xf0b0;

/// UDP port prefix compressible to 8 bits (`0xF0xx`)
pub const UDP_PORT_8BIT_PREFIX: u16 = 0xf000;

/// Interface identifier prefix derived from a 16-bit short address
pub const SHORT_ADDR_IID_PREFIX: [u8; 6] = [0x00, 0x00, 0x00, 0xff, 0xfe, 0x00];

/// Link-local prefix `fe80::/64`, first 8 bytes
pub const LINK_LOCAL_PREFIX: [u8; 8] = [0xfe, 0x80, 0, 0, 0, 0, 0, 0];

/// Number of slots in a 6LoWPAN context table
pub const CONTEXT_SLOTS: usize = 16;

/// Default CoAP UDP port
pub const COAP_PORT: u16 = 5683;

/// CoAP payload marker
pub const COAP_PAYLOAD_MARKER: u8 = 0xff;
