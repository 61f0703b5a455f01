//! Fuzzing entry points for ttcheck-core
//!
//! To use with cargo-fuzz:
//! 1. Install cargo-fuzz: cargo install cargo-fuzz
//! 2. Run fuzzer: cargo fuzz run fuzz_capture

use bytes::Bytes;
use ttcheck_core::constants::linktype;
use ttcheck_core::iphc::{self, ContextTable, IidContext, LinkAddress};
use ttcheck_core::{wire, Analyzer, Capture, Dissector};

const LINK_TYPES: [u32; 6] = [
    linktype::NULL,
    linktype::ETHERNET,
    linktype::RAW,
    linktype::LINUX_SLL,
    linktype::IEEE802_15_4_WITHFCS,
    linktype::IEEE802_15_4_NOFCS,
];

/// A whole pcap file: open, summarize, dissect, analyse
pub fn fuzz_capture(data: &[u8]) {
    let Ok(capture) = Capture::from_bytes("fuzz", Bytes::copy_from_slice(data)) else {
        return;
    };
    let dissector = Dissector::new(&capture);
    let _ = dissector.summary(None);
    let _ = dissector.dissect(None);
    let _ = Analyzer::new().analyse_capture(&capture, "TD_COAP_CORE_01");
}

/// One packet; the first byte picks the link type
pub fn fuzz_frame(data: &[u8]) {
    let Some((&selector, packet)) = data.split_first() else {
        return;
    };
    let link_type = LINK_TYPES[selector as usize % LINK_TYPES.len()];
    let (packet, _) = wire::decode(link_type, &Bytes::copy_from_slice(packet), &ContextTable::new());
    for layer in packet.layers() {
        let _ = layer.fields();
        let _ = layer.describe();
    }
}

/// An IPHC header following the dispatch byte
pub fn fuzz_iphc(data: &[u8]) {
    let iids = IidContext::from_link(
        Some(LinkAddress::Short([0x00, 0x01])),
        Some(LinkAddress::Extended([0x02, 0, 0, 0, 0, 0, 0, 0x02])),
    );
    if let Ok(ip) = iphc::decompress_packet(data, &ContextTable::new(), &iids) {
        // whatever decompresses must compress again
        let _ = iphc::compress_packet(&ip, &ContextTable::new(), &iids);
    }
}
