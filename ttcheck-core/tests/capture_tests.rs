//! Capture files through the dissector

mod common;

use bytes::Bytes;
use common::*;
use std::fs;
use tempfile::tempdir;
use ttcheck_core::constants::linktype;
use ttcheck_core::iphc::{self, ContextEntry, ContextTable, IidContext};
use ttcheck_core::pcap::PcapWriter;
use ttcheck_core::wire::ieee802154::{Ieee802154Frame, MacAddress};
use ttcheck_core::wire::udp::ipv6_datagram;
use ttcheck_core::{Capture, DecodeError, Dissector, Protocol, ReaderError};

#[test]
fn test_open_and_summarize() {
    let dir = tempdir().unwrap();
    let path = write_capture(
        dir.path(),
        "get.pcap",
        &[request(&get(0x1234, &[1, 2])), vec![0x45, 0x00]],
    );

    let cap = Capture::open(&path).unwrap();
    assert_eq!(cap.len(), 2);

    let dissector = Dissector::new(&cap);
    let lines = dissector.summary(None);
    assert_eq!(
        lines[0],
        (1, "[2001:db8::1 -> 2001:db8::2] CoAP [CON mid 4660] GET /test, tok 01 02")
    );
    assert!(lines[1].1.contains("malformed"));

    let coap_only = dissector.summary(Some(Protocol::Coap));
    assert_eq!(coap_only.len(), 1);
    assert_eq!(coap_only[0].0, 1);
}

#[test]
fn test_dump_extension_accepted() {
    let dir = tempdir().unwrap();
    let path = write_capture(dir.path(), "trace.dump", &[]);
    assert!(Capture::open(&path).unwrap().is_empty());
}

#[test]
fn test_corrupt_header_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.pcap");
    fs::write(&path, b"definitely not a pcap header....").unwrap();
    assert!(matches!(Capture::open(&path), Err(ReaderError::BadMagic(_))));

    fs::write(&path, b"").unwrap();
    assert!(matches!(
        Capture::open(&path),
        Err(ReaderError::TruncatedHeader { .. })
    ));
}

#[test]
fn test_dissection_layout() {
    let cap = Capture::from_bytes(
        "d",
        Bytes::from(pcap_bytes(&[response(&content(9, &[7]))])),
    )
    .unwrap();
    let dicts = Dissector::new(&cap).dissect(None);
    let frame = dicts[0];

    let keys: Vec<&str> = frame.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["_type", "id", "timestamp", "error", "protocol_stack"]);
    assert!(frame["error"].is_null());

    let stack = frame["protocol_stack"].as_array().unwrap();
    let names: Vec<&str> = stack
        .iter()
        .map(|l| l["_protocol"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["IPv6", "UDP", "CoAP"]);
    let options = stack[2]["Options"].as_array().unwrap();
    assert_eq!(options[0]["Option"], "Content-Format");

    let text = Dissector::new(&cap).dissect_text(None);
    assert!(text.starts_with("Frame 1 ("));
    assert!(text.contains("  CoAP\n"));
}

#[test]
fn test_ieee802154_capture_decompressed() {
    let src = MacAddress::Short([0x00, 0x01]);
    let dst = MacAddress::Short([0x00, 0x02]);
    let ip = ipv6_datagram(
        "fe80::ff:fe00:1".parse().unwrap(),
        "fe80::ff:fe00:2".parse().unwrap(),
        CLIENT_PORT,
        5683,
        &get(1, &[0xaa]).emit(),
    );
    let iids = IidContext::from_link(Some(src.into()), Some(dst.into()));
    let lowpan = iphc::compress_packet(&ip, &ContextTable::new(), &iids).unwrap();
    assert!(lowpan.len() < ip.len());
    let mac = Ieee802154Frame::data(0xabcd, src, dst, 1).emit(&lowpan, true);

    let mut w = PcapWriter::new(Vec::new(), linktype::IEEE802_15_4_WITHFCS).unwrap();
    w.write_record(0.0, &mac).unwrap();
    let cap = Capture::from_bytes("lowpan", Bytes::from(w.into_inner().unwrap())).unwrap();

    let frame = &cap.frames()[0];
    assert!(frame.error().is_none(), "{:?}", frame.error());
    assert!(frame.contains(Protocol::SixLowpan));
    assert_eq!(
        frame.summary().1,
        "[fe80::ff:fe00:1 -> fe80::ff:fe00:2] CoAP [CON mid 1] GET /test, tok aa"
    );
}

#[test]
fn test_stateful_context_from_capture() {
    let entry: ContextEntry = "0=2001:db8::/64".parse().unwrap();
    let contexts = ContextTable::new().activate(&[entry]);

    let src = MacAddress::Extended([0x02, 0, 0, 0, 0, 0, 0, 0x01]);
    let dst = MacAddress::Extended([0x02, 0, 0, 0, 0, 0, 0, 0x02]);
    let ip = ipv6_datagram(
        "2001:db8::1".parse().unwrap(),
        "2001:db8::2".parse().unwrap(),
        CLIENT_PORT,
        5683,
        &get(2, &[0xbb]).emit(),
    );
    let iids = IidContext::from_link(Some(src.into()), Some(dst.into()));
    let lowpan = iphc::compress_packet(&ip, &contexts, &iids).unwrap();
    let mac = Ieee802154Frame::data(0xabcd, src, dst, 2).emit(&lowpan, false);

    let mut w = PcapWriter::new(Vec::new(), linktype::IEEE802_15_4_NOFCS).unwrap();
    w.write_record(0.0, &mac).unwrap();
    let bytes = Bytes::from(w.into_inner().unwrap());

    // without the context the stateful address cannot be rebuilt
    let bare = Capture::from_bytes("ctx", bytes.clone()).unwrap();
    assert_eq!(
        bare.frames()[0].error(),
        Some(&DecodeError::UnknownContext(0))
    );

    let cap = Capture::from_bytes("ctx", bytes).unwrap().with_contexts(contexts);
    let frame = &cap.frames()[0];
    assert!(frame.error().is_none(), "{:?}", frame.error());
    assert_eq!(frame.ip_addresses().unwrap().0, "2001:db8::1");
}

#[test]
fn test_deeply_nested_lowpan_is_a_frame_error() {
    // Ethernet carrying 6LoWPAN: outer IPHC with inline interface ids, then
    // a long chain of IPv6 NHC headers
    let mut frame = vec![0u8; 12];
    frame.extend_from_slice(&[0x80, 0x9a, 0x7f, 0x11]);
    frame.extend_from_slice(&[0x11; 16]);
    frame.push(0xee);
    for _ in 0..5000 {
        frame.extend_from_slice(&[0x7f, 0x33, 0xee]);
    }

    let mut w = PcapWriter::new(Vec::new(), linktype::ETHERNET).unwrap();
    w.write_record(0.0, &frame).unwrap();
    let cap = Capture::from_bytes("deep", Bytes::from(w.into_inner().unwrap())).unwrap();

    assert!(matches!(
        cap.frames()[0].error(),
        Some(DecodeError::EncapsulationTooDeep(_))
    ));
    let report = ttcheck_core::Analyzer::new()
        .analyse_capture(&cap, "TD_COAP_CORE_01")
        .unwrap();
    assert_eq!(report.verdict, ttcheck_core::VerdictValue::Inconclusive);
}
