//! Capture builders shared by the integration tests

#![allow(dead_code)]

use std::fs;
use std::net::Ipv6Addr;
use std::path::{Path, PathBuf};
use ttcheck_core::constants::{linktype, COAP_PORT};
use ttcheck_core::pcap::PcapWriter;
use ttcheck_core::wire::coap::{CoapCode, CoapMessage, CoapOption, CoapOptionKind, CoapType};
use ttcheck_core::wire::udp::ipv6_datagram;

pub const CLIENT_PORT: u16 = 40000;

pub fn client() -> Ipv6Addr {
    "2001:db8::1".parse().unwrap()
}

pub fn server() -> Ipv6Addr {
    "2001:db8::2".parse().unwrap()
}

/// Client to server datagram
pub fn request(msg: &CoapMessage) -> Vec<u8> {
    ipv6_datagram(client(), server(), CLIENT_PORT, COAP_PORT, &msg.emit())
}

/// Server to client datagram
pub fn response(msg: &CoapMessage) -> Vec<u8> {
    ipv6_datagram(server(), client(), COAP_PORT, CLIENT_PORT, &msg.emit())
}

pub fn get(mid: u16, token: &[u8]) -> CoapMessage {
    CoapMessage::new(CoapType::Con, CoapCode::GET, mid)
        .with_token(token.to_vec())
        .with_uri_path("/test")
}

pub fn content(mid: u16, token: &[u8]) -> CoapMessage {
    CoapMessage::new(CoapType::Ack, CoapCode::CONTENT, mid)
        .with_token(token.to_vec())
        .with_option(CoapOption::uint(CoapOptionKind::ContentFormat, 0))
        .with_payload(&b"hello"[..])
}

/// Raw-IP pcap bytes, one record per packet, 0.1 s apart
pub fn pcap_bytes(packets: &[Vec<u8>]) -> Vec<u8> {
    let mut w = PcapWriter::new(Vec::new(), linktype::RAW).unwrap();
    for (i, p) in packets.iter().enumerate() {
        w.write_record(1_700_000_000.0 + i as f64 / 10.0, p).unwrap();
    }
    w.into_inner().unwrap()
}

pub fn write_capture(dir: &Path, name: &str, packets: &[Vec<u8>]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, pcap_bytes(packets)).unwrap();
    path
}
