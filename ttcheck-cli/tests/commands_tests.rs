use serde_json::Value;
use std::fs;
use std::net::Ipv6Addr;
use std::path::Path;
use tempfile::tempdir;
use ttcheck_cli::commands::{analyse, dissect, iphc, parse_contexts, parse_protocol, summary, testcases};
use ttcheck_core::constants::{linktype, COAP_PORT};
use ttcheck_core::pcap::PcapWriter;
use ttcheck_core::wire::coap::{CoapCode, CoapMessage, CoapOption, CoapOptionKind, CoapType};
use ttcheck_core::wire::udp::ipv6_datagram;
use ttcheck_core::Protocol;

/// Helper: write a capture holding one GET exchange and a non-CoAP datagram
fn write_get_exchange(path: &Path) {
    let client: Ipv6Addr = "2001:db8::1".parse().unwrap();
    let server: Ipv6Addr = "2001:db8::2".parse().unwrap();
    let req = CoapMessage::new(CoapType::Con, CoapCode::GET, 10)
        .with_token(vec![0x42])
        .with_uri_path("/test");
    let resp = CoapMessage::new(CoapType::Ack, CoapCode::CONTENT, 10)
        .with_token(vec![0x42])
        .with_option(CoapOption::uint(CoapOptionKind::ContentFormat, 0))
        .with_payload(&b"ok"[..]);

    let mut w = PcapWriter::new(Vec::new(), linktype::RAW).unwrap();
    w.write_record(1.0, &ipv6_datagram(client, server, 40000, COAP_PORT, &req.emit()))
        .unwrap();
    w.write_record(1.1, &ipv6_datagram(server, client, COAP_PORT, 40000, &resp.emit()))
        .unwrap();
    w.write_record(1.2, &ipv6_datagram(client, server, 40000, 53, b"dns?"))
        .unwrap();
    fs::write(path, w.into_inner().unwrap()).unwrap();
}

#[test]
fn test_summary_json_output() {
    let td = tempdir().unwrap();
    let input = td.path().join("get.pcap");
    let output = td.path().join("summary.json");
    write_get_exchange(&input);

    summary::execute(
        input.to_str().unwrap(),
        Some("coap"),
        true,
        Some(output.to_str().unwrap()),
        &[],
    )
    .unwrap();

    let records: Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["id"], 1);
    assert!(records[0]["summary"].as_str().unwrap().contains("GET /test"));
}

#[test]
fn test_summary_text_to_stdout() {
    let td = tempdir().unwrap();
    let input = td.path().join("get.pcap");
    write_get_exchange(&input);
    assert!(summary::execute(input.to_str().unwrap(), None, false, None, &[]).is_ok());
}

#[test]
fn test_dissect_json_output() {
    let td = tempdir().unwrap();
    let input = td.path().join("get.pcap");
    let output = td.path().join("dissect.json");
    write_get_exchange(&input);

    dissect::execute(
        input.to_str().unwrap(),
        None,
        Some(output.to_str().unwrap()),
        false,
        &[],
    )
    .unwrap();

    let frames: Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    let frames = frames.as_array().unwrap();
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0]["_type"], "frame");
    let last_stack = frames[2]["protocol_stack"].as_array().unwrap();
    assert_eq!(last_stack.last().unwrap()["_protocol"], "BytesValue");
}

#[test]
fn test_dissect_text_output() {
    let td = tempdir().unwrap();
    let input = td.path().join("get.pcap");
    let output = td.path().join("dissect.txt");
    write_get_exchange(&input);

    dissect::execute(
        input.to_str().unwrap(),
        Some("udp"),
        Some(output.to_str().unwrap()),
        true,
        &[],
    )
    .unwrap();

    let text = fs::read_to_string(&output).unwrap();
    assert!(text.contains("Frame 3 ("));
    assert!(text.contains("  UDP\n"));
}

#[test]
fn test_analyse_writes_report() {
    let td = tempdir().unwrap();
    let input = td.path().join("get.pcap");
    let output = td.path().join("report.json");
    write_get_exchange(&input);

    analyse::execute(
        input.to_str().unwrap(),
        "TD_COAP_CORE_01",
        Some(output.to_str().unwrap()),
        false,
        &[],
    )
    .unwrap();

    let report: Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(report["testcase_id"], "TD_COAP_CORE_01");
    assert_eq!(report["verdict"], "pass");
    assert_eq!(report["failed_frames"].as_array().unwrap().len(), 0);
    assert_eq!(report["partial_verdicts"][0][0], "pass");
}

#[test]
fn test_analyse_unknown_testcase() {
    let td = tempdir().unwrap();
    let input = td.path().join("get.pcap");
    write_get_exchange(&input);

    let err = analyse::execute(input.to_str().unwrap(), "TD_NOPE", None, false, &[]).unwrap_err();
    assert!(format!("{:#}", err).contains("Unknown test case: TD_NOPE"));
}

#[test]
fn test_missing_input_file() {
    let td = tempdir().unwrap();
    let input = td.path().join("missing.pcap");
    assert!(summary::execute(input.to_str().unwrap(), None, false, None, &[]).is_err());
}

#[test]
fn test_testcases_listing() {
    assert!(testcases::execute(false).is_ok());
    assert!(testcases::execute(true).is_ok());
}

#[test]
fn test_parse_helpers() {
    assert_eq!(parse_protocol(Some("CoAP")).unwrap(), Some(Protocol::Coap));
    assert_eq!(parse_protocol(None).unwrap(), None);
    assert!(parse_protocol(Some("smtp")).is_err());

    let table = parse_contexts(&["1=2001:db8:1::/48".to_string()]).unwrap();
    assert_eq!(table.get(1).unwrap().length(), 48);
    assert!(parse_contexts(&["16=2001:db8::/64".to_string()]).is_err());
    assert!(parse_contexts(&["nonsense".to_string()]).is_err());
}

#[test]
fn test_iphc_compress_then_decompress() {
    let packet = ipv6_datagram(
        "fe80::ff:fe00:1".parse().unwrap(),
        "fe80::ff:fe00:2".parse().unwrap(),
        0xf0b1,
        0xf0b2,
        b"hi",
    );
    let compressed = iphc::execute(
        &hex::encode(&packet),
        Some("0001"),
        Some("0002"),
        true,
        &[],
    )
    .unwrap();
    assert!(compressed.len() < packet.len());

    let restored = iphc::execute(
        &hex::encode(&compressed),
        Some("00:01"),
        Some("00:02"),
        false,
        &[],
    )
    .unwrap();
    assert_eq!(restored, packet);
}

#[test]
fn test_iphc_bad_input() {
    assert!(iphc::execute("zz", None, None, false, &[]).is_err());
    assert!(iphc::execute("7a", None, None, false, &[]).is_err());
    assert!(iphc::parse_link_address("010203").is_err());
}
