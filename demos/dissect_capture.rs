//! Example writing a small CoAP capture, dissecting it and running a test case

use std::net::Ipv6Addr;
use ttcheck_core::constants::{linktype, COAP_PORT};
use ttcheck_core::pcap::PcapWriter;
use ttcheck_core::wire::coap::{CoapCode, CoapMessage, CoapOption, CoapOptionKind, CoapType};
use ttcheck_core::wire::udp::ipv6_datagram;
use ttcheck_core::{Analyzer, Capture, Dissector, Protocol};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("ttcheck Capture Dissection Example\n");

    // Step 1: Write a capture with one GET exchange and a stray packet
    let client: Ipv6Addr = "2001:db8::1".parse()?;
    let server: Ipv6Addr = "2001:db8::2".parse()?;
    let request = CoapMessage::new(CoapType::Con, CoapCode::GET, 0x77)
        .with_token(vec![0x01])
        .with_uri_path("/test");
    let response = CoapMessage::new(CoapType::Ack, CoapCode::CONTENT, 0x77)
        .with_token(vec![0x01])
        .with_option(CoapOption::uint(CoapOptionKind::ContentFormat, 0))
        .with_payload(&b"22.5 C"[..]);

    let dir = std::env::temp_dir();
    let path = dir.join("ttcheck_demo.pcap");
    let mut w = PcapWriter::new(std::fs::File::create(&path)?, linktype::RAW)?;
    w.write_record(1.0, &ipv6_datagram(client, server, 40000, COAP_PORT, &request.emit()))?;
    w.write_record(1.2, &ipv6_datagram(server, client, COAP_PORT, 40000, &response.emit()))?;
    w.write_record(1.5, &ipv6_datagram(client, server, 40000, 9999, b"not coap"))?;
    w.into_inner()?;
    println!("Step 1: Wrote {}\n", path.display());

    // Step 2: Summaries
    let capture = Capture::open(&path)?;
    let dissector = Dissector::new(&capture);
    println!("Step 2: Summary ({} frames)", capture.len());
    for (id, line) in dissector.summary(None) {
        println!("  {:>3}  {}", id, line);
    }

    // Step 3: Full dissection of the CoAP frames only
    println!("\nStep 3: CoAP dissection");
    print!("{}", dissector.dissect_text(Some(Protocol::Coap)));

    // Step 4: Conformance verdict
    let report = Analyzer::new().analyse_capture(&capture, "TD_COAP_CORE_01")?;
    println!("Step 4: {} -> {}", report.testcase_id, report.verdict);
    print!("{}", report.log);

    std::fs::remove_file(&path)?;
    Ok(())
}
