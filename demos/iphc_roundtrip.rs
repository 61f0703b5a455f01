//! Example compressing an IPv6/UDP packet with 6LoWPAN IPHC and back

use ttcheck_core::iphc::{self, ContextEntry, ContextTable, IidContext};
use ttcheck_core::wire::coap::{CoapCode, CoapMessage, CoapType};
use ttcheck_core::wire::ieee802154::MacAddress;
use ttcheck_core::wire::udp::ipv6_datagram;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("ttcheck IPHC Round Trip Example\n");

    // Step 1: A CoAP GET over IPv6/UDP between two 802.15.4 nodes
    let src_mac = MacAddress::Extended([0x02, 0x12, 0x4b, 0x00, 0x06, 0x0d, 0x84, 0x01]);
    let dst_mac = MacAddress::Short([0x00, 0x02]);
    let iids = IidContext::from_link(Some(src_mac.into()), Some(dst_mac.into()));

    let coap = CoapMessage::new(CoapType::Con, CoapCode::GET, 0x1234)
        .with_token(vec![0xca, 0xfe])
        .with_uri_path("/sensors/temp")
        .emit();
    let packet = ipv6_datagram(
        "2001:db8::12:4b00:60d:8401".parse()?,
        "2001:db8::ff:fe00:2".parse()?,
        0xf0b1,
        5683,
        &coap,
    );
    println!("Step 1: IPv6 packet is {} bytes", packet.len());

    // Step 2: Compress with and without a context for 2001:db8::/64
    let entry: ContextEntry = "0=2001:db8::/64".parse()?;
    for (label, contexts) in [
        ("no context", ContextTable::new()),
        ("context 0 = 2001:db8::/64", ContextTable::new().activate(&[entry])),
    ] {
        let lowpan = iphc::compress_packet(&packet, &contexts, &iids)?;
        let decoded = iphc::decompress(&lowpan, &contexts, &iids)?;

        println!("\nStep 2 ({}):", label);
        println!("  Compressed size:   {} bytes", lowpan.len());
        println!("  Header bytes:      {}", hex::encode(&lowpan[..decoded.consumed_bits / 8]));
        for (name, value) in decoded.header.fields() {
            println!("    {:<18} {}", name, value);
        }

        // Step 3: Decompress and compare
        let restored = iphc::decompress_packet(&lowpan, &contexts, &iids)?;
        if restored == packet {
            println!("  ✓ Round trip restored the original packet");
        } else {
            println!("  ✗ Round trip mismatch");
        }
    }

    Ok(())
}
