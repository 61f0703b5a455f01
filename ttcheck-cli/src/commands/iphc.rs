use super::parse_contexts;
use anyhow::{bail, Context, Result};
use colored::*;
use tracing::info;
use ttcheck_core::iphc::{self as codec, IidContext, LinkAddress};
use ttcheck_core::wire::ip::Ipv6Header;

/// Parse a link-layer address given as hex: 2 bytes short, 8 bytes extended
pub fn parse_link_address(text: &str) -> Result<LinkAddress> {
    let clean: String = text.chars().filter(|c| !matches!(c, ':' | '-' | ' ')).collect();
    let bytes = hex::decode(&clean).with_context(|| format!("Invalid link address: {}", text))?;
    match bytes.len() {
        2 => Ok(LinkAddress::Short([bytes[0], bytes[1]])),
        8 => {
            let mut a = [0u8; 8];
            a.copy_from_slice(&bytes);
            Ok(LinkAddress::Extended(a))
        }
        n => bail!("Link address must be 2 or 8 bytes, got {}", n),
    }
}

fn decode_hex(text: &str) -> Result<Vec<u8>> {
    let clean: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(&clean).with_context(|| "Input is not valid hex")
}

/// Compress or decompress one packet given as hex
///
/// Returns the converted packet so callers can inspect it.
pub fn execute(
    data: &str,
    src: Option<&str>,
    dst: Option<&str>,
    compress: bool,
    contexts: &[String],
) -> Result<Vec<u8>> {
    let bytes = decode_hex(data)?;
    let table = parse_contexts(contexts)?;
    let iids = IidContext::from_link(
        src.map(parse_link_address).transpose()?,
        dst.map(parse_link_address).transpose()?,
    );

    if compress {
        info!("Compressing {} byte IPv6 packet", bytes.len());
        let ip = Ipv6Header::parse(&bytes).with_context(|| "Input is not an IPv6 packet")?;
        let compressed = codec::compress(&ip, &bytes[Ipv6Header::LEN..], &table, &iids);
        let mut out = compressed.bytes.clone();
        out.extend_from_slice(&bytes[compressed.consumed..]);

        println!("\n=== IPHC Compression ===");
        for (name, value) in compressed.header.fields() {
            println!("{:<20} {}", name, value);
        }
        println!();
        println!("Original:     {} bytes", bytes.len());
        println!("Compressed:   {} bytes", out.len());
        println!("{}", hex::encode(&out));
        return Ok(out);
    }

    info!("Decompressing {} byte 6LoWPAN packet", bytes.len());
    let decoded = codec::decompress(&bytes, &table, &iids)
        .with_context(|| "Failed to decompress IPHC header")?;
    let mut out = decoded.headers.clone();
    out.extend_from_slice(&bytes[decoded.consumed_bits / 8..]);

    println!("\n=== IPHC Header ===");
    for (name, value) in decoded.header.fields() {
        println!("{:<20} {}", name, value);
    }
    println!("\n=== IPv6 ===");
    println!("{:<20} {}", "Source", decoded.ipv6.src);
    println!("{:<20} {}", "Destination", decoded.ipv6.dst);
    println!("{:<20} {}", "Hop limit", decoded.ipv6.hop_limit);
    println!("{:<20} {}", "Next header", decoded.ipv6.next_header);
    println!();
    println!(
        "{} {} bytes -> {} bytes",
        "✓".green(),
        bytes.len(),
        out.len()
    );
    println!("{}", hex::encode(&out));

    Ok(out)
}
