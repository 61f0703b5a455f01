//! Subcommand implementations

pub mod analyse;
pub mod dissect;
pub mod iphc;
pub mod summary;
pub mod testcases;

use anyhow::{Context, Result};
use ttcheck_core::iphc::{ContextEntry, ContextTable};
use ttcheck_core::{Capture, Protocol};

/// Build a context table from `<id>=<prefix>/<len>` entries
pub fn parse_contexts(entries: &[String]) -> Result<ContextTable> {
    let parsed = entries
        .iter()
        .map(|e| {
            e.parse::<ContextEntry>()
                .with_context(|| format!("Invalid context entry: {}", e))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(ContextTable::new().activate(&parsed))
}

/// Parse an optional `--protocol` value
pub fn parse_protocol(name: Option<&str>) -> Result<Option<Protocol>> {
    name.map(|n| {
        n.parse::<Protocol>()
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("Unknown protocol: {}", n))
    })
    .transpose()
}

/// Open a capture with the given 6LoWPAN contexts
pub fn open_capture(input: &str, contexts: &[String]) -> Result<Capture> {
    let table = parse_contexts(contexts)?;
    Capture::open_with_contexts(input, table)
        .with_context(|| format!("Failed to open capture: {}", input))
}
