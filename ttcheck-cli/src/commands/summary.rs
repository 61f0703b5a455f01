use super::{open_capture, parse_protocol};
use anyhow::{Context, Result};
use colored::*;
use std::fs;
use tracing::{info, warn};
use ttcheck_core::Dissector;

pub fn execute(
    input: &str,
    protocol: Option<&str>,
    json: bool,
    output: Option<&str>,
    contexts: &[String],
) -> Result<()> {
    info!("Summarizing capture: {}", input);

    let protocol = parse_protocol(protocol)?;
    let capture = open_capture(input, contexts)?;
    let dissector = Dissector::new(&capture);
    let records = dissector.summary_records(protocol);

    info!(
        "{} of {} frames selected",
        records.len(),
        capture.len()
    );

    let malformed = capture.malformed();
    if !malformed.is_empty() {
        warn!("{} malformed frames", malformed.len());
    }

    if json || output.is_some() {
        let json = serde_json::to_string_pretty(&records)
            .with_context(|| "Failed to serialize summary")?;
        match output {
            Some(path) => {
                fs::write(path, json)
                    .with_context(|| format!("Failed to write output file: {}", path))?;
                info!("Summary written to: {}", path);
            }
            None => println!("{}", json),
        }
        return Ok(());
    }

    println!("\n=== {} ===", capture.name());
    for record in &records {
        let line = if record.summary.contains("(malformed:") {
            record.summary.red().to_string()
        } else {
            record.summary.clone()
        };
        println!("{:>5}  {}", record.id, line);
    }
    println!();
    println!("Frames:     {}", records.len());
    if malformed.is_empty() {
        println!("Malformed:  {}", malformed.len());
    } else {
        println!("Malformed:  {}", malformed.len().to_string().red());
    }

    Ok(())
}
