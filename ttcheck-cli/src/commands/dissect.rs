use super::{open_capture, parse_protocol};
use anyhow::{Context, Result};
use std::fs;
use tracing::info;
use ttcheck_core::Dissector;

pub fn execute(
    input: &str,
    protocol: Option<&str>,
    output: Option<&str>,
    text: bool,
    contexts: &[String],
) -> Result<()> {
    info!("Dissecting capture: {}", input);

    let protocol = parse_protocol(protocol)?;
    let capture = open_capture(input, contexts)?;
    let dissector = Dissector::new(&capture);

    let rendered = if text {
        dissector.dissect_text(protocol)
    } else {
        let frames = dissector.dissect(protocol);
        info!("Dissected {} frames", frames.len());
        serde_json::to_string_pretty(&frames).with_context(|| "Failed to serialize dissection")?
    };

    if let Some(output_path) = output {
        fs::write(output_path, rendered)
            .with_context(|| format!("Failed to write output file: {}", output_path))?;
        info!("Dissection written to: {}", output_path);
    } else {
        println!("{}", rendered);
    }

    Ok(())
}
