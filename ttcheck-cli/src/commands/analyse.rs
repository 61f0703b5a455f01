use super::parse_contexts;
use anyhow::{Context, Result};
use colored::*;
use std::fs;
use tracing::{info, warn};
use ttcheck_core::{Analyzer, VerdictValue};

pub fn execute(
    input: &str,
    testcase: &str,
    output: Option<&str>,
    show_log: bool,
    contexts: &[String],
) -> Result<()> {
    info!("Analysing {} with {}", input, testcase);

    let analyzer = Analyzer::new().with_contexts(parse_contexts(contexts)?);
    let report = analyzer
        .analyse(input, testcase)
        .with_context(|| format!("Failed to analyse {} with {}", input, testcase))?;

    for e in &report.exceptions {
        warn!("Caught {}", e);
    }

    if show_log {
        println!("{}", report.log);
    }

    println!("\n=== {} ===", report.testcase_id);
    let verdict = report.verdict.to_string();
    let verdict = match report.verdict {
        VerdictValue::Pass => verdict.green(),
        VerdictValue::Inconclusive | VerdictValue::None => verdict.yellow(),
        _ => verdict.red(),
    };
    println!("Verdict:        {}", verdict);
    println!("Message:        {}", report.message());
    if !report.failed_frames.is_empty() {
        let ids: Vec<String> = report.failed_frames.iter().map(ToString::to_string).collect();
        println!("Failed frames:  {}", ids.join(", "));
    }
    if !report.exceptions.is_empty() {
        println!("Exceptions:     {}", report.exceptions.len().to_string().red());
    }

    if let Some(output_path) = output {
        let json = serde_json::to_string_pretty(&report)
            .with_context(|| "Failed to serialize analysis report")?;
        fs::write(output_path, json)
            .with_context(|| format!("Failed to write output file: {}", output_path))?;
        info!("Report written to: {}", output_path);
    }

    println!();
    if report.verdict == VerdictValue::Pass {
        println!("{} Test purpose fulfilled", "✓".green());
    } else {
        println!("{} Test purpose not fulfilled", "✗".red());
    }

    Ok(())
}
