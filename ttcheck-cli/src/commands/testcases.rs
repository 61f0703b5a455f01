use anyhow::{Context, Result};
use ttcheck_core::Analyzer;

pub fn execute(json: bool) -> Result<()> {
    let testcases = Analyzer::new().get_implemented_testcases();

    if json {
        let json = serde_json::to_string_pretty(&testcases)
            .with_context(|| "Failed to serialize test case list")?;
        println!("{}", json);
        return Ok(());
    }

    println!("\n=== Implemented Test Cases ===");
    for tc in &testcases {
        println!("{:<18} {:<6} {}", tc.id, tc.protocol, tc.objective);
    }
    println!("\nTotal: {}", testcases.len());

    Ok(())
}
